use anyhow::Result;

use crate::config::Config;
use crate::policy::Policy;

/// Print the catalog with the decision the loaded configuration yields for
/// each operation.
pub async fn cmd_policy(config: Config) -> Result<()> {
    let policy = Policy::new(config.policy);
    print!("{}", policy.describe());
    Ok(())
}
