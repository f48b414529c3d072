use anyhow::Result;

use crate::cli::ServeArgs;
use crate::config::Config;
use crate::server;

pub async fn cmd_serve(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    server::serve(config).await
}
