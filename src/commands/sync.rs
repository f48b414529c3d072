use std::sync::Arc;

use anyhow::{bail, Result};

use crate::cli::SyncArgs;
use crate::config::Config;
use crate::docker::DockerClient;
use crate::runner::ProcessRunner;
use crate::shadow::{Reconciler, SyncOutcome};

/// One reconciliation cycle from the command line, optionally as a dry run.
pub async fn cmd_sync(args: SyncArgs, config: Config) -> Result<()> {
    let client = Arc::new(DockerClient::new(Arc::new(ProcessRunner), &config));
    let reconciler = Reconciler::new(client, &config);

    if args.dry_run {
        let plan = reconciler.plan().await?;
        println!("desired backends: {}", plan.desired.len());
        println!("current backends: {}", plan.current);
        if plan.diff.is_empty() {
            println!("no changes");
        }
        for ip in &plan.diff.added {
            println!("add {ip}");
        }
        for ip in &plan.diff.removed {
            println!("remove {ip}");
        }
        return Ok(());
    }

    match reconciler.run_once().await {
        SyncOutcome::Failed(msg) => bail!("sync failed: {msg}"),
        outcome => {
            println!("{outcome}");
            Ok(())
        }
    }
}
