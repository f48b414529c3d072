use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "dockgate",
    version,
    about = "HTTP control plane for container-host operations"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP daemon plus the background shadow backend sync
    Serve(ServeArgs),
    /// Run one shadow backend reconciliation cycle and exit
    Sync(SyncArgs),
    /// Print the operation catalog with the loaded policy decisions
    Policy,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides DOCKGATE_LISTEN)
    #[arg(long)]
    pub listen: Option<std::net::SocketAddr>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Compute and print the changes without applying anything
    #[arg(long)]
    pub dry_run: bool,
}
