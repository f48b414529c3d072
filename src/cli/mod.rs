pub mod args;

pub use args::{Cli, Commands, ServeArgs, SyncArgs};
