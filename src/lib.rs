pub mod cli;
pub mod commands;
pub mod config;
pub mod docker;
pub mod error;
pub mod logging;
pub mod policy;
pub mod runner;
pub mod server;
pub mod shadow;
pub mod tailnet;

// Re-export core types for convenience
pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use runner::{CommandResult, CommandRunner, ProcessRunner, RunOptions};
