pub mod policy;
pub mod serve;
pub mod sync;

// Re-export command functions
pub use policy::cmd_policy;
pub use serve::cmd_serve;
pub use sync::cmd_sync;
