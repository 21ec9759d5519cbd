//! Mode routing
//!
//! - Server mode (HTTP server plus hourly transfer)
//! - One-shot commands (transfer, sync, status, config)

pub mod cli;
pub mod server;

pub use cli::run_command;
pub use server::run_server;
