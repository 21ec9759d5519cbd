//! Runtime
//!
//! Application lifecycle (startup, shutdown) and execution modes
//! (HTTP server, one-shot commands).

pub mod lifetime;
pub mod modes;
