//! HTTP surface: visitor tracking endpoints, admin API and health probes.

pub mod constants;
pub mod middleware;
pub mod services;
pub mod types;
