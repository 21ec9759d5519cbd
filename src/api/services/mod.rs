pub mod admin;
pub mod health;
pub mod track;

pub use admin::admin_routes;
pub use health::{AppStartTime, HealthService, health_routes};
pub use track::track_routes;
