//! Service layer
//!
//! Business logic shared by the HTTP handlers, the background transfer and
//! the command-line entry points.

pub mod consent;
pub mod customer;
pub mod geoip;
pub mod reconciler;
pub mod remote;
pub mod session;
pub mod tracking;

pub use consent::{ConsentGate, ConsentState, TrackingDecision};
pub use customer::{CustomerService, CustomerSettings};
pub use geoip::{GeoInfo, GeoIpLookup, GeoIpProvider};
pub use reconciler::{BatchOrigin, ReconcileOutcome, StagingReconciler};
pub use remote::RemoteClient;
pub use session::{AntiForgery, SessionStore, VisitorSession};
pub use tracking::{PageView, TrackOutcome, VisitorTracker};
