//! Core tracking session logic for SatTrack.
//! This crate is the single source of truth for selection and polling rules.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod remote;
pub mod service;
pub mod session;

pub use config::{ConfigError, TrackerConfig};
pub use error::{TrackingError, TrackingResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::position::{PositionHistory, PositionSample, TrackStatus};
pub use model::satellite::{Satellite, SatelliteId, Selection, SelectionId};
pub use remote::{HttpSatelliteService, RemoteError, RemoteResult, SatelliteService};
pub use service::coordinator::{TrackingCoordinator, TrackingSnapshot};
pub use service::position_poller::{
    ActiveSatellites, PollerPhase, PollerSnapshot, PositionPoller, TickOutcome,
};
pub use service::refresh_bus::{RefreshBus, RefreshSubscriber, RefreshToken};
pub use service::selection_registry::SelectionRegistry;
pub use session::{StaticSession, UserSession};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
