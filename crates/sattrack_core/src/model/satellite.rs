//! Catalog and selection records.
//!
//! # Responsibility
//! - Describe trackable satellites as published by the catalog endpoint.
//! - Describe a user's live selections with denormalized display names.
//!
//! # Invariants
//! - `Satellite::id` and `Selection::id` are stable and opaque to the client.
//! - A live `Selection` is never mutated; deselect destroys it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable catalog identifier assigned by the remote service.
pub type SatelliteId = i64;

/// Stable identifier of one live selection.
pub type SelectionId = i64;

/// One trackable satellite from the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Satellite {
    pub id: SatelliteId,
    /// Display name, also the key of position history entries.
    pub name: String,
    /// External catalog number (for example a NORAD id), when published.
    #[serde(default, rename = "satellite_id", skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

impl Satellite {
    pub fn new(id: SatelliteId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            external_id: None,
            is_active: true,
        }
    }
}

/// A user's active subscription to track one satellite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub id: SelectionId,
    /// Serialized as `satellite` to match the remote schema.
    #[serde(rename = "satellite")]
    pub satellite_id: SatelliteId,
    /// Denormalized copy of `Satellite::name` for rendering without a join.
    pub satellite_name: String,
    pub selected_at: DateTime<Utc>,
}

fn default_is_active() -> bool {
    true
}
