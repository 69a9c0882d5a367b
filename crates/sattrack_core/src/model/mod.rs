//! Tracking domain model shared by registry, poller, and presentation.
//!
//! # Responsibility
//! - Define the records exchanged with the remote satellite service.
//! - Keep one canonical shape for catalog, selection, and position views.
//!
//! # Invariants
//! - Records are immutable snapshots; the client never edits them in place.
//! - Satellite and selection identities are assigned by the remote service.

pub mod position;
pub mod satellite;
