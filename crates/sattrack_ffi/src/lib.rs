//! Flutter-facing bindings for SatTrack core.

pub mod api;
