//! Tracking session services.
//!
//! # Responsibility
//! - Orchestrate remote calls into selection, polling, and refresh use cases.
//! - Keep UI/FFI layers decoupled from transport details.
//!
//! # See also
//! - `coordinator` for the composition root.

pub mod coordinator;
pub mod position_poller;
pub mod refresh_bus;
pub mod selection_registry;
