//! Tracking error taxonomy surfaced to presentation.
//!
//! # Responsibility
//! - Name every failure mode the coordinator can report.
//! - Provide stable `error_code` strings for structured logs.
//!
//! # Invariants
//! - Raw transport errors never cross this boundary; registry and poller
//!   translate `RemoteError` before returning.
//! - No variant is fatal; every failure leaves the coordinator usable.

use crate::model::satellite::{SatelliteId, SelectionId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TrackingResult<T> = Result<T, TrackingError>;

/// Failures reported by registry, poller, and coordinator operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    /// Transport or server failure while talking to the remote service.
    ServiceUnavailable(String),
    /// Local precondition: the selection cap is already reached.
    SelectionLimitExceeded { limit: usize },
    /// Local precondition: the satellite is already selected.
    AlreadySelected(SatelliteId),
    /// Server rejected a mutation that passed the local precondition.
    ConstraintViolated(String),
    /// Deselect target is not a live selection of the current user.
    NotFound(SelectionId),
    /// One poll tick failed; the poller keeps running.
    PollFailure(String),
}

impl TrackingError {
    /// Stable identifier used in `error_code=` log fields.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::SelectionLimitExceeded { .. } => "selection_limit_exceeded",
            Self::AlreadySelected(_) => "already_selected",
            Self::ConstraintViolated(_) => "constraint_violated",
            Self::NotFound(_) => "not_found",
            Self::PollFailure(_) => "poll_failure",
        }
    }

    /// Whether the failure was decided locally without a round trip.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::SelectionLimitExceeded { .. } | Self::AlreadySelected(_)
        )
    }
}

impl Display for TrackingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceUnavailable(message) => write!(f, "{message}"),
            Self::SelectionLimitExceeded { limit } => write!(
                f,
                "You can only track {limit} satellites at a time. Please stop tracking one first."
            ),
            Self::AlreadySelected(_) => write!(f, "You are already tracking this satellite."),
            Self::ConstraintViolated(reason) => write!(f, "{reason}"),
            Self::NotFound(id) => write!(f, "selection not found: {id}"),
            Self::PollFailure(message) => write!(f, "{message}"),
        }
    }
}

impl Error for TrackingError {}

#[cfg(test)]
mod tests {
    use super::TrackingError;

    #[test]
    fn local_errors_are_flagged() {
        assert!(TrackingError::SelectionLimitExceeded { limit: 2 }.is_local());
        assert!(TrackingError::AlreadySelected(1).is_local());
        assert!(!TrackingError::ConstraintViolated("race".to_string()).is_local());
        assert!(!TrackingError::PollFailure("down".to_string()).is_local());
    }

    #[test]
    fn limit_message_mentions_cap() {
        let message = TrackingError::SelectionLimitExceeded { limit: 2 }.to_string();
        assert!(message.contains("only track 2 satellites"));
        assert_eq!(TrackingError::NotFound(9).error_code(), "not_found");
    }
}
