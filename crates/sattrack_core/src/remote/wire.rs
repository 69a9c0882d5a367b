//! Wire-level helpers for the remote satellite service.
//!
//! # Responsibility
//! - Map HTTP status + body pairs onto `RemoteError`.
//! - Extract the server-provided rejection reason from validation bodies.
//!
//! # Invariants
//! - Reason lookup order is `satellite[0]`, `non_field_errors[0]`, `error`,
//!   `detail`; the first non-blank match wins.
//! - Error bodies kept in `RemoteError::Status` are single-line and capped.

use super::RemoteError;
use crate::logging::sanitize_message;
use crate::model::satellite::SatelliteId;
use serde::Serialize;
use serde_json::Value;

pub const CATALOG_PATH: &str = "satellites/";
pub const SELECTIONS_PATH: &str = "selections/";
pub const POSITIONS_PATH: &str = "positions/";

const REASON_KEYS: &[&str] = &["satellite", "non_field_errors", "error", "detail"];
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Body of `POST selections`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectionRequest {
    pub satellite: SatelliteId,
}

/// Path of one selection resource.
pub fn selection_path(selection_id: i64) -> String {
    format!("{SELECTIONS_PATH}{selection_id}/")
}

/// Joins the normalized base URL with a relative resource path.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Translates a non-success response into `RemoteError`.
pub fn status_error(status: u16, body: &str) -> RemoteError {
    match status {
        401 | 403 => RemoteError::Unauthorized,
        404 => RemoteError::NotFound,
        400..=499 => RemoteError::Rejected {
            status,
            reason: rejection_reason(body),
        },
        _ => RemoteError::Status {
            status,
            body: sanitize_message(body, MAX_ERROR_BODY_CHARS),
        },
    }
}

/// Extracts the first user-facing reason from a validation error body.
pub fn rejection_reason(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    REASON_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(first_message)
}

fn first_message(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.as_str(),
        Value::Array(items) => items.first()?.as_str()?,
        _ => return None,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{endpoint, rejection_reason, selection_path, status_error, SelectionRequest};
    use crate::remote::RemoteError;

    #[test]
    fn reason_prefers_field_error_over_non_field_error() {
        let body = r#"{"non_field_errors": ["cap reached"], "satellite": ["Invalid pk \"9\""]}"#;
        assert_eq!(rejection_reason(body).as_deref(), Some("Invalid pk \"9\""));
    }

    #[test]
    fn reason_falls_back_through_known_keys() {
        let cap_body = r#"{"non_field_errors": ["You can only track 2 satellites at a time."]}"#;
        assert_eq!(
            rejection_reason(cap_body).as_deref(),
            Some("You can only track 2 satellites at a time.")
        );
        assert_eq!(
            rejection_reason(r#"{"error": "You have already selected this satellite."}"#)
                .as_deref(),
            Some("You have already selected this satellite.")
        );
        assert_eq!(
            rejection_reason(r#"{"detail": "Throttled"}"#).as_deref(),
            Some("Throttled")
        );
    }

    #[test]
    fn reason_is_none_for_unrecognized_or_blank_bodies() {
        assert!(rejection_reason("<html>Bad Request</html>").is_none());
        assert!(rejection_reason(r#"{"satellite": []}"#).is_none());
        assert!(rejection_reason(r#"{"error": "   "}"#).is_none());
    }

    #[test]
    fn status_error_maps_status_classes() {
        assert_eq!(status_error(401, ""), RemoteError::Unauthorized);
        assert_eq!(status_error(404, "{}"), RemoteError::NotFound);
        assert_eq!(
            status_error(400, r#"{"error": "dup"}"#),
            RemoteError::Rejected {
                status: 400,
                reason: Some("dup".to_string())
            }
        );

        let long_body = "x".repeat(500);
        match status_error(502, &long_body) {
            RemoteError::Status { status, body } => {
                assert_eq!(status, 502);
                assert!(body.ends_with("..."));
                assert_eq!(body.chars().count(), 203);
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn paths_and_request_body_match_remote_schema() {
        assert_eq!(selection_path(12), "selections/12/");
        assert_eq!(
            endpoint("http://localhost:8000/api/", "/positions/"),
            "http://localhost:8000/api/positions/"
        );
        assert_eq!(
            serde_json::to_string(&SelectionRequest { satellite: 3 }).expect("serialize"),
            r#"{"satellite":3}"#
        );
    }
}
