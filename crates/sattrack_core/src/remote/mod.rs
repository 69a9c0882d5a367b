//! Remote satellite service contract and transport implementation.
//!
//! # Responsibility
//! - Define the logical operations the coordinator consumes.
//! - Isolate HTTP and JSON details from registry/poller orchestration.
//!
//! # Invariants
//! - Every operation is one request/response pair.
//! - Implementations return `RemoteError`, never panics or raw transport types.
//!
//! # See also
//! - `wire` for status/body interpretation shared by implementations.

use crate::model::position::PositionHistory;
use crate::model::satellite::{Satellite, SatelliteId, Selection, SelectionId};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod http;
pub mod wire;

pub use http::HttpSatelliteService;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure of one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection, timeout, or other transport-level failure.
    Transport(String),
    /// Missing or expired credentials (HTTP 401/403).
    Unauthorized,
    /// Target resource does not exist (HTTP 404).
    NotFound,
    /// Request rejected by validation (other 4xx), with the server reason.
    Rejected { status: u16, reason: Option<String> },
    /// Unexpected status, typically 5xx.
    Status { status: u16, body: String },
    /// Response body did not match the expected shape.
    Decode(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Unauthorized => write!(f, "not authorized; sign in again"),
            Self::NotFound => write!(f, "resource not found"),
            Self::Rejected { status, reason } => match reason {
                Some(reason) => write!(f, "request rejected ({status}): {reason}"),
                None => write!(f, "request rejected ({status})"),
            },
            Self::Status { status, body } => write!(f, "unexpected status {status}: {body}"),
            Self::Decode(message) => write!(f, "invalid response body: {message}"),
        }
    }
}

impl Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

/// Logical operations of the remote satellite service.
///
/// All calls are scoped to the current user by the implementation.
#[async_trait]
pub trait SatelliteService: Send + Sync {
    /// `GET catalog`: all trackable satellites.
    async fn list_catalog(&self) -> RemoteResult<Vec<Satellite>>;

    /// `GET selections`: the user's live selections.
    async fn list_selections(&self) -> RemoteResult<Vec<Selection>>;

    /// `POST selections {satellite}`: creates one live selection.
    async fn create_selection(&self, satellite_id: SatelliteId) -> RemoteResult<Selection>;

    /// `DELETE selections/{id}`: removes one live selection.
    async fn delete_selection(&self, selection_id: SelectionId) -> RemoteResult<()>;

    /// `GET positions`: latest samples for every active selection in one call.
    async fn fetch_positions(&self) -> RemoteResult<PositionHistory>;
}
