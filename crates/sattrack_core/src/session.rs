//! Current-user capability consumed by the remote client.
//!
//! Authentication itself lives outside this crate; the coordinator only needs
//! a display username and a bearer token for requests.

use std::fmt::{Debug, Formatter};

/// Opaque "current user" context.
pub trait UserSession: Send + Sync {
    fn username(&self) -> &str;

    /// Access token sent as `Authorization: Bearer <token>`, if signed in.
    fn access_token(&self) -> Option<String>;
}

/// Session backed by a token obtained elsewhere.
#[derive(Clone)]
pub struct StaticSession {
    username: String,
    access_token: Option<String>,
}

impl StaticSession {
    pub fn new(username: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            username: username.into(),
            access_token: access_token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous", None)
    }
}

impl UserSession for StaticSession {
    fn username(&self) -> &str {
        &self.username
    }

    fn access_token(&self) -> Option<String> {
        self.access_token.clone()
    }
}

// Tokens must not leak into logs through `{:?}`.
impl Debug for StaticSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSession")
            .field("username", &self.username)
            .field("has_token", &self.access_token.is_some())
            .finish()
    }
}
