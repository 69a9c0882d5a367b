//! Refresh Bus: a monotonic invalidation token with coalescing subscribers.
//!
//! # Responsibility
//! - Let any mutation invalidate dependent views with one `publish()`.
//! - Let each subscriber detect "something changed since I last acted".
//!
//! # Invariants
//! - The token only increases; `publish()` never loses an increment.
//! - Equal tokens across two observations mean no invalidation in between.
//! - A subscriber observes any number of publishes since its last
//!   acknowledgement as exactly one change.

use std::sync::Arc;
use tokio::sync::watch;

/// Monotonic invalidation counter value.
pub type RefreshToken = u64;

/// Shared single-counter publish/subscribe primitive.
///
/// Cloning yields another handle to the same counter.
#[derive(Debug, Clone)]
pub struct RefreshBus {
    sender: Arc<watch::Sender<RefreshToken>>,
}

impl Default for RefreshBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshBus {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Increments the token and wakes subscribers. Returns the new token.
    pub fn publish(&self) -> RefreshToken {
        let mut published = 0;
        // send_modify updates the value even when no receiver is alive.
        self.sender.send_modify(|token| {
            *token += 1;
            published = *token;
        });
        published
    }

    pub fn current_token(&self) -> RefreshToken {
        *self.sender.borrow()
    }

    /// Creates a subscriber that treats the current token as already seen.
    pub fn subscribe(&self) -> RefreshSubscriber {
        let receiver = self.sender.subscribe();
        let last_seen = *receiver.borrow();
        RefreshSubscriber {
            receiver,
            last_seen,
        }
    }
}

/// Reader side of the bus that remembers the last token it acted on.
#[derive(Debug)]
pub struct RefreshSubscriber {
    receiver: watch::Receiver<RefreshToken>,
    last_seen: RefreshToken,
}

impl RefreshSubscriber {
    pub fn last_seen(&self) -> RefreshToken {
        self.last_seen
    }

    /// Whether the bus moved past the last acknowledged token.
    pub fn has_pending(&self) -> bool {
        *self.receiver.borrow() != self.last_seen
    }

    /// Marks the current token as seen. Returns it when it was new.
    pub fn acknowledge(&mut self) -> Option<RefreshToken> {
        let current = *self.receiver.borrow_and_update();
        if current == self.last_seen {
            return None;
        }
        self.last_seen = current;
        Some(current)
    }

    /// Waits until the token differs from the last acknowledged one.
    ///
    /// Returns `None` once every bus handle is dropped and nothing is pending.
    /// Cancel-safe: dropping the future loses no publish.
    pub async fn changed(&mut self) -> Option<RefreshToken> {
        loop {
            if let Some(token) = self.acknowledge() {
                return Some(token);
            }
            if self.receiver.changed().await.is_err() {
                return self.acknowledge();
            }
        }
    }
}
