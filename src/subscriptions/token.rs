//! Opaque cancellation handle for one live subscription.

use crate::connection::Connection;
use crate::types::{CorrelationId, Credentials};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenState {
    /// Subscribe issued, correlation id not known yet.
    Pending,
    Bound(CorrelationId),
    /// Cancelled before the id was known; unsubscribe once it is.
    CancelRequested,
    Cancelled,
}

struct TokenInner {
    state: Mutex<TokenState>,
    connection: Arc<dyn Connection>,
    credentials: Option<Credentials>,
    stream_id: String,
}

/// Cancels one live subscription, at most once.
///
/// The correlation id stays inside; the only thing a holder can do is
/// cancel. Cancelling twice, or after the subscription already ended, does
/// nothing.
#[derive(Clone)]
pub struct SubscriptionToken {
    inner: Arc<TokenInner>,
}

impl SubscriptionToken {
    pub(crate) fn new(
        connection: Arc<dyn Connection>,
        credentials: Option<Credentials>,
        stream_id: &str,
    ) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                state: Mutex::new(TokenState::Pending),
                connection,
                credentials,
                stream_id: stream_id.to_string(),
            }),
        }
    }

    /// Record the id the store returned for the subscribe call.
    pub(crate) fn bind(&self, correlation_id: CorrelationId) {
        let unsubscribe = {
            let mut state = self.inner.state.lock();
            match *state {
                TokenState::Pending => {
                    *state = TokenState::Bound(correlation_id);
                    false
                }
                TokenState::CancelRequested => {
                    *state = TokenState::Cancelled;
                    true
                }
                TokenState::Bound(_) | TokenState::Cancelled => false,
            }
        };
        if unsubscribe {
            self.unsubscribe(correlation_id);
        }
    }

    /// Cancel the subscription. Returns true only for the call that
    /// actually cancelled it.
    pub fn cancel(&self) -> bool {
        let bound = {
            let mut state = self.inner.state.lock();
            match *state {
                TokenState::Pending => {
                    *state = TokenState::CancelRequested;
                    return true;
                }
                TokenState::Bound(id) => {
                    *state = TokenState::Cancelled;
                    id
                }
                TokenState::CancelRequested | TokenState::Cancelled => return false,
            }
        };
        self.unsubscribe(bound);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            *self.inner.state.lock(),
            TokenState::CancelRequested | TokenState::Cancelled
        )
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    fn unsubscribe(&self, correlation_id: CorrelationId) {
        debug!(stream = %self.inner.stream_id, "unsubscribing");
        self.inner
            .connection
            .unsubscribe_from_stream(correlation_id, self.inner.credentials.as_ref());
    }
}

impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("stream_id", &self.inner.stream_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
