//! Live subscriber: store pushes republished into an event sink.

use super::token::SubscriptionToken;
use crate::config::ReadOptions;
use crate::connection::{Connection, SubscriptionObserver};
use crate::error::{ClientError, Result};
use crate::sequence::{self, EventSequence, EventSink};
use crate::types::{Credentials, DropReason, RecordedEvent, SubscriptionConfirmation};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Bridges subscription callbacks to a sink.
struct Forwarder {
    stream_id: String,
    sink: Arc<dyn EventSink>,
    confirmations: Sender<SubscriptionConfirmation>,
}

impl SubscriptionObserver for Forwarder {
    fn on_event(&self, event: RecordedEvent) {
        trace!(stream = %self.stream_id, event_number = event.event_number, "live event");
        self.sink.produce(event);
    }

    fn on_confirmed(&self, confirmation: SubscriptionConfirmation) {
        debug!(
            stream = %self.stream_id,
            last_event_number = ?confirmation.last_event_number,
            "subscription confirmed"
        );
        let _ = self.confirmations.send(confirmation);
    }

    fn on_dropped(&self, reason: DropReason) {
        match reason {
            DropReason::Unsubscribed => self.sink.end(),
            reason => {
                warn!(stream = %self.stream_id, ?reason, "subscription dropped");
                self.sink.fail(ClientError::SubscriptionDropped(reason));
            }
        }
    }
}

/// Subscribe `sink` to live events on `stream_id`.
///
/// `token` must be fresh; it is bound to the store's correlation id once
/// the subscribe call returns, so a cancel issued from inside an event
/// callback still reaches the store. Returns the confirmation channel.
pub(crate) fn open(
    connection: &Arc<dyn Connection>,
    stream_id: &str,
    options: &ReadOptions,
    credentials: Option<&Credentials>,
    sink: Arc<dyn EventSink>,
    token: &SubscriptionToken,
) -> Receiver<SubscriptionConfirmation> {
    let (confirmations, confirmed) = unbounded();
    let observer = Arc::new(Forwarder {
        stream_id: stream_id.to_string(),
        sink,
        confirmations,
    });

    let correlation_id = connection.subscribe_to_stream(
        stream_id,
        options.resolve_link_tos,
        observer,
        credentials,
    );
    token.bind(correlation_id);
    debug!(stream = stream_id, "live subscription opened");

    confirmed
}

/// A live subscription: the pushed events, plus a way to stop them.
///
/// Iterating yields events as the store pushes them. Closing, dropping, or
/// cancelling the token unsubscribes.
pub struct LiveSubscription {
    events: EventSequence,
    token: SubscriptionToken,
    confirmations: Receiver<SubscriptionConfirmation>,
}

impl LiveSubscription {
    pub(crate) fn open(
        connection: &Arc<dyn Connection>,
        stream_id: &str,
        options: &ReadOptions,
        credentials: Option<&Credentials>,
    ) -> Self {
        let (writer, events) = sequence::channel();
        let token = SubscriptionToken::new(Arc::clone(connection), credentials.cloned(), stream_id);

        let cancel = token.clone();
        writer.on_close(move || {
            cancel.cancel();
        });

        let confirmations = open(
            connection,
            stream_id,
            options,
            credentials,
            Arc::new(writer),
            &token,
        );

        Self {
            events,
            token,
            confirmations,
        }
    }

    pub fn token(&self) -> &SubscriptionToken {
        &self.token
    }

    /// Wait for the store to confirm the subscription.
    pub fn wait_confirmed(&self, timeout: Duration) -> Result<SubscriptionConfirmation> {
        self.confirmations
            .recv_timeout(timeout)
            .map_err(|_| ClientError::Timeout(timeout))
    }

    /// Confirmation, if it already arrived.
    pub fn try_confirmed(&self) -> Option<SubscriptionConfirmation> {
        self.confirmations.try_recv().ok()
    }

    pub fn events(&mut self) -> &mut EventSequence {
        &mut self.events
    }

    /// Unsubscribe and stop delivering events. Idempotent, and a no-op
    /// once the store has ended or dropped the subscription.
    pub fn close(&mut self) {
        self.events.close();
    }
}

impl Iterator for LiveSubscription {
    type Item = Result<RecordedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.next()
    }
}

impl std::fmt::Debug for LiveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSubscription")
            .field("events", &self.events)
            .field("token", &self.token)
            .finish()
    }
}
