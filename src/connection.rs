//! The raw store primitives this crate composes.
//!
//! A [`Connection`] is the network client for the store. Every primitive is
//! callback driven: results arrive on observer objects, possibly on another
//! thread, possibly before the call returns. Nothing here blocks.

use crate::config::ConnectionSettings;
use crate::types::{
    AllReadCompletion, AllReadRequest, CorrelationId, Credentials, DropReason, EventData,
    ExpectedVersion, RecordedEvent, StreamReadCompletion, StreamReadRequest,
    SubscriptionConfirmation, WriteResult,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;

/// Receives the pushes of one live subscription.
pub trait SubscriptionObserver: Send + Sync {
    /// A new event was appended to the subscribed stream.
    fn on_event(&self, event: RecordedEvent);

    /// The store accepted the subscription.
    fn on_confirmed(&self, confirmation: SubscriptionConfirmation);

    /// The store dropped the subscription. No further calls follow.
    fn on_dropped(&self, reason: DropReason);
}

/// Receives the events of one read batch, then its completion.
pub trait ReadObserver<C>: Send {
    fn on_event(&mut self, event: RecordedEvent);

    fn on_complete(self: Box<Self>, completion: C);
}

/// Observer for stream reads.
pub type StreamReadObserver = Box<dyn ReadObserver<StreamReadCompletion>>;

/// Observer for `$all` reads.
pub type AllReadObserver = Box<dyn ReadObserver<AllReadCompletion>>;

/// Called once with the store's response to a write. Dropped uncalled if
/// the connection goes away first.
pub type WriteResponder = Box<dyn FnOnce(WriteResult) + Send>;

/// Network client for the store.
///
/// Implementations multiplex concurrent requests over one connection; the
/// client layer adds no locking of its own.
pub trait Connection: Send + Sync {
    fn subscribe_to_stream(
        &self,
        stream_id: &str,
        resolve_link_tos: bool,
        observer: Arc<dyn SubscriptionObserver>,
        credentials: Option<&Credentials>,
    ) -> CorrelationId;

    fn unsubscribe_from_stream(
        &self,
        correlation_id: CorrelationId,
        credentials: Option<&Credentials>,
    );

    fn read_stream_events_forward(
        &self,
        request: StreamReadRequest,
        credentials: Option<&Credentials>,
        observer: StreamReadObserver,
    );

    fn read_stream_events_backward(
        &self,
        request: StreamReadRequest,
        credentials: Option<&Credentials>,
        observer: StreamReadObserver,
    );

    fn read_all_events_forward(
        &self,
        request: AllReadRequest,
        credentials: Option<&Credentials>,
        observer: AllReadObserver,
    );

    fn read_all_events_backward(
        &self,
        request: AllReadRequest,
        credentials: Option<&Credentials>,
        observer: AllReadObserver,
    );

    fn write_events(
        &self,
        stream_id: &str,
        expected_version: ExpectedVersion,
        require_master: bool,
        events: Vec<EventData>,
        credentials: Option<&Credentials>,
        on_response: WriteResponder,
    );

    fn close(&self);
}

/// Opens connections.
pub trait Connector {
    /// Start connecting. The returned handle may be used once `readiness`
    /// has been signalled as connected.
    fn open(&self, settings: &ConnectionSettings, readiness: Readiness) -> Arc<dyn Connection>;
}

/// One-shot readiness signal handed to a [`Connector`].
///
/// Only the first signal counts; connectors that report every reconnect
/// may keep calling it.
#[derive(Clone)]
pub struct Readiness {
    sender: Sender<Result<(), String>>,
}

impl Readiness {
    pub(crate) fn new() -> (Self, Receiver<Result<(), String>>) {
        let (sender, receiver) = bounded(1);
        (Self { sender }, receiver)
    }

    pub fn connected(&self) {
        let _ = self.sender.try_send(Ok(()));
    }

    pub fn failed(&self, reason: impl Into<String>) {
        let _ = self.sender.try_send(Err(reason.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_first_signal_wins() {
        let (readiness, receiver) = Readiness::new();
        readiness.failed("refused");
        readiness.connected();
        assert_eq!(receiver.try_recv().unwrap(), Err("refused".to_string()));
        assert!(receiver.try_recv().is_err());
    }
}
