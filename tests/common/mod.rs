//! Shared fixtures for integration tests.

#![allow(dead_code)]

use eventline::{
    AllReadCompletion, AllReadRequest, Connection, CorrelationId, Credentials, DropReason,
    EventData, ExpectedVersion, OperationResult, Position, ReadObserver, ReadStatus, RecordedEvent,
    StreamReadCompletion, StreamReadRequest, SubscriptionConfirmation, SubscriptionObserver,
    Timestamp, WriteResult,
};
use eventline::connection::{AllReadObserver, StreamReadObserver, WriteResponder};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn event(stream: &str, number: u64) -> RecordedEvent {
    RecordedEvent {
        stream_id: stream.to_string(),
        event_number: number,
        event_id: Uuid::new_v4(),
        event_type: format!("event-{}", number),
        data: number.to_be_bytes().to_vec(),
        metadata: None,
        is_json: false,
        is_link: false,
        created: Timestamp::now(),
    }
}

pub fn events(stream: &str, numbers: impl IntoIterator<Item = u64>) -> Vec<RecordedEvent> {
    numbers.into_iter().map(|n| event(stream, n)).collect()
}

/// A connection answering from a fixed script.
///
/// Reads serve `history`. Each subscription is confirmed and then, unless
/// `silent` is set, immediately handed every event of `live`, before
/// `subscribe_to_stream` returns. Unsubscribing drops the subscription with
/// `Unsubscribed`.
pub struct ScriptedConnection {
    history: Vec<RecordedEvent>,
    live: Vec<RecordedEvent>,
    read_failure: Option<ReadStatus>,
    silent: bool,
    observers: Mutex<HashMap<CorrelationId, Arc<dyn SubscriptionObserver>>>,
    read_requests: Mutex<Vec<StreamReadRequest>>,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedConnection {
    pub fn new(history: Vec<RecordedEvent>, live: Vec<RecordedEvent>) -> Self {
        Self {
            history,
            live,
            read_failure: None,
            silent: false,
            observers: Mutex::new(HashMap::new()),
            read_requests: Mutex::new(Vec::new()),
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Complete every read with `status` instead of serving history.
    pub fn failing_reads(mut self, status: ReadStatus) -> Self {
        self.read_failure = Some(status);
        self
    }

    /// Confirm subscriptions but never push to them.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    /// Subscriptions opened and not yet unsubscribed.
    pub fn open_subscriptions(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn read_requests(&self) -> Vec<StreamReadRequest> {
        self.read_requests.lock().clone()
    }

    /// Push `event` to every open subscription.
    pub fn push(&self, event: RecordedEvent) {
        let observers: Vec<_> = self.observers.lock().values().cloned().collect();
        for observer in observers {
            observer.on_event(event.clone());
        }
    }

    /// Drop every open subscription from the store side.
    pub fn drop_all(&self, reason: DropReason) {
        let observers: Vec<_> = self.observers.lock().drain().map(|(_, o)| o).collect();
        for observer in observers {
            observer.on_dropped(reason.clone());
        }
    }
}

impl Connection for ScriptedConnection {
    fn subscribe_to_stream(
        &self,
        _stream_id: &str,
        _resolve_link_tos: bool,
        observer: Arc<dyn SubscriptionObserver>,
        _credentials: Option<&Credentials>,
    ) -> CorrelationId {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let id = CorrelationId::new();
        self.observers.lock().insert(id, Arc::clone(&observer));

        observer.on_confirmed(SubscriptionConfirmation {
            last_commit_position: self.history.len() as u64,
            last_event_number: self.history.last().map(|e| e.event_number),
        });
        if !self.silent {
            for event in &self.live {
                observer.on_event(event.clone());
            }
        }
        id
    }

    fn unsubscribe_from_stream(
        &self,
        correlation_id: CorrelationId,
        _credentials: Option<&Credentials>,
    ) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        let observer = self.observers.lock().remove(&correlation_id);
        if let Some(observer) = observer {
            observer.on_dropped(DropReason::Unsubscribed);
        }
    }

    fn read_stream_events_forward(
        &self,
        request: StreamReadRequest,
        _credentials: Option<&Credentials>,
        mut observer: StreamReadObserver,
    ) {
        self.read_requests.lock().push(request.clone());
        if let Some(status) = &self.read_failure {
            observer.on_complete(StreamReadCompletion::failed(status.clone()));
            return;
        }

        let selected: Vec<&RecordedEvent> = self
            .history
            .iter()
            .filter(|e| e.event_number >= request.from)
            .take(request.max_count as usize)
            .collect();
        let next = selected.last().map_or(request.from, |e| e.event_number + 1);
        for event in selected {
            observer.on_event(event.clone());
        }

        let last = self.history.last().map(|e| e.event_number);
        observer.on_complete(StreamReadCompletion {
            status: ReadStatus::Success,
            next_event_number: next,
            last_event_number: last,
            is_end_of_stream: last.map_or(true, |last| next > last),
        });
    }

    fn read_stream_events_backward(
        &self,
        _request: StreamReadRequest,
        _credentials: Option<&Credentials>,
        observer: StreamReadObserver,
    ) {
        observer.on_complete(StreamReadCompletion::failed(ReadStatus::Error(
            "not scripted".to_string(),
        )));
    }

    fn read_all_events_forward(
        &self,
        request: AllReadRequest,
        _credentials: Option<&Credentials>,
        observer: AllReadObserver,
    ) {
        observer.on_complete(AllReadCompletion {
            status: ReadStatus::Error("not scripted".to_string()),
            next_position: request.position,
        });
    }

    fn read_all_events_backward(
        &self,
        _request: AllReadRequest,
        _credentials: Option<&Credentials>,
        observer: AllReadObserver,
    ) {
        observer.on_complete(AllReadCompletion {
            status: ReadStatus::Error("not scripted".to_string()),
            next_position: Position::START,
        });
    }

    fn write_events(
        &self,
        _stream_id: &str,
        _expected_version: ExpectedVersion,
        _require_master: bool,
        _events: Vec<EventData>,
        _credentials: Option<&Credentials>,
        on_response: WriteResponder,
    ) {
        on_response(WriteResult {
            result: OperationResult::AccessDenied,
            message: "read-only script".to_string(),
            first_event_number: None,
            last_event_number: None,
        });
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.drop_all(DropReason::ConnectionClosed);
    }
}
