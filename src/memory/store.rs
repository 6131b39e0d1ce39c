//! In-process event store.

use super::subscriptions::SubscriptionRegistry;
use crate::config::ConnectionSettings;
use crate::connection::{
    AllReadObserver, Connection, Connector, Readiness, StreamReadObserver, SubscriptionObserver,
    WriteResponder,
};
use crate::error::{ClientError, Result};
use crate::types::{
    AllReadCompletion, AllReadRequest, CorrelationId, Credentials, DropReason, EventData,
    EventNumber, ExpectedVersion, OperationResult, Position, ReadStatus, RecordedEvent,
    StreamReadCompletion, StreamReadRequest, SubscriptionConfirmation, Timestamp, WriteResult,
    LINK_EVENT_TYPE,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Stored events: per stream, plus the global `$all` order.
#[derive(Default)]
struct EventLog {
    streams: HashMap<String, Vec<RecordedEvent>>,
    /// Index into this vector is the event's `$all` position.
    all: Vec<RecordedEvent>,
}

impl EventLog {
    fn last_event_number(&self, stream_id: &str) -> Option<EventNumber> {
        self.streams
            .get(stream_id)
            .and_then(|events| events.last())
            .map(|e| e.event_number)
    }

    /// Follow a `$>` link to its target, if it is one and the target exists.
    fn resolve(&self, event: &RecordedEvent) -> RecordedEvent {
        if event.event_type != LINK_EVENT_TYPE {
            return event.clone();
        }
        let target = std::str::from_utf8(&event.data)
            .ok()
            .and_then(|text| text.split_once('@'))
            .and_then(|(number, stream)| Some((number.parse::<EventNumber>().ok()?, stream)))
            .and_then(|(number, stream)| self.streams.get(stream)?.get(number as usize));

        match target {
            Some(target) => RecordedEvent {
                is_link: true,
                ..target.clone()
            },
            None => event.clone(),
        }
    }

    fn view(&self, event: &RecordedEvent, resolve_link_tos: bool) -> RecordedEvent {
        if resolve_link_tos {
            self.resolve(event)
        } else {
            event.clone()
        }
    }
}

struct Inner {
    log: RwLock<EventLog>,
    subscriptions: SubscriptionRegistry,
    credentials: RwLock<Option<Credentials>>,
    closed: AtomicBool,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

/// An event store living in this process.
///
/// Implements [`Connection`] and [`Connector`], so a
/// [`Client`](crate::Client) can run against it unchanged. Clones share the
/// same data.
///
/// Callbacks run on the thread that triggered them (the reader, the
/// appender, the subscriber), never under the store's locks.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                log: RwLock::new(EventLog::default()),
                subscriptions: SubscriptionRegistry::default(),
                credentials: RwLock::new(None),
                closed: AtomicBool::new(false),
                subscribe_calls: AtomicUsize::new(0),
                unsubscribe_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Require these credentials on every operation.
    pub fn with_credentials(self, credentials: Credentials) -> Self {
        *self.inner.credentials.write() = Some(credentials);
        self
    }

    // --- Writes ---

    /// Append events to a stream, checking `expected_version`.
    pub fn append(
        &self,
        stream_id: &str,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
    ) -> Result<WriteResult> {
        let credentials = self.inner.credentials.read().clone();
        let result = self.write(stream_id, expected_version, events, credentials.as_ref())?;
        if result.is_success() {
            Ok(result)
        } else {
            Err(ClientError::WriteConflict(Box::new(result)))
        }
    }

    fn write(
        &self,
        stream_id: &str,
        expected_version: ExpectedVersion,
        events: Vec<EventData>,
        credentials: Option<&Credentials>,
    ) -> Result<WriteResult> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        if !self.authorized(credentials) {
            return Ok(rejected(OperationResult::AccessDenied, "access denied"));
        }

        let result = {
            let mut log = self.inner.log.write();
            let current = log.last_event_number(stream_id);
            if !expected_version.matches(current) {
                debug!(stream = stream_id, ?expected_version, ?current, "wrong expected version");
                return Ok(rejected(
                    OperationResult::WrongExpectedVersion,
                    &format!("expected {:?}, stream is at {:?}", expected_version, current),
                ));
            }

            let first = current.map_or(0, |n| n + 1);
            let mut next = first;
            for data in events {
                let event = RecordedEvent {
                    stream_id: stream_id.to_string(),
                    event_number: next,
                    event_id: data.event_id,
                    event_type: data.event_type,
                    data: data.data,
                    metadata: data.metadata,
                    is_json: data.is_json,
                    is_link: false,
                    created: Timestamp::now(),
                };
                next += 1;

                log.all.push(event.clone());
                log.streams
                    .entry(stream_id.to_string())
                    .or_default()
                    .push(event.clone());
                // Queued under the log lock so delivery order is append order.
                self.inner
                    .subscriptions
                    .publish(&event, |e| log.resolve(e));
            }

            WriteResult {
                result: OperationResult::Success,
                message: String::new(),
                first_event_number: (next > first).then_some(first),
                last_event_number: (next > first).then(|| next - 1),
            }
        };

        trace!(stream = stream_id, last = ?result.last_event_number, "appended");
        self.inner.subscriptions.flush();
        Ok(result)
    }

    // --- Inspection ---

    /// All events of a stream, in order.
    pub fn stream_events(&self, stream_id: &str) -> Vec<RecordedEvent> {
        self.inner
            .log
            .read()
            .streams
            .get(stream_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_event_number(&self, stream_id: &str) -> Option<EventNumber> {
        self.inner.log.read().last_event_number(stream_id)
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.count()
    }

    /// Number of subscribe calls received.
    pub fn subscribe_calls(&self) -> usize {
        self.inner.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of unsubscribe calls received.
    pub fn unsubscribe_calls(&self) -> usize {
        self.inner.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Drop every live subscription from the store side.
    pub fn drop_subscriptions(&self, reason: DropReason) -> usize {
        let dropped = self.inner.subscriptions.remove_all(reason);
        self.inner.subscriptions.flush();
        dropped
    }

    fn authorized(&self, credentials: Option<&Credentials>) -> bool {
        match &*self.inner.credentials.read() {
            Some(required) => credentials == Some(required),
            None => true,
        }
    }

    // --- Reads ---

    fn read_stream(
        &self,
        request: &StreamReadRequest,
        forward: bool,
    ) -> (Vec<RecordedEvent>, StreamReadCompletion) {
        let log = self.inner.log.read();
        let Some(stream) = log.streams.get(&request.stream_id) else {
            return (Vec::new(), StreamReadCompletion::failed(ReadStatus::NoStream));
        };
        let last = stream.last().map(|e| e.event_number);
        let max = usize::try_from(request.max_count).unwrap_or(usize::MAX);

        let selected: Vec<&RecordedEvent> = if forward {
            stream
                .iter()
                .skip(usize::try_from(request.from).unwrap_or(usize::MAX))
                .take(max)
                .collect()
        } else {
            let end = usize::try_from(request.from)
                .unwrap_or(usize::MAX)
                .min(stream.len().saturating_sub(1));
            if stream.is_empty() {
                Vec::new()
            } else {
                stream[..=end].iter().rev().take(max).collect()
            }
        };

        let (next_event_number, is_end_of_stream) = if forward {
            let next = selected
                .last()
                .map_or(request.from, |e| e.event_number + 1);
            (next, last.map_or(true, |last| next > last))
        } else {
            match selected.last() {
                Some(e) if e.event_number > 0 => (e.event_number - 1, false),
                _ => (0, true),
            }
        };

        let events = selected
            .into_iter()
            .map(|e| log.view(e, request.resolve_link_tos))
            .collect();
        let completion = StreamReadCompletion {
            status: ReadStatus::Success,
            next_event_number,
            last_event_number: last,
            is_end_of_stream,
        };
        (events, completion)
    }

    fn read_all(
        &self,
        request: &AllReadRequest,
        forward: bool,
    ) -> (Vec<RecordedEvent>, AllReadCompletion) {
        let log = self.inner.log.read();
        let len = log.all.len() as u64;
        let start = request.position.commit.min(len);
        let max = request.max_count.min(len);

        let indexes: Vec<u64> = if forward {
            (start..len).take(max as usize).collect()
        } else {
            (0..start).rev().take(max as usize).collect()
        };
        let next = if forward {
            indexes.last().map_or(start, |i| i + 1)
        } else {
            indexes.last().copied().unwrap_or(0)
        };

        let events = indexes
            .iter()
            .map(|&i| log.view(&log.all[i as usize], request.resolve_link_tos))
            .collect();
        let completion = AllReadCompletion {
            status: ReadStatus::Success,
            next_position: Position::new(next, next),
        };
        (events, completion)
    }

    fn serve_stream_read(
        &self,
        request: StreamReadRequest,
        credentials: Option<&Credentials>,
        mut observer: StreamReadObserver,
        forward: bool,
    ) {
        if self.is_closed() {
            return;
        }
        if !self.authorized(credentials) {
            observer.on_complete(StreamReadCompletion::failed(ReadStatus::AccessDenied));
            return;
        }
        let (events, completion) = self.read_stream(&request, forward);
        for event in events {
            observer.on_event(event);
        }
        observer.on_complete(completion);
    }

    fn serve_all_read(
        &self,
        request: AllReadRequest,
        credentials: Option<&Credentials>,
        mut observer: AllReadObserver,
        forward: bool,
    ) {
        if self.is_closed() {
            return;
        }
        if !self.authorized(credentials) {
            observer.on_complete(AllReadCompletion {
                status: ReadStatus::AccessDenied,
                next_position: request.position,
            });
            return;
        }
        let (events, completion) = self.read_all(&request, forward);
        for event in events {
            observer.on_event(event);
        }
        observer.on_complete(completion);
    }
}

fn rejected(result: OperationResult, message: &str) -> WriteResult {
    WriteResult {
        result,
        message: message.to_string(),
        first_event_number: None,
        last_event_number: None,
    }
}

impl Connection for MemoryStore {
    fn subscribe_to_stream(
        &self,
        stream_id: &str,
        resolve_link_tos: bool,
        observer: Arc<dyn SubscriptionObserver>,
        credentials: Option<&Credentials>,
    ) -> CorrelationId {
        self.inner.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let id = CorrelationId::new();

        if self.is_closed() {
            observer.on_dropped(DropReason::ConnectionClosed);
            return id;
        }
        if !self.authorized(credentials) {
            observer.on_dropped(DropReason::AccessDenied);
            return id;
        }

        {
            // Hold the log so no append lands between "now" and registration.
            let log = self.inner.log.read();
            let confirmation = SubscriptionConfirmation {
                last_commit_position: log.all.len() as u64,
                last_event_number: log.last_event_number(stream_id),
            };
            self.inner
                .subscriptions
                .register(id, stream_id, resolve_link_tos, observer, confirmation);
        }
        debug!(stream = stream_id, %id, "subscribed");
        self.inner.subscriptions.flush();
        id
    }

    fn unsubscribe_from_stream(
        &self,
        correlation_id: CorrelationId,
        _credentials: Option<&Credentials>,
    ) {
        self.inner.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .inner
            .subscriptions
            .remove(correlation_id, DropReason::Unsubscribed)
        {
            debug!(id = %correlation_id, "unsubscribed");
        }
        self.inner.subscriptions.flush();
    }

    fn read_stream_events_forward(
        &self,
        request: StreamReadRequest,
        credentials: Option<&Credentials>,
        observer: StreamReadObserver,
    ) {
        self.serve_stream_read(request, credentials, observer, true);
    }

    fn read_stream_events_backward(
        &self,
        request: StreamReadRequest,
        credentials: Option<&Credentials>,
        observer: StreamReadObserver,
    ) {
        self.serve_stream_read(request, credentials, observer, false);
    }

    fn read_all_events_forward(
        &self,
        request: AllReadRequest,
        credentials: Option<&Credentials>,
        observer: AllReadObserver,
    ) {
        self.serve_all_read(request, credentials, observer, true);
    }

    fn read_all_events_backward(
        &self,
        request: AllReadRequest,
        credentials: Option<&Credentials>,
        observer: AllReadObserver,
    ) {
        self.serve_all_read(request, credentials, observer, false);
    }

    fn write_events(
        &self,
        stream_id: &str,
        expected_version: ExpectedVersion,
        _require_master: bool,
        events: Vec<EventData>,
        credentials: Option<&Credentials>,
        on_response: WriteResponder,
    ) {
        // A closed store drops the responder unanswered.
        if let Ok(result) = self.write(stream_id, expected_version, events, credentials) {
            on_response(result);
        }
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.drop_subscriptions(DropReason::ConnectionClosed);
        debug!(dropped, "memory store closed");
    }
}

impl Connector for MemoryStore {
    fn open(&self, _settings: &ConnectionSettings, readiness: Readiness) -> Arc<dyn Connection> {
        if self.is_closed() {
            readiness.failed("store is closed");
        } else {
            readiness.connected();
        }
        Arc::new(self.clone())
    }
}
