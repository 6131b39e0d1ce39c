//! Core types for the event store client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Position of an event within its stream.
pub type EventNumber = u64;

/// Backward reads starting here begin at the last event of the stream.
pub const STREAM_END: EventNumber = EventNumber::MAX;

/// Event type marking a link to an event in another stream.
pub const LINK_EVENT_TYPE: &str = "$>";

/// Position in the global `$all` log.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Position {
    pub commit: u64,
    pub prepare: u64,
}

impl Position {
    pub const START: Position = Position {
        commit: 0,
        prepare: 0,
    };

    pub const END: Position = Position {
        commit: u64::MAX,
        prepare: u64::MAX,
    };

    pub fn new(commit: u64, prepare: u64) -> Self {
        Self { commit, prepare }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({}/{})", self.commit, self.prepare)
    }
}

/// Identifier the store assigns to one live subscription.
///
/// Connections mint these; callers only ever see them wrapped in a
/// [`SubscriptionToken`](crate::subscriptions::SubscriptionToken).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        CorrelationId(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        CorrelationId(id)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self.0)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Username/password pair sent with every operation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// An event as stored and delivered by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Stream the event belongs to.
    pub stream_id: String,

    /// Position in the stream (assigned by store).
    pub event_number: EventNumber,

    /// Writer-assigned unique id.
    pub event_id: Uuid,

    /// Application-defined type.
    pub event_type: String,

    /// Opaque payload.
    pub data: Vec<u8>,

    /// Opaque metadata, if any was written.
    pub metadata: Option<Vec<u8>>,

    /// Whether `data` is JSON.
    pub is_json: bool,

    /// True when this record was reached by resolving a link event.
    pub is_link: bool,

    /// When the store committed the event.
    pub created: Timestamp,
}

impl RecordedEvent {
    /// Decode the payload as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }
}

/// Input for a write (before the store assigns numbers).
#[derive(Clone, Debug, PartialEq)]
pub struct EventData {
    pub event_id: Uuid,
    pub event_type: String,
    pub data: Vec<u8>,
    pub metadata: Option<Vec<u8>>,
    pub is_json: bool,
}

impl EventData {
    /// Create a new event with JSON payload.
    pub fn json(
        event_type: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            data: serde_json::to_vec(payload)?,
            metadata: None,
            is_json: true,
        })
    }

    /// Create a new event with raw bytes.
    pub fn binary(event_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            data,
            metadata: None,
            is_json: false,
        }
    }

    /// Create a link pointing at `event_number` in `stream_id`.
    pub fn link_to(stream_id: &str, event_number: EventNumber) -> Self {
        Self::binary(
            LINK_EVENT_TYPE,
            format!("{}@{}", event_number, stream_id).into_bytes(),
        )
    }

    /// Attach JSON metadata.
    pub fn with_metadata(mut self, metadata: &impl Serialize) -> Result<Self, serde_json::Error> {
        self.metadata = Some(serde_json::to_vec(metadata)?);
        Ok(self)
    }
}

/// Optimistic concurrency check for writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Write regardless of the stream's current version.
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// The stream's last event number must equal this.
    Exact(EventNumber),
}

impl ExpectedVersion {
    /// Check against the stream's current last event number.
    pub fn matches(self, current: Option<EventNumber>) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => current.is_none(),
            ExpectedVersion::Exact(n) => current == Some(n),
        }
    }
}

/// Result code of a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Success,
    PrepareTimeout,
    CommitTimeout,
    ForwardTimeout,
    WrongExpectedVersion,
    StreamDeleted,
    InvalidTransaction,
    AccessDenied,
}

/// Full response to a write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    pub result: OperationResult,
    pub message: String,
    /// First number assigned (success only).
    pub first_event_number: Option<EventNumber>,
    /// Last number assigned (success only).
    pub last_event_number: Option<EventNumber>,
}

impl WriteResult {
    pub fn is_success(&self) -> bool {
        self.result == OperationResult::Success
    }
}

/// Status reported at the end of a read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    Success,
    NoStream,
    StreamDeleted,
    NotModified,
    AccessDenied,
    Error(String),
}

/// Completion of a stream read batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamReadCompletion {
    pub status: ReadStatus,
    /// Where a follow-up read would start.
    pub next_event_number: EventNumber,
    /// Last event number of the stream at read time.
    pub last_event_number: Option<EventNumber>,
    pub is_end_of_stream: bool,
}

impl StreamReadCompletion {
    pub fn failed(status: ReadStatus) -> Self {
        Self {
            status,
            next_event_number: 0,
            last_event_number: None,
            is_end_of_stream: true,
        }
    }
}

/// Completion of an `$all` read batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllReadCompletion {
    pub status: ReadStatus,
    pub next_position: Position,
}

/// Signal that the store accepted a subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfirmation {
    pub last_commit_position: u64,
    /// Last event number of the stream at subscribe time.
    pub last_event_number: Option<EventNumber>,
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// Credentials were rejected.
    AccessDenied,
    /// Stream was deleted.
    StreamDeleted,
    /// Connection went away.
    ConnectionClosed,
    /// Store-side failure.
    Error(String),
}

/// Request for a stream read in either direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamReadRequest {
    pub stream_id: String,
    pub from: EventNumber,
    pub max_count: u64,
    pub resolve_link_tos: bool,
    pub require_master: bool,
}

/// Request for an `$all` read in either direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllReadRequest {
    pub position: Position,
    pub max_count: u64,
    pub resolve_link_tos: bool,
    pub require_master: bool,
}
