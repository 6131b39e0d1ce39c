use crate::error::ClientError;
use crate::types::RecordedEvent;

/// Producer side of an event sequence.
///
/// Readers publish into a sink rather than owning a sequence, so the
/// catch-up reader can interpose on their output.
pub trait EventSink: Send + Sync {
    /// Queue an event. Returns false once the sink no longer accepts events.
    fn produce(&self, event: RecordedEvent) -> bool;

    /// Signal clean completion.
    fn end(&self);

    /// Signal failure.
    fn fail(&self, error: ClientError);
}
