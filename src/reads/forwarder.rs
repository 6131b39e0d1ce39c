use crate::connection::ReadObserver;
use crate::error::ClientError;
use crate::sequence::EventSink;
use crate::types::{AllReadCompletion, ReadStatus, RecordedEvent, StreamReadCompletion};
use std::sync::Arc;
use tracing::debug;

/// Read completions carry a status.
pub(crate) trait Completion: Send {
    fn status(&self) -> &ReadStatus;
}

impl Completion for StreamReadCompletion {
    fn status(&self) -> &ReadStatus {
        &self.status
    }
}

impl Completion for AllReadCompletion {
    fn status(&self) -> &ReadStatus {
        &self.status
    }
}

/// Republishes one read batch into a sink.
pub(crate) struct ReadForwarder {
    operation: &'static str,
    sink: Arc<dyn EventSink>,
    completed: bool,
}

impl ReadForwarder {
    pub(crate) fn new(operation: &'static str, sink: Arc<dyn EventSink>) -> Self {
        Self {
            operation,
            sink,
            completed: false,
        }
    }
}

impl<C: Completion> ReadObserver<C> for ReadForwarder {
    fn on_event(&mut self, event: RecordedEvent) {
        self.sink.produce(event);
    }

    fn on_complete(mut self: Box<Self>, completion: C) {
        self.completed = true;
        match completion.status() {
            ReadStatus::Success | ReadStatus::NoStream => self.sink.end(),
            status => {
                debug!(operation = self.operation, ?status, "read failed");
                self.sink
                    .fail(ClientError::store(self.operation, status_reason(status)));
            }
        }
    }
}

impl Drop for ReadForwarder {
    fn drop(&mut self) {
        // Connection discarded the request without completing it.
        if !self.completed {
            self.sink.fail(ClientError::ConnectionClosed);
        }
    }
}

fn status_reason(status: &ReadStatus) -> String {
    match status {
        ReadStatus::Success => "success".to_string(),
        ReadStatus::NoStream => "stream not found".to_string(),
        ReadStatus::StreamDeleted => "stream deleted".to_string(),
        ReadStatus::NotModified => "not modified".to_string(),
        ReadStatus::AccessDenied => "access denied".to_string(),
        ReadStatus::Error(message) => message.clone(),
    }
}
