//! Write responses as a waitable promise.

use crate::connection::WriteResponder;
use crate::error::{ClientError, Result};
use crate::types::WriteResult;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::warn;

/// The eventual outcome of one `write_events` call.
///
/// Resolves to the store's response when its result code is `Success`, and
/// to [`ClientError::WriteConflict`] carrying the full response otherwise.
#[derive(Debug)]
pub struct PendingWrite {
    stream_id: String,
    receiver: Receiver<WriteResult>,
}

impl PendingWrite {
    pub(crate) fn new(stream_id: &str) -> (WriteResponder, Self) {
        let (sender, receiver) = bounded(1);
        let responder: WriteResponder = Box::new(move |result| {
            let _ = sender.send(result);
        });
        let pending = Self {
            stream_id: stream_id.to_string(),
            receiver,
        };
        (responder, pending)
    }

    /// Block until the store responds.
    pub fn wait(self) -> Result<WriteResult> {
        match self.receiver.recv() {
            Ok(response) => self.settle(response),
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }

    /// Block until the store responds or `timeout` passes. A timed-out
    /// write may still be waited on again.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<WriteResult> {
        match self.receiver.recv_timeout(timeout) {
            Ok(response) => self.settle(response),
            Err(RecvTimeoutError::Timeout) => Err(ClientError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ClientError::ConnectionClosed),
        }
    }

    fn settle(&self, response: WriteResult) -> Result<WriteResult> {
        if response.is_success() {
            return Ok(response);
        }
        warn!(
            stream = %self.stream_id,
            result = ?response.result,
            message = %response.message,
            "write rejected"
        );
        Err(ClientError::WriteConflict(Box::new(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationResult;

    fn response(result: OperationResult) -> WriteResult {
        WriteResult {
            result,
            message: String::new(),
            first_event_number: None,
            last_event_number: None,
        }
    }

    #[test]
    fn test_success_resolves() {
        let (responder, pending) = PendingWrite::new("orders-1");
        responder(response(OperationResult::Success));
        assert!(pending.wait().is_ok());
    }

    #[test]
    fn test_any_other_code_rejects_with_response() {
        let (responder, pending) = PendingWrite::new("orders-1");
        responder(response(OperationResult::CommitTimeout));
        match pending.wait() {
            Err(ClientError::WriteConflict(r)) => {
                assert_eq!(r.result, OperationResult::CommitTimeout)
            }
            other => panic!("Expected WriteConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_dropped_responder_is_connection_closed() {
        let (responder, pending) = PendingWrite::new("orders-1");
        drop(responder);
        assert!(matches!(pending.wait(), Err(ClientError::ConnectionClosed)));
    }

    #[test]
    fn test_wait_timeout_then_wait_again() {
        let (responder, pending) = PendingWrite::new("orders-1");
        assert!(matches!(
            pending.wait_timeout(Duration::from_millis(5)),
            Err(ClientError::Timeout(_))
        ));
        responder(response(OperationResult::Success));
        assert!(pending.wait_timeout(Duration::from_millis(5)).is_ok());
    }
}
