//! Single-batch historical reads.
//!
//! Each read issues exactly one request to the store and republishes the
//! returned batch, in the order the store returned it, into an
//! [`EventSink`](crate::sequence::EventSink). There is no pagination: a
//! caller that needs more than `max_count` events asks for a larger batch or
//! chains reads itself.

mod forwarder;

use crate::config::ReadOptions;
use crate::connection::Connection;
use crate::sequence::EventSink;
use crate::types::{AllReadRequest, Credentials, EventNumber, Position, StreamReadRequest};
use forwarder::ReadForwarder;
use std::sync::Arc;
use tracing::trace;

fn stream_request(stream_id: &str, from: EventNumber, options: &ReadOptions) -> StreamReadRequest {
    StreamReadRequest {
        stream_id: stream_id.to_string(),
        from,
        max_count: options.max_count,
        resolve_link_tos: options.resolve_link_tos,
        require_master: options.require_master,
    }
}

fn all_request(position: Position, options: &ReadOptions) -> AllReadRequest {
    AllReadRequest {
        position,
        max_count: options.max_count,
        resolve_link_tos: options.resolve_link_tos,
        require_master: options.require_master,
    }
}

/// Read up to `options.max_count` events of `stream_id`, ascending from `from`.
pub(crate) fn read_forward(
    connection: &dyn Connection,
    stream_id: &str,
    from: EventNumber,
    options: &ReadOptions,
    credentials: Option<&Credentials>,
    sink: Arc<dyn EventSink>,
) {
    trace!(stream = stream_id, from, max_count = options.max_count, "read forward");
    connection.read_stream_events_forward(
        stream_request(stream_id, from, options),
        credentials,
        Box::new(ReadForwarder::new("read stream forward", sink)),
    );
}

/// Read up to `options.max_count` events of `stream_id`, descending from
/// `from` ([`STREAM_END`](crate::types::STREAM_END) for the newest).
pub(crate) fn read_backward(
    connection: &dyn Connection,
    stream_id: &str,
    from: EventNumber,
    options: &ReadOptions,
    credentials: Option<&Credentials>,
    sink: Arc<dyn EventSink>,
) {
    trace!(stream = stream_id, from, max_count = options.max_count, "read backward");
    connection.read_stream_events_backward(
        stream_request(stream_id, from, options),
        credentials,
        Box::new(ReadForwarder::new("read stream backward", sink)),
    );
}

pub(crate) fn read_all_forward(
    connection: &dyn Connection,
    position: Position,
    options: &ReadOptions,
    credentials: Option<&Credentials>,
    sink: Arc<dyn EventSink>,
) {
    trace!(?position, max_count = options.max_count, "read $all forward");
    connection.read_all_events_forward(
        all_request(position, options),
        credentials,
        Box::new(ReadForwarder::new("read all forward", sink)),
    );
}

pub(crate) fn read_all_backward(
    connection: &dyn Connection,
    position: Position,
    options: &ReadOptions,
    credentials: Option<&Credentials>,
    sink: Arc<dyn EventSink>,
) {
    trace!(?position, max_count = options.max_count, "read $all backward");
    connection.read_all_events_backward(
        all_request(position, options),
        credentials,
        Box::new(ReadForwarder::new("read all backward", sink)),
    );
}
