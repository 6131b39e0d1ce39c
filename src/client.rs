//! Main Client struct tying all components together.

use crate::catchup;
use crate::config::{ClientConfig, ReadOptions, ReadParams};
use crate::connection::{Connection, Connector, Readiness};
use crate::error::{ClientError, Result};
use crate::reads;
use crate::sequence::{self, EventSequence};
use crate::subscriptions::LiveSubscription;
use crate::types::{Credentials, EventData, EventNumber, ExpectedVersion, Position};
use crate::write::PendingWrite;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key under which `$all` reads look up per-stream defaults.
const ALL_STREAM: &str = "$all";

/// Facade over one shared store connection.
///
/// Provides a unified interface for:
/// - Single-batch historical reads (stream forward/backward, `$all`)
/// - Catch-up reads over a bounded event-number range
/// - Live subscriptions
/// - Writes with optimistic concurrency
///
/// Every operation carries the configured credentials. Clones share the
/// connection; independent clients can hold independent connections.
#[derive(Clone)]
pub struct Client {
    connection: Arc<dyn Connection>,
    config: ClientConfig,
}

impl Client {
    /// Open a connection and wait until it is ready.
    pub fn connect<C: Connector + ?Sized>(connector: &C, config: ClientConfig) -> Result<Self> {
        let (readiness, ready) = Readiness::new();
        let connection = connector.open(&config.connection, readiness);
        let timeout = config.connection.connect_timeout();

        let reason = match ready.recv_timeout(timeout) {
            Ok(Ok(())) => {
                debug!(
                    host = %config.connection.host,
                    port = config.connection.port,
                    "connected"
                );
                return Ok(Self::from_connection(connection, config));
            }
            Ok(Err(reason)) => reason,
            Err(_) => format!("not ready after {:?}", timeout),
        };

        warn!(host = %config.connection.host, %reason, "connect failed");
        connection.close();
        Err(ClientError::Connection(reason))
    }

    /// Wrap a connection that is already usable.
    pub fn from_connection(connection: Arc<dyn Connection>, config: ClientConfig) -> Self {
        Self { connection, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn credentials(&self) -> Option<&Credentials> {
        self.config.connection.credentials.as_ref()
    }

    fn options(&self, stream_id: &str, params: &ReadParams) -> Result<ReadOptions> {
        ReadOptions::resolve(&self.config, stream_id, params)
    }

    // --- Reads ---

    /// Read one batch of `stream_id` forward from `from`.
    pub fn read_stream_events_forward(
        &self,
        stream_id: &str,
        from: EventNumber,
        params: &ReadParams,
    ) -> Result<EventSequence> {
        let options = self.options(stream_id, params)?;
        let (writer, events) = sequence::channel();
        reads::read_forward(
            self.connection.as_ref(),
            stream_id,
            from,
            &options,
            self.credentials(),
            Arc::new(writer),
        );
        Ok(events)
    }

    /// Read one batch of `stream_id` backward from `from`.
    pub fn read_stream_events_backward(
        &self,
        stream_id: &str,
        from: EventNumber,
        params: &ReadParams,
    ) -> Result<EventSequence> {
        let options = self.options(stream_id, params)?;
        let (writer, events) = sequence::channel();
        reads::read_backward(
            self.connection.as_ref(),
            stream_id,
            from,
            &options,
            self.credentials(),
            Arc::new(writer),
        );
        Ok(events)
    }

    /// Read one batch of `$all` forward from `position`.
    pub fn read_all_events_forward(
        &self,
        position: Position,
        params: &ReadParams,
    ) -> Result<EventSequence> {
        let options = self.options(ALL_STREAM, params)?;
        let (writer, events) = sequence::channel();
        reads::read_all_forward(
            self.connection.as_ref(),
            position,
            &options,
            self.credentials(),
            Arc::new(writer),
        );
        Ok(events)
    }

    /// Read one batch of `$all` backward from `position`.
    pub fn read_all_events_backward(
        &self,
        position: Position,
        params: &ReadParams,
    ) -> Result<EventSequence> {
        let options = self.options(ALL_STREAM, params)?;
        let (writer, events) = sequence::channel();
        reads::read_all_backward(
            self.connection.as_ref(),
            position,
            &options,
            self.credentials(),
            Arc::new(writer),
        );
        Ok(events)
    }

    /// Events `from..=to` of `stream_id`, waiting for the ones not yet
    /// written, within `timeout`.
    ///
    /// ```ignore
    /// // Fold events 0..=100 into a state.
    /// let state = client
    ///     .read_range_until("orders-1", 0, 100, &ReadParams::new())?
    ///     .try_fold(State::default(), |state, event| Ok::<_, ClientError>(state.apply(&event?)))?;
    /// ```
    pub fn read_range_until(
        &self,
        stream_id: &str,
        from: EventNumber,
        to: EventNumber,
        params: &ReadParams,
    ) -> Result<EventSequence> {
        let options = self.options(stream_id, params)?;
        catchup::read_range_until(
            Arc::clone(&self.connection),
            self.credentials().cloned(),
            stream_id,
            from,
            to,
            options,
        )
    }

    // --- Subscriptions ---

    /// Subscribe to events appended to `stream_id` from now on.
    pub fn subscribe_to_stream(
        &self,
        stream_id: &str,
        params: &ReadParams,
    ) -> Result<LiveSubscription> {
        let options = self.options(stream_id, params)?;
        Ok(LiveSubscription::open(
            &self.connection,
            stream_id,
            &options,
            self.credentials(),
        ))
    }

    // --- Writes ---

    /// Append `events` to `stream_id`.
    pub fn write_events(
        &self,
        stream_id: &str,
        expected_version: ExpectedVersion,
        require_master: bool,
        events: Vec<EventData>,
    ) -> PendingWrite {
        let (responder, pending) = PendingWrite::new(stream_id);
        self.connection.write_events(
            stream_id,
            expected_version,
            require_master,
            events,
            self.credentials(),
            responder,
        );
        pending
    }

    // --- Lifecycle ---

    /// Close the shared connection. Affects every clone of this client.
    pub fn close(&self) {
        debug!("closing connection");
        self.connection.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.config.connection.host)
            .field("port", &self.config.connection.port)
            .finish()
    }
}
