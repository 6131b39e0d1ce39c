//! Client configuration and read option merging.
//!
//! Read options resolve in four layers, later layers winning:
//! system defaults, client-wide defaults, per-stream defaults, and the
//! parameters passed with a single call.

use crate::error::{ClientError, Result};
use crate::types::Credentials;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default catch-up deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default upper bound on events per historical read.
pub const DEFAULT_MAX_COUNT: u64 = 4095;

/// Default time to wait for the connection to become ready.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fully resolved options for one read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadOptions {
    /// Deadline for a catch-up read.
    pub timeout: Duration,
    /// Resolve link events to their targets.
    pub resolve_link_tos: bool,
    /// Require the cluster leader to serve the read.
    pub require_master: bool,
    /// Max events per historical read batch.
    pub max_count: u64,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            resolve_link_tos: false,
            require_master: false,
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

impl ReadOptions {
    /// Overlay `params` on top of these options.
    pub fn merged(&self, params: &ReadParams) -> Self {
        Self {
            timeout: params
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.timeout),
            resolve_link_tos: params.resolve_link_tos.unwrap_or(self.resolve_link_tos),
            require_master: params.require_master.unwrap_or(self.require_master),
            max_count: params.max_count.unwrap_or(self.max_count),
        }
    }

    /// Resolve options for a call on `stream_id`.
    pub fn resolve(config: &ClientConfig, stream_id: &str, params: &ReadParams) -> Result<Self> {
        let mut options = Self::default().merged(&config.defaults);
        if let Some(stream_defaults) = config.streams.get(stream_id) {
            options = options.merged(stream_defaults);
        }
        let options = options.merged(params);
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<()> {
        if self.max_count == 0 {
            return Err(ClientError::Config("max_count must be positive".into()));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Optional overrides for read options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadParams {
    pub timeout_ms: Option<u64>,
    pub resolve_link_tos: Option<bool>,
    pub require_master: Option<bool>,
    pub max_count: Option<u64>,
}

impl ReadParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored in whole milliseconds, rounded up so a sub-millisecond
    /// timeout never becomes zero.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let mut millis = timeout.as_millis();
        if timeout.subsec_nanos() % 1_000_000 != 0 {
            millis += 1;
        }
        self.timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn resolve_link_tos(mut self, resolve: bool) -> Self {
        self.resolve_link_tos = Some(resolve);
        self
    }

    pub fn require_master(mut self, require: bool) -> Self {
        self.require_master = Some(require);
        self
    }

    pub fn max_count(mut self, max_count: u64) -> Self {
        self.max_count = Some(max_count);
        self
    }
}

/// Where and how to connect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    /// Sent with every operation.
    pub credentials: Option<Credentials>,
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1113,
            credentials: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Complete client configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connection: ConnectionSettings,
    /// Client-wide read defaults.
    pub defaults: ReadParams,
    /// Per-stream read defaults, keyed by stream id.
    pub streams: HashMap<String, ReadParams>,
}

impl ClientConfig {
    /// Parse from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)?;
        ReadOptions::default().merged(&config.defaults).validate()?;
        Ok(config)
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.connection.credentials = Some(credentials);
        self
    }

    pub fn with_defaults(mut self, defaults: ReadParams) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_stream_defaults(
        mut self,
        stream_id: impl Into<String>,
        params: ReadParams,
    ) -> Self {
        self.streams.insert(stream_id.into(), params);
        self
    }
}
