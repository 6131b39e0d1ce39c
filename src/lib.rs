//! # Eventline
//!
//! Client-side orchestration over an event store connection: historical
//! reads and live subscriptions, consumed as ordered pull sequences.
//!
//! ## Core Concepts
//!
//! - **Sequences**: Callback pushes buffered into an iterator the caller pulls
//! - **Reads**: One historical batch of a stream or of `$all`
//! - **Subscriptions**: Events appended from now on, until cancelled
//! - **Catch-up**: A bounded range read that waits for events not yet written
//!
//! ## Example
//!
//! ```ignore
//! use eventline::{Client, ClientConfig, EventData, ExpectedVersion, MemoryStore, ReadParams};
//!
//! let store = MemoryStore::new();
//! let client = Client::connect(&store, ClientConfig::default())?;
//!
//! // Write two events
//! client
//!     .write_events("orders-1", ExpectedVersion::NoStream, false, vec![
//!         EventData::json("OrderPlaced", &json!({ "total": 12 }))?,
//!         EventData::json("OrderPaid", &json!({}))?,
//!     ])
//!     .wait()?;
//!
//! // Events 0..=3, waiting up to the timeout for 2 and 3 to be written
//! for event in client.read_range_until("orders-1", 0, 3, &ReadParams::new())? {
//!     println!("{}", event?.event_type);
//! }
//! ```

mod catchup;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
mod reads;
pub mod sequence;
pub mod subscriptions;
pub mod types;
pub mod write;

// Re-exports
pub use client::Client;
pub use config::{ClientConfig, ConnectionSettings, ReadOptions, ReadParams};
pub use connection::{Connection, Connector, Readiness, ReadObserver, SubscriptionObserver};
pub use error::{ClientError, Result};
pub use memory::MemoryStore;
pub use sequence::{EventSequence, EventSink, SequenceState, SequenceWriter};
pub use subscriptions::{LiveSubscription, SubscriptionToken};
pub use types::*;
pub use write::PendingWrite;
