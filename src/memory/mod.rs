//! An in-process event store.
//!
//! [`MemoryStore`] speaks the same [`Connection`](crate::connection::Connection)
//! interface as a network client, for tests and for embedding:
//!
//! - per-stream logs and a global `$all` order
//! - optimistic concurrency on append
//! - link events (`$>`, payload `"<number>@<stream>"`) resolved on request
//! - optional credential checks
//! - live subscriptions fed on append, in append order

mod store;
mod subscriptions;

pub use store::MemoryStore;
