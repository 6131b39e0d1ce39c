//! Live subscriptions to a stream.
//!
//! A subscription starts from "now": the store pushes every event appended
//! after the subscribe call, in append order, until the subscription is
//! cancelled or dropped by the store.
//!
//! # Example
//!
//! ```ignore
//! let mut subscription = client.subscribe_to_stream("orders-1", &ReadParams::new())?;
//! subscription.wait_confirmed(Duration::from_secs(1))?;
//!
//! for event in &mut subscription {
//!     let event = event?;
//!     if event.event_type == "OrderShipped" {
//!         break;
//!     }
//! }
//! subscription.close();
//! ```

pub(crate) mod live;
mod token;

pub use live::LiveSubscription;
pub use token::SubscriptionToken;
