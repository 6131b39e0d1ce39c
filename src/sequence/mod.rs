//! Push-to-pull adapter for store callbacks.
//!
//! Store primitives push events through callbacks at their own pace. An
//! [`EventSequence`] buffers those pushes and hands them to a single
//! consumer in order, at the consumer's pace:
//!
//! - the producer side ([`SequenceWriter`], or anything implementing
//!   [`EventSink`]) calls `produce`, then exactly one of `end` or `fail`
//! - the consumer iterates, and may `close` early to tell the producer to
//!   stop (cancel a subscription, disarm a deadline)
//!
//! # Example
//!
//! ```ignore
//! let (writer, events) = sequence::channel();
//! writer.produce(event);
//! writer.end();
//!
//! for event in events {
//!     println!("{:?}", event?);
//! }
//! ```

mod channel;
mod sink;

pub use channel::{channel, EventSequence, SequenceWriter};
pub use sink::EventSink;

/// Lifecycle of a sequence. Everything but `Open` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceState {
    /// Still producing.
    Open,
    /// Producer signalled clean completion.
    Ended,
    /// Producer signalled failure.
    Errored,
    /// Consumer closed the sequence early.
    Closed,
}

impl SequenceState {
    pub fn is_terminal(self) -> bool {
        self != SequenceState::Open
    }
}
