use super::{EventSink, SequenceState};
use crate::error::{ClientError, Result};
use crate::types::RecordedEvent;
use crossbeam_channel::{never, select, unbounded, Receiver, RecvError, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Hook = Box<dyn FnOnce() + Send>;

enum Signal {
    Event(RecordedEvent),
    End,
    Error(ClientError),
}

/// State shared by the producer and consumer halves.
struct Shared {
    state: Mutex<SequenceState>,
    /// Runs when the consumer closes an open sequence. Lock after `state`.
    on_close: Mutex<Option<Hook>>,
}

/// Create a connected writer/sequence pair.
pub fn channel() -> (SequenceWriter, EventSequence) {
    let (sender, receiver) = unbounded();
    let shared = Arc::new(Shared {
        state: Mutex::new(SequenceState::Open),
        on_close: Mutex::new(None),
    });

    let writer = SequenceWriter {
        shared: Arc::clone(&shared),
        sender,
    };
    let sequence = EventSequence {
        shared,
        receiver,
        deadline: None,
        finished: false,
    };
    (writer, sequence)
}

/// Producer half of an [`EventSequence`].
///
/// Cloneable; every clone feeds the same sequence. Once the sequence is
/// terminal, all calls are no-ops.
#[derive(Clone)]
pub struct SequenceWriter {
    shared: Arc<Shared>,
    sender: Sender<Signal>,
}

impl SequenceWriter {
    /// Queue an event. Returns false if the sequence is already terminal.
    pub fn produce(&self, event: RecordedEvent) -> bool {
        let state = self.shared.state.lock();
        if *state != SequenceState::Open {
            return false;
        }
        self.sender.send(Signal::Event(event)).is_ok()
    }

    /// Mark clean completion.
    pub fn end(&self) -> bool {
        self.finish(SequenceState::Ended, Signal::End)
    }

    /// Mark failure.
    pub fn fail(&self, error: ClientError) -> bool {
        self.finish(SequenceState::Errored, Signal::Error(error))
    }

    fn finish(&self, terminal: SequenceState, signal: Signal) -> bool {
        let hook = {
            let mut state = self.shared.state.lock();
            if *state != SequenceState::Open {
                return false;
            }
            *state = terminal;
            let _ = self.sender.send(signal);
            self.shared.on_close.lock().take()
        };
        // Producer finished on its own; nothing left for close to stop.
        drop(hook);
        true
    }

    /// Register what to do when the consumer closes early.
    ///
    /// Runs immediately if the consumer already closed. Replaces any
    /// previously registered hook.
    pub fn on_close(&self, hook: impl FnOnce() + Send + 'static) {
        let state = self.shared.state.lock();
        let current = *state;
        match current {
            SequenceState::Open => {
                *self.shared.on_close.lock() = Some(Box::new(hook));
            }
            SequenceState::Closed => {
                drop(state);
                hook();
            }
            SequenceState::Ended | SequenceState::Errored => {}
        }
    }

    pub fn state(&self) -> SequenceState {
        *self.shared.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SequenceState::Open
    }
}

impl EventSink for SequenceWriter {
    fn produce(&self, event: RecordedEvent) -> bool {
        SequenceWriter::produce(self, event)
    }

    fn end(&self) {
        SequenceWriter::end(self);
    }

    fn fail(&self, error: ClientError) {
        SequenceWriter::fail(self, error);
    }
}

impl fmt::Debug for SequenceWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceWriter")
            .field("state", &self.state())
            .finish()
    }
}

struct Deadline {
    timer: Receiver<Instant>,
    on_expire: Hook,
}

enum Wake {
    Signal(std::result::Result<Signal, RecvError>),
    Expired,
    Idle,
}

/// Consumer half: an ordered, lazily pulled, closable sequence of events.
///
/// Iterating blocks until the next event, the end, or an error. After the
/// end or an error the iterator is exhausted. Dropping the sequence closes
/// it.
pub struct EventSequence {
    shared: Arc<Shared>,
    receiver: Receiver<Signal>,
    deadline: Option<Deadline>,
    finished: bool,
}

impl EventSequence {
    /// Arm a one-shot deadline, observed while the consumer waits.
    pub(crate) fn with_deadline(
        mut self,
        at: Instant,
        on_expire: impl FnOnce() + Send + 'static,
    ) -> Self {
        self.deadline = Some(Deadline {
            timer: crossbeam_channel::at(at),
            on_expire: Box::new(on_expire),
        });
        self
    }

    pub fn state(&self) -> SequenceState {
        *self.shared.state.lock()
    }

    /// True once the end or an error has been delivered, or after `close`.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next buffered item without waiting. `None` if nothing is buffered
    /// or the sequence is finished (see [`is_finished`](Self::is_finished)).
    pub fn try_next(&mut self) -> Option<Result<RecordedEvent>> {
        self.pull(Some(Instant::now()))
    }

    /// Like `next`, but gives up after `timeout`.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Result<RecordedEvent>> {
        self.pull(Some(Instant::now() + timeout))
    }

    /// Stop consuming and tell the producer to release its resources.
    ///
    /// A no-op for the producer if the sequence is already terminal.
    pub fn close(&mut self) {
        let hook = {
            let mut state = self.shared.state.lock();
            if *state == SequenceState::Open {
                *state = SequenceState::Closed;
                self.shared.on_close.lock().take()
            } else {
                None
            }
        };
        self.finished = true;
        self.deadline = None;

        if let Some(hook) = hook {
            hook();
        }
    }

    fn pull(&mut self, until: Option<Instant>) -> Option<Result<RecordedEvent>> {
        loop {
            if self.finished {
                return None;
            }
            match self.wait(until) {
                Wake::Signal(signal) => return self.accept(signal),
                Wake::Expired => self.expire(),
                Wake::Idle => return None,
            }
        }
    }

    fn wait(&self, until: Option<Instant>) -> Wake {
        let idle = never::<Instant>();
        let timer = self.deadline.as_ref().map_or(&idle, |d| &d.timer);

        match until {
            None => select! {
                recv(self.receiver) -> msg => Wake::Signal(msg),
                recv(timer) -> _ => Wake::Expired,
            },
            Some(until) => {
                let remaining = until.saturating_duration_since(Instant::now());
                select! {
                    recv(self.receiver) -> msg => Wake::Signal(msg),
                    recv(timer) -> _ => Wake::Expired,
                    default(remaining) => Wake::Idle,
                }
            }
        }
    }

    /// Fire the deadline. It fails the producer, so the error shows up
    /// after whatever was already buffered.
    fn expire(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            (deadline.on_expire)();
        }
    }

    fn accept(
        &mut self,
        signal: std::result::Result<Signal, RecvError>,
    ) -> Option<Result<RecordedEvent>> {
        match signal {
            Ok(Signal::Event(event)) => Some(Ok(event)),
            Ok(Signal::End) => {
                self.finish();
                None
            }
            Ok(Signal::Error(error)) => {
                self.finish();
                Some(Err(error))
            }
            Err(RecvError) => {
                {
                    let mut state = self.shared.state.lock();
                    if *state == SequenceState::Open {
                        *state = SequenceState::Errored;
                    }
                }
                self.finish();
                Some(Err(ClientError::Abandoned))
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.deadline = None;
    }
}

impl Iterator for EventSequence {
    type Item = Result<RecordedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pull(None)
    }
}

impl FusedIterator for EventSequence {}

impl Drop for EventSequence {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for EventSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSequence")
            .field("state", &self.state())
            .field("finished", &self.finished)
            .field("buffered", &self.receiver.len())
            .finish()
    }
}
