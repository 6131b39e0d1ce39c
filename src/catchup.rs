//! Bounded-range catch-up reads.
//!
//! `read_range_until(stream, from, to)` yields exactly the events numbered
//! `from..=to`, in order, whether they are already stored or still to be
//! appended:
//!
//! 1. one historical read of `to - from + 1` events starting at `from`
//! 2. if that did not reach `to`, a live subscription, forwarded until the
//!    event numbered `to` arrives
//!
//! A deadline guards the whole operation. It fires on its own, from a
//! watchdog thread parked until the deadline or until the read finishes,
//! so an expired read is torn down even while nobody pulls. Whatever
//! finishes it first (reaching `to`, a failure, the deadline, or the
//! consumer closing the sequence) cancels any open subscription, and
//! nothing is delivered after.
//!
//! Known limitation: the store subscribes from "now", not from an event
//! number. Live events are forwarded without checking that the first one
//! is `last_seen + 1`, so an event appended between the end of the
//! historical read and the subscription taking effect is not replayed,
//! and the sequence can skip it.

use crate::config::ReadOptions;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::reads;
use crate::sequence::{self, EventSequence, EventSink, SequenceWriter};
use crate::subscriptions::live;
use crate::subscriptions::SubscriptionToken;
use crate::types::{Credentials, DropReason, EventNumber, RecordedEvent};
use crossbeam_channel::{bounded, select, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// How a catch-up read finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Success,
    Failed,
    TimedOut,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Reading,
    Subscribing,
    Done(Outcome),
}

struct Progress {
    phase: Phase,
    last_seen: Option<EventNumber>,
    token: Option<SubscriptionToken>,
    /// Dropping this wakes the deadline watchdog and lets it exit.
    watchdog: Option<Sender<()>>,
}

struct CatchUp {
    connection: Arc<dyn Connection>,
    credentials: Option<Credentials>,
    stream_id: String,
    from: EventNumber,
    to: EventNumber,
    options: ReadOptions,
    deadline: Instant,
    result: SequenceWriter,
    /// Held across every write to `result`; never across a cancel.
    progress: Mutex<Progress>,
}

/// Start a catch-up read of `stream_id` over `from..=to`.
pub(crate) fn read_range_until(
    connection: Arc<dyn Connection>,
    credentials: Option<Credentials>,
    stream_id: &str,
    from: EventNumber,
    to: EventNumber,
    options: ReadOptions,
) -> Result<EventSequence> {
    if from > to {
        return Err(ClientError::InvalidRange { from, to });
    }

    let (writer, events) = sequence::channel();
    let deadline = Instant::now() + options.timeout;
    let catch_up = Arc::new(CatchUp {
        connection,
        credentials,
        stream_id: stream_id.to_string(),
        from,
        to,
        options,
        deadline,
        result: writer.clone(),
        progress: Mutex::new(Progress {
            phase: Phase::Reading,
            last_seen: None,
            token: None,
            watchdog: None,
        }),
    });

    let closing = Arc::clone(&catch_up);
    writer.on_close(move || closing.finish(Outcome::Closed, None));

    let expiring = Arc::clone(&catch_up);
    let events = events.with_deadline(deadline, move || expiring.expire());

    debug!(
        stream = stream_id,
        from,
        to,
        timeout = ?catch_up.options.timeout,
        "catch-up started"
    );
    catch_up.read_history();
    catch_up.arm_watchdog();
    Ok(events)
}

impl CatchUp {
    /// Expire the read at the deadline unless it finishes first.
    fn arm_watchdog(self: &Arc<Self>) {
        let (stop, stopped) = bounded::<()>(0);
        {
            let mut progress = self.progress.lock();
            if let Phase::Done(_) = progress.phase {
                return;
            }
            progress.watchdog = Some(stop);
        }

        let catch_up = Arc::clone(self);
        let timer = crossbeam_channel::at(self.deadline);
        let spawned = thread::Builder::new()
            .name("eventline-deadline".to_string())
            .spawn(move || {
                select! {
                    recv(timer) -> _ => catch_up.expire(),
                    recv(stopped) -> _ => {}
                }
            });
        if let Err(error) = spawned {
            warn!(stream = %self.stream_id, %error, "deadline watchdog not started");
        }
    }

    fn read_history(self: &Arc<Self>) {
        let options = ReadOptions {
            max_count: (self.to - self.from).saturating_add(1),
            ..self.options.clone()
        };
        reads::read_forward(
            self.connection.as_ref(),
            &self.stream_id,
            self.from,
            &options,
            self.credentials.as_ref(),
            Arc::new(History(Arc::clone(self))),
        );
    }

    fn on_history_event(&self, event: RecordedEvent) -> bool {
        if self.deadline_passed() {
            return false;
        }
        let mut progress = self.progress.lock();
        if progress.phase != Phase::Reading {
            return false;
        }
        progress.last_seen = Some(event.event_number);
        self.result.produce(event)
    }

    fn on_history_end(self: &Arc<Self>) {
        if self.deadline_passed() {
            return;
        }

        let (token, last_seen) = {
            let mut progress = self.progress.lock();
            if progress.phase != Phase::Reading {
                return;
            }
            if progress.last_seen == Some(self.to) {
                progress.phase = Phase::Done(Outcome::Success);
                self.result.end();
                debug!(stream = %self.stream_id, to = self.to, "range covered by history");
                return;
            }

            progress.phase = Phase::Subscribing;
            let token = SubscriptionToken::new(
                Arc::clone(&self.connection),
                self.credentials.clone(),
                &self.stream_id,
            );
            progress.token = Some(token.clone());
            (token, progress.last_seen)
        };

        debug!(
            stream = %self.stream_id,
            ?last_seen,
            to = self.to,
            "history short of range, subscribing"
        );
        live::open(
            &self.connection,
            &self.stream_id,
            &self.options,
            self.credentials.as_ref(),
            Arc::new(Live(Arc::clone(self))),
            &token,
        );
    }

    fn on_live_event(&self, event: RecordedEvent) -> bool {
        if self.deadline_passed() {
            return false;
        }

        let token = {
            let mut progress = self.progress.lock();
            if progress.phase != Phase::Subscribing {
                return false;
            }
            let number = event.event_number;
            if !self.result.produce(event) {
                return false;
            }
            progress.last_seen = Some(number);
            if number != self.to {
                return true;
            }

            progress.phase = Phase::Done(Outcome::Success);
            self.result.end();
            progress.watchdog = None;
            progress.token.take()
        };

        debug!(stream = %self.stream_id, to = self.to, "caught up");
        if let Some(token) = token {
            token.cancel();
        }
        true
    }

    fn on_live_end(&self) {
        if self.release_subscription() == Phase::Subscribing {
            self.fail(ClientError::SubscriptionDropped(DropReason::Unsubscribed));
        }
    }

    fn on_live_dropped(&self, error: ClientError) {
        self.release_subscription();
        self.fail(error);
    }

    /// The store already ended the subscription; forget the token so
    /// finishing does not unsubscribe it again.
    fn release_subscription(&self) -> Phase {
        let mut progress = self.progress.lock();
        progress.token = None;
        progress.phase
    }

    fn fail(&self, error: ClientError) {
        warn!(stream = %self.stream_id, %error, "catch-up failed");
        self.finish(Outcome::Failed, Some(error));
    }

    fn expire(&self) {
        self.finish(Outcome::TimedOut, Some(ClientError::Timeout(self.options.timeout)));
    }

    /// A callback racing the watchdog must not deliver past the deadline.
    fn deadline_passed(&self) -> bool {
        if Instant::now() < self.deadline {
            return false;
        }
        self.expire();
        true
    }

    /// Move to a terminal phase, once. Fails the result if `error` is given
    /// and cancels any open subscription.
    fn finish(&self, outcome: Outcome, error: Option<ClientError>) {
        let (token, watchdog) = {
            let mut progress = self.progress.lock();
            if let Phase::Done(_) = progress.phase {
                return;
            }
            progress.phase = Phase::Done(outcome);
            if let Some(error) = error {
                self.result.fail(error);
            }
            (progress.token.take(), progress.watchdog.take())
        };
        drop(watchdog);

        if outcome == Outcome::TimedOut {
            warn!(stream = %self.stream_id, timeout = ?self.options.timeout, "catch-up timed out");
        } else {
            debug!(stream = %self.stream_id, ?outcome, "catch-up finished");
        }
        if let Some(token) = token {
            token.cancel();
        }
    }
}

/// Sink for the historical phase.
struct History(Arc<CatchUp>);

impl EventSink for History {
    fn produce(&self, event: RecordedEvent) -> bool {
        self.0.on_history_event(event)
    }

    fn end(&self) {
        self.0.on_history_end();
    }

    fn fail(&self, error: ClientError) {
        self.0.fail(error);
    }
}

/// Sink for the live phase.
struct Live(Arc<CatchUp>);

impl EventSink for Live {
    fn produce(&self, event: RecordedEvent) -> bool {
        self.0.on_live_event(event)
    }

    fn end(&self) {
        self.0.on_live_end();
    }

    fn fail(&self, error: ClientError) {
        self.0.on_live_dropped(error);
    }
}
