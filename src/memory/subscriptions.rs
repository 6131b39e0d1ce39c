//! Subscription registry and in-order delivery for the in-memory store.

use crate::connection::SubscriptionObserver;
use crate::types::{CorrelationId, DropReason, RecordedEvent, SubscriptionConfirmation};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Internal subscription state.
pub(super) struct Subscription {
    pub(super) stream_id: String,
    pub(super) resolve_link_tos: bool,
    observer: Arc<dyn SubscriptionObserver>,
}

enum Delivery {
    Confirmed(CorrelationId, SubscriptionConfirmation),
    Event(CorrelationId, RecordedEvent),
    Dropped(Arc<dyn SubscriptionObserver>, DropReason),
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<Delivery>,
    /// Some thread is draining the queue.
    draining: bool,
}

/// Tracks live subscriptions and delivers to them in enqueue order.
///
/// Callbacks never run under a registry lock, so observers may subscribe,
/// unsubscribe, or append from inside a callback; anything they trigger is
/// queued behind the delivery in progress.
#[derive(Default)]
pub(super) struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<CorrelationId, Subscription>>,
    outbox: Mutex<Outbox>,
}

impl SubscriptionRegistry {
    pub(super) fn register(
        &self,
        id: CorrelationId,
        stream_id: &str,
        resolve_link_tos: bool,
        observer: Arc<dyn SubscriptionObserver>,
        confirmation: SubscriptionConfirmation,
    ) {
        self.subscriptions.write().insert(
            id,
            Subscription {
                stream_id: stream_id.to_string(),
                resolve_link_tos,
                observer,
            },
        );
        self.enqueue(Delivery::Confirmed(id, confirmation));
    }

    /// Remove a subscription and tell its observer. False if unknown.
    pub(super) fn remove(&self, id: CorrelationId, reason: DropReason) -> bool {
        match self.subscriptions.write().remove(&id) {
            Some(sub) => {
                self.enqueue(Delivery::Dropped(sub.observer, reason));
                true
            }
            None => false,
        }
    }

    /// Remove every subscription, telling each observer why.
    pub(super) fn remove_all(&self, reason: DropReason) -> usize {
        let drained: Vec<Subscription> =
            self.subscriptions.write().drain().map(|(_, s)| s).collect();
        let count = drained.len();
        for sub in drained {
            self.enqueue(Delivery::Dropped(sub.observer, reason.clone()));
        }
        count
    }

    /// Queue `event` for every subscriber of its stream. `resolve` maps the
    /// stored event to what a link-resolving subscriber should see.
    pub(super) fn publish<F>(&self, event: &RecordedEvent, resolve: F)
    where
        F: Fn(&RecordedEvent) -> RecordedEvent,
    {
        let subs = self.subscriptions.read();
        for (id, sub) in subs.iter() {
            if sub.stream_id != event.stream_id {
                continue;
            }
            let delivered = if sub.resolve_link_tos {
                resolve(event)
            } else {
                event.clone()
            };
            self.enqueue(Delivery::Event(*id, delivered));
        }
    }

    pub(super) fn count(&self) -> usize {
        self.subscriptions.read().len()
    }

    fn enqueue(&self, delivery: Delivery) {
        self.outbox.lock().queue.push_back(delivery);
    }

    /// Deliver queued callbacks on this thread, unless another thread (or an
    /// outer frame of this one) already is.
    pub(super) fn flush(&self) {
        {
            let mut outbox = self.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let next = {
                let mut outbox = self.outbox.lock();
                match outbox.queue.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            self.deliver(next);
        }
    }

    fn deliver(&self, delivery: Delivery) {
        match delivery {
            Delivery::Confirmed(id, confirmation) => {
                if let Some(observer) = self.observer(id) {
                    observer.on_confirmed(confirmation);
                }
            }
            Delivery::Event(id, event) => {
                // Skip subscriptions cancelled after the event was queued.
                if let Some(observer) = self.observer(id) {
                    observer.on_event(event);
                }
            }
            Delivery::Dropped(observer, reason) => observer.on_dropped(reason),
        }
    }

    fn observer(&self, id: CorrelationId) -> Option<Arc<dyn SubscriptionObserver>> {
        self.subscriptions
            .read()
            .get(&id)
            .map(|sub| Arc::clone(&sub.observer))
    }
}
