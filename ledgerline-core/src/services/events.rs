//! Mutation events - explicit publish/subscribe for ledger changes
//!
//! The store publishes one event per successful mutation, after commit.
//! Subscribers are plain callbacks; a panicking subscriber is isolated so
//! it can neither abort the mutation (already committed) nor starve the
//! subscribers registered after it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use rust_decimal::Decimal;
use serde::Serialize;

/// What changed in the ledger, and the balance that resulted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    EntriesReplaced {
        entry_count: usize,
        current_balance: Decimal,
    },
    EntryCreated {
        current_balance: Decimal,
    },
    EntryUpdated {
        current_balance: Decimal,
    },
    EntryDeleted {
        current_balance: Decimal,
    },
    StartingBalanceChanged {
        current_balance: Decimal,
    },
}

type Subscriber = Box<dyn Fn(&LedgerEvent) + Send + Sync>;

/// Subscriber registry for ledger mutation events
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every future event
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&LedgerEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Box::new(callback));
    }

    /// Deliver an event to every subscriber, isolating per-subscriber panics
    pub fn publish(&self, event: &LedgerEvent) {
        let subscribers = self.subscribers.lock().unwrap();
        for (index, subscriber) in subscribers.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| subscriber(event)));
            if result.is_err() {
                tracing::warn!(subscriber = index, ?event, "ledger event subscriber panicked");
            }
        }
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            bus.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(&LedgerEvent::EntryCreated {
            current_balance: Decimal::new(100, 2),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_subscriber_does_not_starve_later_ones() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe(|_| panic!("subscriber bug"));
        {
            let hits = Arc::clone(&hits);
            bus.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(&LedgerEvent::EntryDeleted {
            current_balance: Decimal::ZERO,
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1, "later subscriber should still run");
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.subscribe(|_| {});
        assert_eq!(bus.subscriber_count(), 1);
    }
}
