//! Listener registry and event dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::error;

use crate::event::{EventFilter, MassEvent};

/// Callback invoked for every matching event.
pub type EventCallback = Arc<dyn Fn(&MassEvent) + Send + Sync>;

struct Listener {
    id: u64,
    filter: EventFilter,
    callback: EventCallback,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Listener>>,
}

impl Registry {
    fn contains(&self, id: u64) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|listener| listener.id == id)
    }

    fn remove(&self, ids: &[u64]) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|listener| !ids.contains(&listener.id));
    }
}

/// Routes events to registered listeners.
///
/// Listeners run in registration order, synchronously, on the connection task
/// that received the event. The registry lock is released before any callback
/// runs, so callbacks may subscribe or unsubscribe freely. A listener removed
/// mid-dispatch is not called for the rest of that dispatch; one added
/// mid-dispatch first sees the next event.
#[derive(Clone, Default)]
pub struct EventRouter {
    registry: Arc<Registry>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for events passing `filter`.
    ///
    /// Every call creates an independent registration, even for an identical
    /// filter and callback; each must be unsubscribed through its own handle.
    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, callback: F) -> Subscription
    where
        F: Fn(&MassEvent) + Send + Sync + 'static,
    {
        self.register([filter.into()], Arc::new(callback))
    }

    /// Registers one callback for several filters; the returned handle removes
    /// all of them at once.
    ///
    /// Each filter is its own registration, so an event passing two of the
    /// filters (e.g. [`EventFilter::All`] and a specific type) reaches the
    /// callback twice.
    pub fn subscribe_many<I, F>(&self, filters: I, callback: F) -> Subscription
    where
        I: IntoIterator,
        I::Item: Into<EventFilter>,
        F: Fn(&MassEvent) + Send + Sync + 'static,
    {
        self.register(filters.into_iter().map(Into::into), Arc::new(callback))
    }

    fn register(
        &self,
        filters: impl IntoIterator<Item = EventFilter>,
        callback: EventCallback,
    ) -> Subscription {
        let mut listeners = self
            .registry
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let ids = filters
            .into_iter()
            .map(|filter| {
                let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
                listeners.push(Listener {
                    id,
                    filter,
                    callback: Arc::clone(&callback),
                });
                id
            })
            .collect();
        Subscription {
            registry: Arc::downgrade(&self.registry),
            ids,
        }
    }

    /// Invokes every listener whose filter matches `event`.
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still run.
    pub fn dispatch(&self, event: &MassEvent) {
        let event_type = event.event_type();
        let matching: Vec<(u64, EventCallback)> = self
            .registry
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|listener| listener.filter.matches(&event_type))
            .map(|listener| (listener.id, Arc::clone(&listener.callback)))
            .collect();

        for (id, callback) in matching {
            // An earlier callback may have unsubscribed this one.
            if !self.registry.contains(id) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(event = %event_type, "event listener panicked");
            }
        }
    }

    /// Number of live registrations.
    pub fn listener_count(&self) -> usize {
        self.registry
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle returned by [`EventRouter::subscribe`].
///
/// Dropping the handle does **not** remove the listener.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<Registry>,
    ids: Vec<u64>,
}

impl Subscription {
    /// Removes the registration(s) this handle was created for.
    ///
    /// Calling it again, or after the router is gone, is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.ids);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::{EventMessage, EventType};
    use std::sync::Mutex as StdMutex;

    fn event(event: EventType) -> MassEvent {
        MassEvent::Other(EventMessage {
            event,
            object_id: None,
            data: serde_json::Value::Null,
        })
    }

    fn recorder() -> (Arc<StdMutex<Vec<String>>>, impl Fn(&str) -> EventCallback) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |name: &str| -> EventCallback {
            let log = Arc::clone(&log_clone);
            let name = name.to_string();
            Arc::new(move |e: &MassEvent| {
                log.lock().unwrap().push(format!("{name}:{}", e.event_type()));
            })
        };
        (log, make)
    }

    #[test]
    fn dispatches_in_registration_order_with_wildcard() {
        let router = EventRouter::new();
        let (log, make) = recorder();
        let a = make("a");
        let b = make("b");
        let c = make("c");
        router.subscribe(EventType::QueueAdded, move |e| a(e));
        router.subscribe(EventFilter::All, move |e| b(e));
        router.subscribe(EventType::PlayerAdded, move |e| c(e));

        router.dispatch(&event(EventType::QueueAdded));
        router.dispatch(&event(EventType::PlayerAdded));

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:queue_added",
                "b:queue_added",
                "b:player_added",
                "c:player_added"
            ]
        );
    }

    #[test]
    fn identical_registrations_are_independent() {
        let router = EventRouter::new();
        let (log, make) = recorder();
        let cb = make("x");
        let cb2 = Arc::clone(&cb);
        let first = router.subscribe(EventFilter::All, move |e| cb(e));
        let _second = router.subscribe(EventFilter::All, move |e| cb2(e));

        first.unsubscribe();
        router.dispatch(&event(EventType::Shutdown));
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(router.listener_count(), 1);
    }

    #[test]
    fn unsubscribe_twice_is_noop() {
        let router = EventRouter::new();
        let handle = router.subscribe(EventFilter::All, |_| {});
        let other = router.subscribe(EventFilter::All, |_| {});
        handle.unsubscribe();
        handle.unsubscribe();
        assert_eq!(router.listener_count(), 1);
        other.unsubscribe();
        assert_eq!(router.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_after_router_dropped_is_noop() {
        let router = EventRouter::new();
        let handle = router.subscribe(EventFilter::All, |_| {});
        drop(router);
        handle.unsubscribe();
    }

    #[test]
    fn subscribe_many_removes_all_registrations() {
        let router = EventRouter::new();
        let (log, make) = recorder();
        let cb = make("m");
        let handle = router.subscribe_many(
            [EventType::PlayerAdded, EventType::PlayerUpdated],
            move |e| cb(e),
        );
        assert_eq!(router.listener_count(), 2);

        router.dispatch(&event(EventType::PlayerUpdated));
        router.dispatch(&event(EventType::QueueUpdated));
        assert_eq!(*log.lock().unwrap(), vec!["m:player_updated"]);

        handle.unsubscribe();
        assert_eq!(router.listener_count(), 0);
    }

    #[test]
    fn panicking_listener_does_not_stop_dispatch() {
        let router = EventRouter::new();
        let (log, make) = recorder();
        let after = make("after");
        router.subscribe(EventFilter::All, |_| panic!("listener failure"));
        router.subscribe(EventFilter::All, move |e| after(e));

        router.dispatch(&event(EventType::Shutdown));
        assert_eq!(*log.lock().unwrap(), vec!["after:application_shutdown"]);
    }

    #[test]
    fn listener_can_unsubscribe_itself_during_dispatch() {
        let router = EventRouter::new();
        let slot: Arc<StdMutex<Option<Subscription>>> = Arc::new(StdMutex::new(None));
        let hits = Arc::new(AtomicU64::new(0));

        let slot_clone = Arc::clone(&slot);
        let hits_clone = Arc::clone(&hits);
        let handle = router.subscribe(EventFilter::All, move |_| {
            hits_clone.fetch_add(1, Ordering::Relaxed);
            if let Some(handle) = slot_clone.lock().unwrap().as_ref() {
                handle.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(handle);

        router.dispatch(&event(EventType::Shutdown));
        router.dispatch(&event(EventType::Shutdown));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn listener_removed_by_an_earlier_one_is_skipped() {
        let router = EventRouter::new();
        let (log, make) = recorder();
        let slot: Arc<StdMutex<Option<Subscription>>> = Arc::new(StdMutex::new(None));

        let slot_clone = Arc::clone(&slot);
        let first = make("first");
        router.subscribe(EventFilter::All, move |e| {
            first(e);
            if let Some(handle) = slot_clone.lock().unwrap().as_ref() {
                handle.unsubscribe();
            }
        });
        let second = make("second");
        let handle = router.subscribe(EventFilter::All, move |e| second(e));
        *slot.lock().unwrap() = Some(handle);

        router.dispatch(&event(EventType::Shutdown));
        assert_eq!(*log.lock().unwrap(), vec!["first:application_shutdown"]);
        assert_eq!(router.listener_count(), 1);
    }
}
