//! In-process [`EventBus`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::core::{Event, EventBus, EventListener, ListenerId};

/// Delivers events synchronously to every registered listener.
#[derive(Default)]
pub struct LocalEventBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn EventListener>)>>,
}

impl LocalEventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every listener on the calling thread.
    ///
    /// Listeners are called outside the bus lock, so a listener may add or
    /// remove listeners.
    pub fn broadcast(&self, event: &Event) {
        let listeners: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener.event_occurred(event);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl EventBus for LocalEventBus {
    fn add_listener(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.write().retain(|(lid, _)| *lid != id);
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::core::ContactId;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl EventListener for Recorder {
        fn event_occurred(&self, event: &Event) {
            self.events.lock().push(event.clone());
        }
    }

    #[test]
    fn test_broadcast_reaches_listeners() {
        let bus = LocalEventBus::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        bus.add_listener(a.clone());
        bus.add_listener(b.clone());

        let event = Event::ContactRemoved {
            contact_id: ContactId(4),
        };
        bus.broadcast(&event);

        assert_eq!(*a.events.lock(), vec![event.clone()]);
        assert_eq!(*b.events.lock(), vec![event]);
    }

    #[test]
    fn test_removed_listener_not_called() {
        let bus = LocalEventBus::new();
        let a = Arc::new(Recorder::default());
        let id = bus.add_listener(a.clone());
        bus.remove_listener(id);

        bus.broadcast(&Event::ContactRemoved {
            contact_id: ContactId(1),
        });
        assert!(a.events.lock().is_empty());
        assert_eq!(bus.listener_count(), 0);
    }
}
