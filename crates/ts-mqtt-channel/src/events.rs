//! Synchronous listener registry keyed by event name.
//!
//! Each component owns its own [`EventBus`]; there is no global registry.
//! Listeners are append-only per event kind and run on the caller's task,
//! in registration order, when [`EventBus::emit`] is called. A panicking
//! listener is not caught.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// An event that can be dispatched through an [`EventBus`].
pub trait Event {
    /// Name key listeners register against.
    type Kind: Copy + Eq + Hash + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

type Listener<E> = Box<dyn FnMut(&E) + Send>;

pub struct EventBus<E: Event> {
    listeners: HashMap<E::Kind, Vec<Listener<E>>>,
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    /// Register `handler` for `kind`. Handlers are never removed.
    pub fn on<F>(&mut self, kind: E::Kind, handler: F)
    where
        F: FnMut(&E) + Send + 'static,
    {
        self.listeners.entry(kind).or_default().push(Box::new(handler));
    }

    /// Invoke every handler registered for `event.kind()`, in order.
    ///
    /// Returns how many handlers ran.
    pub fn emit(&mut self, event: &E) -> usize {
        let Some(handlers) = self.listeners.get_mut(&event.kind()) else {
            return 0;
        };
        for handler in handlers.iter_mut() {
            handler(event);
        }
        handlers.len()
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, handlers) in &self.listeners {
            map.entry(kind, &handlers.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Ping,
        Pong,
    }

    #[derive(Debug)]
    enum Sample {
        Ping(u32),
        Pong,
    }

    impl Event for Sample {
        type Kind = Kind;

        fn kind(&self) -> Kind {
            match self {
                Self::Ping(_) => Kind::Ping,
                Self::Pong => Kind::Pong,
            }
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        let log = calls.clone();
        bus.on(Kind::Ping, move |_: &Sample| log.lock().unwrap().push("h1"));
        let log = calls.clone();
        bus.on(Kind::Ping, move |_: &Sample| log.lock().unwrap().push("h2"));

        assert_eq!(bus.emit(&Sample::Ping(1)), 2);
        assert_eq!(*calls.lock().unwrap(), vec!["h1", "h2"]);
    }

    #[test]
    fn handlers_receive_event_arguments() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        let log = seen.clone();
        bus.on(Kind::Ping, move |e: &Sample| {
            if let Sample::Ping(n) = e {
                log.lock().unwrap().push(*n);
            }
        });

        bus.emit(&Sample::Ping(7));
        bus.emit(&Sample::Ping(9));
        assert_eq!(*seen.lock().unwrap(), vec![7, 9]);
    }

    #[test]
    fn emit_without_listeners_is_noop() {
        let mut bus: EventBus<Sample> = EventBus::new();
        assert_eq!(bus.emit(&Sample::Pong), 0);
        assert_eq!(bus.listener_count(Kind::Pong), 0);
    }

    #[test]
    fn listeners_are_scoped_to_their_kind() {
        let count = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();

        let c = count.clone();
        bus.on(Kind::Pong, move |_: &Sample| *c.lock().unwrap() += 1);

        bus.emit(&Sample::Ping(1));
        assert_eq!(*count.lock().unwrap(), 0);
        bus.emit(&Sample::Pong);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(bus.listener_count(Kind::Pong), 1);
    }
}
