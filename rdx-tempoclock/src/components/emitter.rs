//! A small observer registry for lifecycle events.

use crate::common::ListenerId;
use slotmap::SlotMap;
use std::fmt;

/// An event that can be routed to listeners by kind.
pub trait EventKind {
    type Kind: Copy + Eq + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

/// A listener callback.
pub type Handler<E> = Box<dyn FnMut(&E) + Send>;

#[doc(hidden)]
struct Listener<E: EventKind> {
    /// `None` listens to every kind.
    kind: Option<E::Kind>,
    once: bool,
    handler: Handler<E>,
}

/// Dispatches events to the listeners registered for their kind.
///
/// Listeners run synchronously, in registration order, on the thread that
/// calls [`emit`](Emitter::emit).
pub struct Emitter<E: EventKind> {
    listeners: SlotMap<ListenerId, Listener<E>>,
}

impl<E: EventKind> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EventKind> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E: EventKind> Emitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: SlotMap::with_key(),
        }
    }

    fn register(&mut self, kind: Option<E::Kind>, once: bool, handler: Handler<E>) -> ListenerId {
        self.listeners.insert(Listener {
            kind,
            once,
            handler,
        })
    }

    /// Registers `handler` for every event of `kind`.
    pub fn on(&mut self, kind: E::Kind, handler: impl FnMut(&E) + Send + 'static) -> ListenerId {
        self.register(Some(kind), false, Box::new(handler))
    }

    /// Registers `handler` for every event.
    pub fn on_any(&mut self, handler: impl FnMut(&E) + Send + 'static) -> ListenerId {
        self.register(None, false, Box::new(handler))
    }

    /// Registers `handler` for the next event of `kind` only.
    pub fn once(&mut self, kind: E::Kind, handler: impl FnMut(&E) + Send + 'static) -> ListenerId {
        self.register(Some(kind), true, Box::new(handler))
    }

    /// Removes a listener. Returns `false` if it was already gone.
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    /// Delivers `event` and returns how many listeners saw it.
    pub fn emit(&mut self, event: &E) -> usize {
        let kind = event.kind();
        let mut invoked = 0;
        let mut spent = Vec::new();
        for (id, listener) in self.listeners.iter_mut() {
            if listener.kind.map_or(true, |k| k == kind) {
                (listener.handler)(event);
                invoked += 1;
                if listener.once {
                    spent.push(id);
                }
            }
        }
        for id in spent {
            self.listeners.remove(id);
        }
        invoked
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
