//! Typed publish/subscribe for entity events.
//!
//! Each event enum is declared with [`events!`], which also generates a
//! field-less `Kind` enum naming its variants. Handlers register for a kind
//! and receive every event of that kind.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// An event type with a closed set of kinds.
pub trait Event: Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + std::fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Declare an event enum and its kind enum.
///
/// ```
/// sfuctl::events! {
///     /// Events of a thing.
///     pub enum ThingEvent: ThingEventKind {
///         Close,
///         Score(u8),
///     }
/// }
///
/// use sfuctl::events::Event;
/// assert_eq!(ThingEvent::Score(3).kind(), ThingEventKind::Score);
/// ```
#[macro_export]
macro_rules! events {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $kind:ident {
            $( $(#[$vmeta:meta])* $variant:ident $( ( $($ty:ty),+ $(,)? ) )? ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant $( ( $($ty),+ ) )?, )+
        }

        #[doc = concat!("Kinds of [`", stringify!($name), "`].")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $kind {
            $( $variant, )+
        }

        impl $crate::events::Event for $name {
            type Kind = $kind;

            fn kind(&self) -> $kind {
                match self {
                    $( $name::$variant { .. } => $kind::$variant, )+
                }
            }
        }
    };
}

/// Handle returned when registering a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E: Event> {
    id: HandlerId,
    kind: E::Kind,
    once: bool,
    handler: Handler<E>,
}

struct Inner<E: Event> {
    next: u64,
    entries: Vec<Entry<E>>,
}

/// Handlers for one event type, in registration order.
pub struct Emitter<E: Event> {
    inner: Mutex<Inner<E>>,
}

impl<E: Event> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> Emitter<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next: 0,
                entries: Vec::new(),
            }),
        }
    }

    /// Call `handler` for every event of `kind`.
    pub fn on<F>(&self, kind: E::Kind, handler: F) -> HandlerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(handler))
    }

    /// Call `handler` for the next event of `kind` only.
    pub fn once<F>(&self, kind: E::Kind, handler: F) -> HandlerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(handler))
    }

    fn register(&self, kind: E::Kind, once: bool, handler: Handler<E>) -> HandlerId {
        let mut inner = self.inner.lock();
        inner.next += 1;
        let id = HandlerId(inner.next);
        inner.entries.push(Entry {
            id,
            kind,
            once,
            handler,
        });
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.id != id);
        inner.entries.len() != before
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    /// Deliver `event` to its handlers and return how many ran.
    ///
    /// Handlers are called after the internal lock is released, so they may
    /// register or remove handlers and call back into the emitting entity.
    pub fn emit(&self, event: &E) -> usize {
        let kind = event.kind();
        let handlers: Vec<Handler<E>> = {
            let mut inner = self.inner.lock();
            let handlers = inner
                .entries
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| Arc::clone(&e.handler))
                .collect();
            inner.entries.retain(|e| !(e.once && e.kind == kind));
            handlers
        };

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

crate::events! {
    /// Crate-internal close signals from a child to its parent.
    pub(crate) enum InternalEvent: InternalEventKind {
        /// The child closed itself.
        Close,
        /// The child closed because the entity it follows closed.
        UpstreamClose,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    crate::events! {
        enum TestEvent: TestEventKind {
            Close,
            Score(u8),
            Pair(u8, String),
        }
    }

    #[test]
    fn kinds_match_variants() {
        assert_eq!(TestEvent::Close.kind(), TestEventKind::Close);
        assert_eq!(TestEvent::Score(1).kind(), TestEventKind::Score);
        assert_eq!(TestEvent::Pair(1, "a".into()).kind(), TestEventKind::Pair);
    }

    #[test]
    fn emit_reaches_handlers_of_same_kind() {
        let emitter = Emitter::<TestEvent>::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t = Arc::clone(&total);
        emitter.on(TestEventKind::Score, move |e| {
            if let TestEvent::Score(n) = e {
                t.fetch_add(*n as usize, Ordering::SeqCst);
            }
        });
        emitter.on(TestEventKind::Close, |_| panic!("wrong kind"));

        assert_eq!(emitter.emit(&TestEvent::Score(3)), 1);
        assert_eq!(emitter.emit(&TestEvent::Score(4)), 1);
        assert_eq!(total.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn once_runs_a_single_time() {
        let emitter = Emitter::<TestEvent>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        emitter.once(TestEventKind::Close, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&TestEvent::Close);
        emitter.emit(&TestEvent::Close);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(TestEventKind::Close), 0);
    }

    #[test]
    fn off_and_clear() {
        let emitter = Emitter::<TestEvent>::new();
        let id = emitter.on(TestEventKind::Close, |_| {});
        emitter.on(TestEventKind::Score, |_| {});

        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        assert_eq!(emitter.listener_count(TestEventKind::Close), 0);

        emitter.clear();
        assert_eq!(emitter.emit(&TestEvent::Score(1)), 0);
    }

    #[test]
    fn handler_may_reenter_the_emitter() {
        let emitter = Arc::new(Emitter::<TestEvent>::new());
        let inner = Arc::clone(&emitter);
        emitter.on(TestEventKind::Close, move |_| {
            inner.on(TestEventKind::Score, |_| {});
        });

        emitter.emit(&TestEvent::Close);
        assert_eq!(emitter.listener_count(TestEventKind::Score), 1);
    }
}
