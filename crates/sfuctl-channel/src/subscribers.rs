use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::method::Event;
use crate::wire::NotificationBody;

/// Payload of an inbound notification.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationData {
    /// `data` of a JSON notification (`Null` when absent).
    Json(Value),
    Binary(NotificationBody),
}

/// An unsolicited worker message addressed to one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub target_id: String,
    pub event: Event,
    pub data: NotificationData,
}

/// Handle returned by [`Subscribers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Default)]
struct Inner {
    next: u64,
    by_target: HashMap<String, Vec<(SubscriptionId, Handler)>>,
}

/// Notification listeners keyed by target entity id.
#[derive(Default)]
pub struct Subscribers {
    inner: Mutex<Inner>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for notifications addressed to `target_id`.
    pub fn subscribe<F>(&self, target_id: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next += 1;
        let id = SubscriptionId(inner.next);
        inner
            .by_target
            .entry(target_id.to_owned())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove one listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, target_id: &str, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let Some(handlers) = inner.by_target.get_mut(target_id) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            inner.by_target.remove(target_id);
        }
        removed
    }

    /// Remove every listener for `target_id`.
    pub fn unsubscribe_all(&self, target_id: &str) {
        self.inner.lock().by_target.remove(target_id);
    }

    pub fn listener_count(&self, target_id: &str) -> usize {
        self.inner
            .lock()
            .by_target
            .get(target_id)
            .map_or(0, Vec::len)
    }

    /// Invoke every listener for the notification's target. Returns how many
    /// ran. Handlers run without the lock held, so they may subscribe or
    /// unsubscribe.
    pub fn dispatch(&self, notification: &Notification) -> usize {
        let handlers: Vec<Handler> = match self.inner.lock().by_target.get(&notification.target_id) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };
        for handler in &handlers {
            handler(notification);
        }
        handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn notification(target: &str) -> Notification {
        Notification {
            target_id: target.into(),
            event: Event::Score,
            data: NotificationData::Json(Value::Null),
        }
    }

    #[test]
    fn dispatch_reaches_only_matching_target() {
        let subs = Subscribers::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        subs.subscribe("a", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let h = Arc::clone(&hits);
        subs.subscribe("a", move |_| {
            h.fetch_add(10, Ordering::SeqCst);
        });
        subs.subscribe("b", |_| panic!("wrong target"));

        assert_eq!(subs.dispatch(&notification("a")), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 11);
        assert_eq!(subs.dispatch(&notification("zzz")), 0);
    }

    #[test]
    fn unsubscribe_removes_listeners() {
        let subs = Subscribers::new();
        let first = subs.subscribe("a", |_| {});
        subs.subscribe("a", |_| {});

        assert!(subs.unsubscribe("a", first));
        assert!(!subs.unsubscribe("a", first));
        assert_eq!(subs.listener_count("a"), 1);

        subs.unsubscribe_all("a");
        assert_eq!(subs.listener_count("a"), 0);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let subs = Arc::new(Subscribers::new());
        let inner = Arc::clone(&subs);
        subs.subscribe("a", move |n| inner.unsubscribe_all(&n.target_id));

        assert_eq!(subs.dispatch(&notification("a")), 1);
        assert_eq!(subs.listener_count("a"), 0);
    }
}
