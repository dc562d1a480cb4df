//! Mutation events and subscriber bookkeeping.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A mutation applied to a storage instance.
///
/// Reads never produce events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A key was written. Carries the key, not the value.
    Set { key: String },
    /// A key was removed, whether or not it existed.
    Remove { key: String },
    /// Every key was removed at once.
    Clear,
}

impl StoreEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Set { .. } => "SET",
            Self::Remove { .. } => "REMOVE",
            Self::Clear => "CLEAR",
        }
    }

    /// The affected key, if the event concerns a single one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Set { key } | Self::Remove { key } => Some(key),
            Self::Clear => None,
        }
    }
}

impl fmt::Display for StoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key() {
            Some(key) => write!(f, "{} {key}", self.kind()),
            None => f.write_str(self.kind()),
        }
    }
}

/// Callback invoked with every mutation event of an instance.
pub type Observer = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Callback invoked with the new value of a watched key (`None` on removal).
pub type Watcher = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Handle returned by `subscribe`/`watch`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

impl Subscription {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered subscriber lists of one instance.
///
/// Registering the same callback twice keeps both registrations.
#[derive(Default)]
pub(crate) struct Observers {
    observers: Vec<(Subscription, Observer)>,
    watchers: Vec<(Subscription, String, Watcher)>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self, observer: Observer) -> Subscription {
        let id = Subscription::next();
        self.observers.push((id, observer));
        id
    }

    pub(crate) fn watch(&mut self, key: &str, watcher: Watcher) -> Subscription {
        let id = Subscription::next();
        self.watchers.push((id, key.to_string(), watcher));
        id
    }

    /// Returns whether anything was removed.
    pub(crate) fn unsubscribe(&mut self, id: Subscription) -> bool {
        let before = self.observers.len() + self.watchers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.watchers.retain(|(sub, _, _)| *sub != id);
        before != self.observers.len() + self.watchers.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.observers.len() + self.watchers.len()
    }

    /// Snapshot of the callbacks interested in `event`.
    ///
    /// Taken under the instance lock and run after it is released, so a
    /// callback may call back into the same instance.
    pub(crate) fn dispatch(&self, event: &StoreEvent, value: Option<&Value>) -> Dispatch {
        let watchers = self
            .watchers
            .iter()
            .filter(|(_, key, _)| event.key().is_none_or(|k| k == key.as_str()))
            .map(|(_, _, watcher)| Arc::clone(watcher))
            .collect();

        Dispatch {
            event: event.clone(),
            value: value.cloned(),
            observers: self.observers.iter().map(|(_, o)| Arc::clone(o)).collect(),
            watchers,
        }
    }
}

/// Pending notification for one event.
pub(crate) struct Dispatch {
    event: StoreEvent,
    value: Option<Value>,
    observers: Vec<Observer>,
    watchers: Vec<Watcher>,
}

impl Dispatch {
    pub(crate) fn event(&self) -> &StoreEvent {
        &self.event
    }

    pub(crate) fn run(self) {
        for observer in &self.observers {
            observer(&self.event);
        }
        let value = match self.event {
            StoreEvent::Set { .. } => self.value.as_ref(),
            StoreEvent::Remove { .. } | StoreEvent::Clear => None,
        };
        for watcher in &self.watchers {
            watcher(value);
        }
    }
}
