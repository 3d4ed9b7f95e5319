//! Synchronized configuration cells
//!
//! Writers take the cell's mutex, build the next value from the current
//! snapshot, publish it, and emit a `CONFIGURATION_UPDATE` event. Readers load
//! the last published snapshot without locking.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::observability::{EventSink, ProxyEvent};

pub(crate) struct Synchronized<T> {
    scope: String,
    lock: Mutex<()>,
    value: ArcSwap<T>,
    events: Arc<dyn EventSink>,
}

impl<T: Clone> Synchronized<T> {
    pub(crate) fn new(scope: impl Into<String>, initial: T, events: Arc<dyn EventSink>) -> Self {
        Self {
            scope: scope.into(),
            lock: Mutex::new(()),
            value: ArcSwap::from_pointee(initial),
            events,
        }
    }

    /// Last published snapshot
    pub(crate) fn load(&self) -> Arc<T> {
        self.value.load_full()
    }

    /// Apply `mutate` under the lock and announce the change of `attribute`.
    ///
    /// `observe` extracts the attribute's value for the event payload.
    pub(crate) fn update<V, R, M>(&self, attribute: &str, observe: R, mutate: M)
    where
        V: Debug,
        R: Fn(&T) -> V,
        M: FnOnce(&mut T),
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.value.load_full();
        let mut next = (*current).clone();
        mutate(&mut next);

        let from = format!("{:?}", observe(&current));
        let to = format!("{:?}", observe(&next));
        self.value.store(Arc::new(next));

        self.events.emit(&ProxyEvent::ConfigurationUpdate {
            attribute: self.qualified(attribute),
            from,
            to,
            actor: current_actor(),
        });
    }

    fn qualified(&self, attribute: &str) -> String {
        if self.scope.is_empty() {
            attribute.to_string()
        } else {
            format!("{}.{}", self.scope, attribute)
        }
    }
}

fn current_actor() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;

    #[derive(Debug, Clone, PartialEq)]
    struct Knob {
        level: u32,
    }

    #[test]
    fn test_update_publishes_and_announces() {
        let sink = Arc::new(MemorySink::new());
        let cell = Synchronized::new("knob", Knob { level: 1 }, sink.clone());

        let before = cell.load();
        cell.update("level", |k| k.level, |k| k.level = 7);

        assert_eq!(before.level, 1);
        assert_eq!(cell.load().level, 7);

        match &sink.events()[0] {
            ProxyEvent::ConfigurationUpdate {
                attribute,
                from,
                to,
                ..
            } => {
                assert_eq!(attribute, "knob.level");
                assert_eq!(from, "1");
                assert_eq!(to, "7");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let sink = Arc::new(MemorySink::new());
        let cell = Arc::new(Synchronized::new("", Knob { level: 0 }, sink.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cell.update("level", |k| k.level, |k| k.level += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cell.load().level, 400);
        assert_eq!(sink.count("CONFIGURATION_UPDATE"), 400);
    }
}
