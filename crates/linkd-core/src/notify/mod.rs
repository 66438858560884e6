//! Property change notifications
//!
//! The registry reports committed changes through a [`NotificationDispatcher`]
//! after it has released its lock. One logical update yields at most one
//! event per scope (the manager, or a single link), naming exactly the
//! properties whose value changed together with their new values.
//!
//! ## Delivery
//!
//! [`ObserverDispatcher`] fans each event out to every registered
//! [`Observer`]. Delivery is fire-and-forget:
//!
//! - no observers is not an error
//! - a failing observer is logged and skipped, the rest still receive the event
//! - observers that have gone away are pruned
//! - the state change that caused the event is never rolled back
//!
//! ```text
//! LinkRegistry ── commit ── unlock ──► NotificationDispatcher
//!                                              │
//!                        ┌─────────────────────┼─────────────────────┐
//!                        ▼                     ▼                     ▼
//!                 ChannelObserver       ChannelObserver        dyn Observer
//! ```

pub mod channel;

pub use channel::ChannelObserver;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::link::{LinkIndex, Property, ResourcePaths};

/// Which object an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Manager,
    Link(LinkIndex),
}

/// A "properties changed" event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesChanged {
    pub scope: Scope,
    /// Resource path of the object that changed
    pub path: String,
    /// Changed properties and their new values
    pub changed: BTreeMap<Property, String>,
}

impl PropertiesChanged {
    /// Names of the changed properties
    pub fn property_names(&self) -> Vec<&'static str> {
        self.changed.keys().map(Property::as_str).collect()
    }
}

/// A changed property paired with its new wire value
pub type ChangedProperty = (Property, &'static str);

/// Receives committed changes from the registry
///
/// Both methods are called outside the registry lock, after the mutation is
/// visible to queries. Implementations must not block.
pub trait NotificationDispatcher: Send + Sync {
    /// Report changed manager summary properties. Empty input is a no-op.
    fn notify_manager_changed(&self, changed: &[ChangedProperty]);

    /// Report changed properties of one link. Empty input is a no-op.
    fn notify_link_changed(&self, index: LinkIndex, changed: &[ChangedProperty]);
}

/// Dispatcher that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDispatcher;

impl NotificationDispatcher for NullDispatcher {
    fn notify_manager_changed(&self, _changed: &[ChangedProperty]) {}

    fn notify_link_changed(&self, _index: LinkIndex, _changed: &[ChangedProperty]) {}
}

/// Why an observer could not take an event
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("observer queue is full")]
    Full,

    #[error("observer has gone away")]
    Closed,
}

/// Anything subscribed to property change events
pub trait Observer: Send + Sync {
    fn deliver(&self, event: &PropertiesChanged) -> Result<(), DeliveryError>;
}

/// Handle returned by [`ObserverDispatcher::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Fans events out to registered observers
pub struct ObserverDispatcher {
    paths: ResourcePaths,
    observers: Mutex<Vec<(ObserverId, Arc<dyn Observer>)>>,
    next_id: AtomicU64,
    channel_capacity: usize,
}

impl ObserverDispatcher {
    /// Create a dispatcher with no observers
    ///
    /// # Parameters
    ///
    /// - `paths`: Path scheme used to address events
    /// - `channel_capacity`: Queue size for observers created by [`subscribe`](Self::subscribe)
    pub fn new(paths: ResourcePaths, channel_capacity: usize) -> Self {
        Self {
            paths,
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Register an observer
    pub fn register(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        debug!("Registered observer {:?}", id);
        id
    }

    /// Remove an observer, returning whether it was registered
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        before != observers.len()
    }

    /// Subscribe through a bounded channel
    ///
    /// The observer is pruned automatically once the receiver is dropped.
    pub fn subscribe(&self) -> mpsc::Receiver<PropertiesChanged> {
        let (observer, rx) = ChannelObserver::new(self.channel_capacity);
        self.register(Arc::new(observer));
        rx
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn broadcast(&self, event: PropertiesChanged) {
        // Deliver from a copy so observers never run under the list lock
        let observers: Vec<_> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        trace!(
            "Dispatching change on {} to {} observer(s): {:?}",
            event.path,
            observers.len(),
            event.property_names()
        );

        let mut closed = Vec::new();
        for (id, observer) in &observers {
            match observer.deliver(&event) {
                Ok(()) => {}
                Err(DeliveryError::Closed) => {
                    debug!("Observer {:?} closed, removing", id);
                    closed.push(*id);
                }
                Err(e) => {
                    warn!(
                        "Dropping change on {} for observer {:?}: {}",
                        event.path, id, e
                    );
                }
            }
        }

        if !closed.is_empty() {
            self.observers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| !closed.contains(id));
        }
    }
}

impl NotificationDispatcher for ObserverDispatcher {
    fn notify_manager_changed(&self, changed: &[ChangedProperty]) {
        if changed.is_empty() {
            return;
        }

        self.broadcast(PropertiesChanged {
            scope: Scope::Manager,
            path: self.paths.manager_path(),
            changed: to_map(changed),
        });
    }

    fn notify_link_changed(&self, index: LinkIndex, changed: &[ChangedProperty]) {
        if changed.is_empty() {
            return;
        }

        self.broadcast(PropertiesChanged {
            scope: Scope::Link(index),
            path: self.paths.link_path(index),
            changed: to_map(changed),
        });
    }
}

fn to_map(changed: &[ChangedProperty]) -> BTreeMap<Property, String> {
    changed
        .iter()
        .map(|(property, value)| (*property, (*value).to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FailingObserver {
        error: DeliveryError,
        attempts: AtomicUsize,
    }

    impl Observer for FailingObserver {
        fn deliver(&self, _event: &PropertiesChanged) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(self.error)
        }
    }

    fn dispatcher() -> ObserverDispatcher {
        ObserverDispatcher::new(ResourcePaths::default(), 8)
    }

    #[test]
    fn empty_change_set_emits_nothing() {
        let dispatcher = dispatcher();
        let mut rx = dispatcher.subscribe();

        dispatcher.notify_manager_changed(&[]);
        dispatcher.notify_link_changed(3, &[]);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn manager_event_names_changed_fields_and_values() {
        let dispatcher = dispatcher();
        let mut rx = dispatcher.subscribe();

        dispatcher.notify_manager_changed(&[(Property::OperationalState, "routable")]);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.scope, Scope::Manager);
        assert_eq!(event.path, "/org/freedesktop/network1");
        assert_eq!(event.property_names(), vec!["OperationalState"]);
        assert_eq!(event.changed[&Property::OperationalState], "routable");
    }

    #[test]
    fn link_event_is_scoped_to_link_path() {
        let dispatcher = dispatcher();
        let mut rx = dispatcher.subscribe();

        dispatcher.notify_link_changed(
            3,
            &[
                (Property::CarrierState, "carrier"),
                (Property::OperationalState, "carrier"),
            ],
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.scope, Scope::Link(3));
        assert_eq!(event.path, "/org/freedesktop/network1/link/3");
        assert_eq!(
            event.property_names(),
            vec!["OperationalState", "CarrierState"]
        );
    }

    #[test]
    fn failing_observer_does_not_block_others() {
        let dispatcher = dispatcher();
        let failing = Arc::new(FailingObserver {
            error: DeliveryError::Full,
            attempts: AtomicUsize::new(0),
        });
        dispatcher.register(failing.clone());
        let mut rx = dispatcher.subscribe();

        dispatcher.notify_manager_changed(&[(Property::CarrierState, "carrier")]);

        assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_ok());
        // A full observer stays registered
        assert_eq!(dispatcher.observer_count(), 2);
    }

    #[test]
    fn closed_observers_are_pruned() {
        let dispatcher = dispatcher();
        let rx = dispatcher.subscribe();
        let mut kept = dispatcher.subscribe();
        drop(rx);

        dispatcher.notify_manager_changed(&[(Property::AddressState, "degraded")]);

        assert_eq!(dispatcher.observer_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn unregister_stops_delivery() {
        let dispatcher = dispatcher();
        let (observer, mut rx) = ChannelObserver::new(4);
        let id = dispatcher.register(Arc::new(observer));

        assert!(dispatcher.unregister(id));
        assert!(!dispatcher.unregister(id));

        dispatcher.notify_manager_changed(&[(Property::AddressState, "degraded")]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn no_observers_is_fine() {
        let dispatcher = dispatcher();
        dispatcher.notify_manager_changed(&[(Property::OperationalState, "off")]);
        assert_eq!(dispatcher.observer_count(), 0);
    }
}
