//! Link registry
//!
//! The registry is the authoritative in-memory set of known links. It is fed
//! by the detection subsystem (insert/remove/update) and read by the query
//! handler (lookup/enumerate).
//!
//! ## Usage
//!
//! ```rust
//! use linkd_core::link::{OperationalState, StateUpdate};
//! use linkd_core::notify::NullDispatcher;
//! use linkd_core::registry::LinkRegistry;
//! use std::sync::Arc;
//!
//! let registry = LinkRegistry::new(Arc::new(NullDispatcher));
//! registry.insert(2, "eth0").unwrap();
//! registry
//!     .update_state(2, StateUpdate::Operational(OperationalState::Routable))
//!     .unwrap();
//!
//! assert_eq!(registry.get_by_name("eth0").unwrap().index, 2);
//! assert_eq!(registry.summary().operational_state, OperationalState::Routable);
//! ```
//!
//! ## Consistency
//!
//! Every call is one critical section under a single mutex guarding both
//! the records and the manager summary. Enumeration copies records under
//! that same lock, so a listing never mixes states from before and after a
//! concurrent insert or remove. Nothing under the lock performs I/O.
//!
//! Each mutation recomputes the manager summary from the full link set.
//! Changes are queued while the lock is held and handed to the
//! [`NotificationDispatcher`] after it is released, so observers never stall
//! updates or queries.
//!
//! ## Delivery Order
//!
//! Queued changes are delivered in commit order by whichever mutator finds
//! the dispatcher idle. A mutator that commits while another thread is
//! delivering leaves its changes in the queue and returns; the delivering
//! thread drains them before it lets go. An observer's last event therefore
//! always matches [`LinkRegistry::summary`].

use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::{debug, warn};

use crate::aggregate::{LinkStates, ManagerSummary, StateAggregator, WorstCaseAggregator};
use crate::config::LinkdConfig;
use crate::error::{Error, Result};
use crate::link::{LinkIndex, LinkRecord, LinkSnapshot, Property, StateUpdate};
use crate::notify::{ChangedProperty, NotificationDispatcher};
use crate::traits::NameResolver;

struct RegistryState {
    /// Records keyed by index, in insertion order
    links: IndexMap<LinkIndex, LinkRecord>,
    /// Last computed manager summary
    summary: ManagerSummary,
}

/// Changes collected under the lock and delivered after it is released
#[derive(Default)]
struct Pending {
    link: Option<(LinkIndex, Vec<ChangedProperty>)>,
    manager: Vec<ChangedProperty>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.manager.is_empty() && self.link.as_ref().is_none_or(|(_, changed)| changed.is_empty())
    }
}

/// How [`LinkRegistry::upsert`] changed the link set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    /// The index was not registered before
    Added,
    /// The index was registered under another name
    Renamed { old_name: String },
    /// The index was registered under the same name
    Unchanged,
}

/// Result of [`LinkRegistry::upsert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub membership: Membership,
    /// Link properties whose value changed
    pub changed: Vec<Property>,
}

/// Registry of known network links
///
/// ## Thread Safety
///
/// All methods take `&self`; share the registry behind an `Arc` between the
/// detection task and any number of query handlers.
pub struct LinkRegistry {
    state: Mutex<RegistryState>,
    /// Committed changes waiting for delivery, in commit order
    outbox: Mutex<VecDeque<Pending>>,
    /// Held by the one thread currently draining the outbox
    delivering: Mutex<()>,
    aggregator: Box<dyn StateAggregator>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    resolver: Option<Arc<dyn NameResolver>>,
}

impl LinkRegistry {
    /// Create an empty registry with worst-case aggregation
    ///
    /// Without a name resolver the registry's own records are the identity
    /// source for name lookups.
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                links: IndexMap::new(),
                summary: ManagerSummary::default(),
            }),
            outbox: Mutex::new(VecDeque::new()),
            delivering: Mutex::new(()),
            aggregator: Box::new(WorstCaseAggregator),
            dispatcher,
            resolver: None,
        }
    }

    /// Create a registry using the configured aggregation policy
    pub fn from_config(config: &LinkdConfig, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self::new(dispatcher).with_aggregator(config.aggregation.aggregator())
    }

    /// Replace the aggregation rule
    pub fn with_aggregator(mut self, aggregator: Box<dyn StateAggregator>) -> Self {
        debug!("Using {} state aggregation", aggregator.name());
        self.aggregator = aggregator;
        self
    }

    /// Resolve names through the detection subsystem's identity source
    pub fn with_name_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Register a new link with default state
    ///
    /// # Errors
    ///
    /// - `DuplicateIndex` if the index is already registered; the existing
    ///   record is kept untouched
    /// - `InvalidInput` if the index is not positive or the name is empty
    pub fn insert(&self, index: LinkIndex, name: impl Into<String>) -> Result<()> {
        let name = validate_identity(index, name.into())?;

        self.mutate(|state| {
            if let Some(existing) = state.links.get(&index) {
                warn!(
                    "Rejecting link {} ({}): index already registered as {}",
                    index, name, existing.name
                );
                return Err(Error::DuplicateIndex(index));
            }

            state.add(index, name);
            Ok(((), None))
        })
    }

    /// Register or refresh a link as one logical update
    ///
    /// A new index is added with the given state, an index known under
    /// another name is renamed in place, and the updates are applied either
    /// way. The link stays visible to lookups throughout. Observers see at
    /// most one event for the link and one for the manager, computed against
    /// the link set before the call.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the index is not positive or the name is empty
    pub fn upsert(
        &self,
        index: LinkIndex,
        name: impl Into<String>,
        updates: &[StateUpdate],
    ) -> Result<Upserted> {
        let name = validate_identity(index, name.into())?;

        self.mutate(|state| {
            let membership = match state.links.get_mut(&index) {
                Some(record) if record.name != name => {
                    debug!("Link {} renamed {} -> {}", index, record.name, name);
                    Membership::Renamed {
                        old_name: std::mem::replace(&mut record.name, name),
                    }
                }
                Some(_) => Membership::Unchanged,
                None => {
                    state.add(index, name);
                    Membership::Added
                }
            };

            let record = state
                .links
                .get_mut(&index)
                .ok_or_else(|| Error::index_not_found(index))?;
            let (changed, values) = record.apply_all(updates);

            Ok((
                Upserted {
                    membership,
                    changed,
                },
                Some((index, values)),
            ))
        })
    }

    /// Remove a link
    ///
    /// Returns the last snapshot of the removed record.
    pub fn remove(&self, index: LinkIndex) -> Result<LinkSnapshot> {
        self.mutate(|state| {
            let record = state
                .links
                .shift_remove(&index)
                .ok_or_else(|| Error::index_not_found(index))?;

            debug!("Link {} ({}) removed", index, record.name);
            Ok((record.snapshot(), None))
        })
    }

    /// Update one state field of a link
    pub fn update_state(&self, index: LinkIndex, update: StateUpdate) -> Result<()> {
        self.apply(index, &[update]).map(|_| ())
    }

    /// Apply several state updates to one link as a single logical update
    ///
    /// Observers see at most one event for the link and one for the manager,
    /// however many fields changed. Returns the link properties whose value
    /// actually changed.
    pub fn apply(&self, index: LinkIndex, updates: &[StateUpdate]) -> Result<Vec<Property>> {
        self.mutate(|state| {
            let record = state
                .links
                .get_mut(&index)
                .ok_or_else(|| Error::index_not_found(index))?;

            let (changed, values) = record.apply_all(updates);
            Ok((changed, Some((index, values))))
        })
    }

    /// Include or exclude a link from summary aggregation
    pub fn set_managed(&self, index: LinkIndex, managed: bool) -> Result<()> {
        self.mutate(|state| {
            let record = state
                .links
                .get_mut(&index)
                .ok_or_else(|| Error::index_not_found(index))?;

            if record.managed != managed {
                debug!("Link {} ({}) managed={}", index, record.name, managed);
                record.managed = managed;
            }
            Ok(((), None))
        })
    }

    /// Look up a link by index
    pub fn get_by_index(&self, index: LinkIndex) -> Result<LinkSnapshot> {
        self.lock()
            .links
            .get(&index)
            .map(LinkRecord::snapshot)
            .ok_or_else(|| Error::index_not_found(index))
    }

    /// Look up a link by name
    ///
    /// The name is resolved at call time. With a resolver configured, a
    /// name the resolver does not know and a resolved index the registry
    /// does not hold both fail with `NotFound`; the latter is also logged,
    /// as it means the registry and the detection subsystem disagree.
    pub fn get_by_name(&self, name: &str) -> Result<LinkSnapshot> {
        let Some(resolver) = &self.resolver else {
            // Most recently registered holder wins if names briefly overlap
            return self
                .lock()
                .links
                .values()
                .rev()
                .find(|record| record.name == name)
                .map(LinkRecord::snapshot)
                .ok_or_else(|| Error::name_not_found(name));
        };

        // Resolve outside the lock; the resolver may query the system
        let Some(index) = resolver.resolve(name) else {
            return Err(Error::name_not_found(name));
        };

        match self.lock().links.get(&index) {
            Some(record) => Ok(record.snapshot()),
            None => {
                warn!(
                    "Name {} resolves to index {} but no such link is registered",
                    name, index
                );
                Err(Error::name_not_found(name))
            }
        }
    }

    /// Point-in-time copy of every link, in insertion order
    pub fn list(&self) -> Vec<LinkSnapshot> {
        self.lock().links.values().map(LinkRecord::snapshot).collect()
    }

    /// Current manager summary
    pub fn summary(&self) -> ManagerSummary {
        self.lock().summary
    }

    /// Number of registered links
    pub fn len(&self) -> usize {
        self.lock().links.len()
    }

    /// Whether no links are registered
    pub fn is_empty(&self) -> bool {
        self.lock().links.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Records are only mutated through small infallible steps, so a
        // poisoned lock still guards a consistent state
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a mutation, recompute the summary, then notify outside the lock
    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RegistryState) -> Result<(T, Option<(LinkIndex, Vec<ChangedProperty>)>)>,
    {
        let value = {
            let mut state = self.lock();
            let (value, link) = f(&mut state)?;

            let states: Vec<LinkStates> = state.links.values().map(LinkRecord::states).collect();
            let summary = self.aggregator.aggregate(&states);
            let manager = summary
                .diff(&state.summary)
                .into_iter()
                .map(|p| (p, summary.property_value(p)))
                .collect();

            if summary != state.summary {
                debug!(
                    "Manager summary: operational={} carrier={} address={}",
                    summary.operational_state, summary.carrier_state, summary.address_state
                );
            }
            state.summary = summary;

            // Queue while the state lock still fixes the commit order
            let pending = Pending { link, manager };
            if !pending.is_empty() {
                self.outbox
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_back(pending);
            }

            value
        };

        self.flush();
        Ok(value)
    }

    /// Deliver queued changes unless another thread is already doing so
    fn flush(&self) {
        loop {
            let delivering = match self.delivering.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                // The holder drains whatever we queued
                Err(TryLockError::WouldBlock) => return,
            };

            while let Some(pending) = self.next_pending() {
                if let Some((index, changed)) = &pending.link {
                    self.dispatcher.notify_link_changed(*index, changed);
                }
                self.dispatcher.notify_manager_changed(&pending.manager);
            }
            drop(delivering);

            // A change queued after the last pop saw us still holding the lock
            if self
                .outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
            {
                return;
            }
        }
    }

    fn next_pending(&self) -> Option<Pending> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl RegistryState {
    fn add(&mut self, index: LinkIndex, name: String) {
        if let Some(holder) = self.links.values().find(|r| r.name == name) {
            warn!(
                "Link {} registered as {} while link {} still holds that name",
                index, name, holder.index
            );
        }

        debug!("Link {} added as {}", index, name);
        self.links.insert(index, LinkRecord::new(index, name));
    }
}

fn validate_identity(index: LinkIndex, name: String) -> Result<String> {
    if index <= 0 {
        return Err(Error::invalid_input(format!(
            "link index must be positive, got {}",
            index
        )));
    }
    if name.is_empty() {
        return Err(Error::invalid_input(format!(
            "link {} has an empty name",
            index
        )));
    }
    Ok(name)
}

impl LinkRecord {
    /// Apply updates in order, reporting each changed property once
    fn apply_all(&mut self, updates: &[StateUpdate]) -> (Vec<Property>, Vec<ChangedProperty>) {
        let mut changed: Vec<Property> = Vec::new();
        for update in updates {
            if let Some(property) = self.apply(*update) {
                if !changed.contains(&property) {
                    changed.push(property);
                }
            }
        }

        if !changed.is_empty() {
            debug!("Link {} ({}) changed: {:?}", self.index, self.name, changed);
        }

        let snapshot = self.snapshot();
        let values = changed
            .iter()
            .map(|p| (*p, snapshot.property_value(*p)))
            .collect();
        (changed, values)
    }

    fn states(&self) -> LinkStates {
        LinkStates {
            operational: self.operational_state,
            carrier: self.carrier_state,
            address: self.address_state,
            managed: self.managed,
        }
    }
}
