//! Link records
//!
//! A link is a network interface known to the system, identified by its
//! kernel index. The registry owns [`LinkRecord`]s; everything outside the
//! registry sees [`LinkSnapshot`] copies.

pub mod state;

pub use state::{AddressState, CarrierState, OperationalState, Property, StateUpdate};

use serde::{Deserialize, Serialize};

/// Kernel interface index
pub type LinkIndex = i32;

/// Default object path prefix for the manager and its links
pub const DEFAULT_BASE_PATH: &str = "/org/freedesktop/network1";

/// Mutable record for a single link, owned by the registry
#[derive(Debug, Clone)]
pub(crate) struct LinkRecord {
    pub(crate) index: LinkIndex,
    pub(crate) name: String,
    pub(crate) operational_state: OperationalState,
    pub(crate) carrier_state: CarrierState,
    pub(crate) address_state: AddressState,
    pub(crate) managed: bool,
}

impl LinkRecord {
    pub(crate) fn new(index: LinkIndex, name: String) -> Self {
        Self {
            index,
            name,
            operational_state: OperationalState::default(),
            carrier_state: CarrierState::default(),
            address_state: AddressState::default(),
            managed: true,
        }
    }

    /// Apply an update, returning the property if its value changed
    pub(crate) fn apply(&mut self, update: StateUpdate) -> Option<Property> {
        let changed = match update {
            StateUpdate::Operational(state) => {
                std::mem::replace(&mut self.operational_state, state) != state
            }
            StateUpdate::Carrier(state) => {
                std::mem::replace(&mut self.carrier_state, state) != state
            }
            StateUpdate::Address(state) => {
                std::mem::replace(&mut self.address_state, state) != state
            }
        };

        changed.then(|| update.property())
    }

    pub(crate) fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            index: self.index,
            name: self.name.clone(),
            operational_state: self.operational_state,
            carrier_state: self.carrier_state,
            address_state: self.address_state,
            managed: self.managed,
        }
    }
}

/// Immutable copy of a link record, taken under the registry lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub index: LinkIndex,
    pub name: String,
    pub operational_state: OperationalState,
    pub carrier_state: CarrierState,
    pub address_state: AddressState,
    pub managed: bool,
}

impl LinkSnapshot {
    /// Current string value of a property
    pub fn property_value(&self, property: Property) -> &'static str {
        match property {
            Property::OperationalState => self.operational_state.as_str(),
            Property::CarrierState => self.carrier_state.as_str(),
            Property::AddressState => self.address_state.as_str(),
        }
    }
}

/// Derives external resource paths from link indices
///
/// Paths are computed on demand and never stored in records. A path is
/// never empty: an empty base collapses to the root path `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePaths {
    base: String,
}

impl ResourcePaths {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let base = base.trim_end_matches('/').to_string();
        Self { base }
    }

    /// Path of the manager object
    pub fn manager_path(&self) -> String {
        empty_to_root(&self.base).to_string()
    }

    /// Path of a link object
    pub fn link_path(&self, index: LinkIndex) -> String {
        format!("{}/link/{}", self.base, index)
    }
}

impl Default for ResourcePaths {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PATH)
    }
}

fn empty_to_root(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}
