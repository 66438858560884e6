//! Manager-level state aggregation
//!
//! The manager exposes three summary states derived from every managed link.
//! Summaries are always recomputed from the full link set, never patched
//! incrementally, so two registries holding the same states always agree.
//!
//! The reduction rule is pluggable through [`StateAggregator`]:
//!
//! - [`WorstCaseAggregator`]: the most degraded value wins (default)
//! - [`BestCaseAggregator`]: the best value wins
//!
//! Both yield `off` for all three fields when no managed link exists.

use serde::{Deserialize, Serialize};

use crate::config::AggregationPolicy;
use crate::link::{AddressState, CarrierState, OperationalState, Property};

/// The per-link inputs to aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStates {
    pub operational: OperationalState,
    pub carrier: CarrierState,
    pub address: AddressState,
    /// Unmanaged links do not contribute to the summary
    pub managed: bool,
}

/// Manager-level summary states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManagerSummary {
    pub operational_state: OperationalState,
    pub carrier_state: CarrierState,
    pub address_state: AddressState,
}

impl ManagerSummary {
    /// Properties whose value differs from `previous`
    pub fn diff(&self, previous: &ManagerSummary) -> Vec<Property> {
        let mut changed = Vec::new();

        if self.operational_state != previous.operational_state {
            changed.push(Property::OperationalState);
        }
        if self.carrier_state != previous.carrier_state {
            changed.push(Property::CarrierState);
        }
        if self.address_state != previous.address_state {
            changed.push(Property::AddressState);
        }

        changed
    }

    /// Current string value of a property
    pub fn property_value(&self, property: Property) -> &'static str {
        match property {
            Property::OperationalState => self.operational_state.as_str(),
            Property::CarrierState => self.carrier_state.as_str(),
            Property::AddressState => self.address_state.as_str(),
        }
    }
}

/// Reduces per-link states into a manager summary
///
/// Implementations must be pure: the result depends only on the multiset of
/// inputs, never on their order or on previous calls.
pub trait StateAggregator: Send + Sync {
    fn aggregate(&self, links: &[LinkStates]) -> ManagerSummary;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Most degraded value wins
#[derive(Debug, Default, Clone, Copy)]
pub struct WorstCaseAggregator;

impl StateAggregator for WorstCaseAggregator {
    fn aggregate(&self, links: &[LinkStates]) -> ManagerSummary {
        let managed = || links.iter().filter(|link| link.managed);

        ManagerSummary {
            operational_state: managed().map(|l| l.operational).min().unwrap_or_default(),
            carrier_state: managed().map(|l| l.carrier).min().unwrap_or_default(),
            address_state: managed().map(|l| l.address).min().unwrap_or_default(),
        }
    }

    fn name(&self) -> &'static str {
        "worst-case"
    }
}

/// Best value wins
#[derive(Debug, Default, Clone, Copy)]
pub struct BestCaseAggregator;

impl StateAggregator for BestCaseAggregator {
    fn aggregate(&self, links: &[LinkStates]) -> ManagerSummary {
        let managed = || links.iter().filter(|link| link.managed);

        ManagerSummary {
            operational_state: managed().map(|l| l.operational).max().unwrap_or_default(),
            carrier_state: managed().map(|l| l.carrier).max().unwrap_or_default(),
            address_state: managed().map(|l| l.address).max().unwrap_or_default(),
        }
    }

    fn name(&self) -> &'static str {
        "best-case"
    }
}

impl AggregationPolicy {
    /// Build the aggregator selected by this policy
    pub fn aggregator(&self) -> Box<dyn StateAggregator> {
        match self {
            AggregationPolicy::Worst => Box::new(WorstCaseAggregator),
            AggregationPolicy::Best => Box::new(BestCaseAggregator),
        }
    }
}
