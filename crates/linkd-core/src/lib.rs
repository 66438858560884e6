// # linkd-core
//
// Core library for the network link registry service.
//
// ## Architecture Overview
//
// This library keeps track of the host's network links and answers queries
// about them:
// - **LinkRegistry**: Authoritative set of links plus the manager summary
// - **StateAggregator**: Rule deriving the manager summary from link states
// - **QueryHandler**: Translates requests into registry reads
// - **NotificationDispatcher**: Delivers PropertiesChanged events to observers
// - **LinkSource**: Trait for the detection subsystem feeding the registry
// - **LinkMonitor**: Applies link source events to the registry
//
// ## Design Principles
//
// 1. **Snapshots Out**: Callers never hold references into the registry
// 2. **Event-Driven**: Link changes arrive as async streams
// 3. **Exactly-Once Notification**: One event per observable change
// 4. **Library-First**: All core functionality can be used as a library

pub mod aggregate;
pub mod config;
pub mod error;
pub mod link;
pub mod monitor;
pub mod notify;
pub mod query;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use aggregate::{
    BestCaseAggregator, LinkStates, ManagerSummary, StateAggregator, WorstCaseAggregator,
};
pub use config::{AggregationPolicy, BusConfig, LinkSourceConfig, LinkdConfig, NotifyConfig};
pub use error::{Error, LinkKey, Result};
pub use link::{
    AddressState, CarrierState, LinkIndex, LinkSnapshot, OperationalState, Property,
    ResourcePaths, StateUpdate,
};
pub use monitor::{LinkMonitor, MonitorEvent};
pub use notify::{
    ChannelObserver, NotificationDispatcher, NullDispatcher, Observer, ObserverDispatcher,
    PropertiesChanged, Scope,
};
pub use query::{QueryError, QueryHandler, Request, Response};
pub use registry::{LinkRegistry, Membership, Upserted};
pub use traits::{
    LinkEvent, LinkInfo, LinkSource, LinkSourceFactory, NameResolver, StaticNameResolver,
};
