// # Link Source Trait
//
// Defines the interface to the detection subsystem: whatever observes the
// kernel (or a test harness) and reports interfaces appearing, changing and
// disappearing.
//
// ## Implementations
//
// - Netlink-based (Linux): `linkd-netlink` crate
//
// ## Usage
//
// ```rust,ignore
// use linkd_core::LinkSource;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* LinkSource implementation */;
//
//     // Links present right now
//     for link in source.current().await? {
//         println!("{} {}", link.index, link.name);
//     }
//
//     // Watch for changes
//     let mut stream = source.watch();
//     while let Some(event) = stream.next().await {
//         println!("link event: {:?}", event);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::link::{AddressState, CarrierState, LinkIndex, OperationalState, StateUpdate};

/// What the detection subsystem knows about one link
///
/// State fields are optional: `None` means the source does not track that
/// state, and the registry value is left as it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub index: LinkIndex,
    pub name: String,
    pub operational: Option<OperationalState>,
    pub carrier: Option<CarrierState>,
    pub address: Option<AddressState>,
}

impl LinkInfo {
    /// Create link info with no state
    pub fn new(index: LinkIndex, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            operational: None,
            carrier: None,
            address: None,
        }
    }

    pub fn with_operational(mut self, state: OperationalState) -> Self {
        self.operational = Some(state);
        self
    }

    pub fn with_carrier(mut self, state: CarrierState) -> Self {
        self.carrier = Some(state);
        self
    }

    pub fn with_address(mut self, state: AddressState) -> Self {
        self.address = Some(state);
        self
    }

    /// The known states as registry updates
    pub fn updates(&self) -> Vec<StateUpdate> {
        let mut updates = Vec::with_capacity(3);
        if let Some(state) = self.operational {
            updates.push(StateUpdate::Operational(state));
        }
        if let Some(state) = self.carrier {
            updates.push(StateUpdate::Carrier(state));
        }
        if let Some(state) = self.address {
            updates.push(StateUpdate::Address(state));
        }
        updates
    }
}

/// A change reported by the detection subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A link appeared or its state changed
    Upsert(LinkInfo),
    /// A link disappeared
    Removed { index: LinkIndex },
}

/// Trait for link source implementations
///
/// Two capabilities:
/// 1. **current()**: the links present right now (used to rebuild the
///    registry at startup)
/// 2. **watch()**: stream of link events
///
/// Sources observe; they never touch the registry themselves. The
/// [`LinkMonitor`](crate::monitor::LinkMonitor) applies their events.
///
/// ## Task Spawning Rules
///
/// If you spawn tasks in your implementation:
/// - Task MUST wait for kernel events, not poll periodically
/// - Task MUST exit once the stream returned by `watch()` is dropped
#[async_trait]
pub trait LinkSource: Send + Sync {
    /// Enumerate the links currently present
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<LinkInfo>)`: Every live link
    /// - `Err(Error)`: If the system could not be queried
    async fn current(&self) -> Result<Vec<LinkInfo>, crate::Error>;

    /// Watch for link changes
    ///
    /// The stream should run until the source shuts down. Dropping it must
    /// release all resources.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = LinkEvent> + Send + 'static>>;

    /// Source name (for logging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing link sources from configuration
pub trait LinkSourceFactory: Send + Sync {
    /// Create a LinkSource instance from configuration
    ///
    /// # Returns
    ///
    /// A boxed LinkSource, or `Error::Config` if the configuration names a
    /// different source type or the platform lacks support
    fn create(
        &self,
        config: &crate::config::LinkSourceConfig,
    ) -> Result<Box<dyn LinkSource>, crate::Error>;
}
