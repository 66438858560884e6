//! Link monitor
//!
//! The LinkMonitor feeds the registry from the detection subsystem:
//! - Rebuilding the registry from the live link set at startup
//! - Applying link events as they arrive
//! - Emitting monitor events for logging and tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ LinkSource  │─── LinkEvent ───┐
//! └─────────────┘                 │
//!                                 ▼
//!                        ┌──────────────┐
//!                        │ LinkMonitor  │──── MonitorEvent ───►
//!                        └──────────────┘
//!                                 │
//!                                 ▼
//!                        ┌──────────────┐
//!                        │ LinkRegistry │──── PropertiesChanged ───► observers
//!                        └──────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. `Upsert` for an unknown index: added together with its reported
//!    states
//! 2. `Upsert` for a known index with the same name: reported states are
//!    applied as one batch
//! 3. `Upsert` for a known index with a new name: renamed in place, then
//!    the reported states are applied
//! 4. `Removed`: remove; unknown indices are ignored
//!
//! Each upsert is a single registry call, so observers never see a new
//! link pass through its default state.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::link::{LinkIndex, Property};
use crate::registry::{LinkRegistry, Membership};
use crate::traits::{LinkEvent, LinkInfo, LinkSource};

/// Events emitted by the LinkMonitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Initial link set applied
    Started { links_count: usize },

    /// Link registered
    LinkAdded { index: LinkIndex, name: String },

    /// Link registered again under a new name
    LinkRenamed {
        index: LinkIndex,
        old_name: String,
        new_name: String,
    },

    /// Link state changed
    StateChanged {
        index: LinkIndex,
        changed: Vec<Property>,
    },

    /// Link removed
    LinkRemoved { index: LinkIndex, name: String },

    /// Monitor stopped
    Stopped { reason: String },
}

/// Applies detection subsystem events to the registry
///
/// ## Lifecycle
///
/// 1. Create with [`LinkMonitor::new()`]
/// 2. Start with [`LinkMonitor::run()`]
/// 3. Monitor runs until a shutdown signal is received
///
/// A failure handling one event is logged and the monitor keeps running.
pub struct LinkMonitor {
    /// Detection subsystem
    source: Box<dyn LinkSource>,

    /// Registry being maintained
    registry: Arc<LinkRegistry>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<MonitorEvent>,
}

impl LinkMonitor {
    /// Create a new monitor
    ///
    /// # Parameters
    ///
    /// - `source`: Link source implementation
    /// - `registry`: Registry to keep in sync
    /// - `event_capacity`: Capacity of the monitor event channel
    ///
    /// # Returns
    ///
    /// A tuple of (monitor, event_receiver) where event_receiver yields monitor events
    pub fn new(
        source: Box<dyn LinkSource>,
        registry: Arc<LinkRegistry>,
        event_capacity: usize,
    ) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (tx, rx) = mpsc::channel(event_capacity.max(1));

        let monitor = Self {
            source,
            registry,
            event_tx: tx,
        };

        (monitor, rx)
    }

    /// Run the monitor until SIGINT
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The initial link set could not be read
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the monitor until `shutdown_rx` fires (or its sender is dropped)
    ///
    /// With `None`, waits for SIGINT like [`run()`](Self::run).
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let links_count = self.seed().await?;
        info!(
            "Loaded {} link(s) from {}",
            links_count,
            self.source.source_name()
        );
        self.emit_event(MonitorEvent::Started { links_count });

        let mut link_stream = self.source.watch();

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to wait for shutdown signal: {}", e);
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(event) = link_stream.next() => {
                    if let Err(e) = self.handle_event(event) {
                        error!("Failed to handle link event: {}", e);
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(MonitorEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        Ok(())
    }

    /// Rebuild the registry from the links present right now
    async fn seed(&self) -> Result<usize> {
        let links = self.source.current().await?;

        for link in &links {
            if let Err(e) = self.upsert(link) {
                warn!("Skipping link {} ({}): {}", link.index, link.name, e);
            }
        }

        Ok(links.len())
    }

    /// Apply a single link event
    pub fn handle_event(&self, event: LinkEvent) -> Result<()> {
        match event {
            LinkEvent::Upsert(link) => self.upsert(&link),
            LinkEvent::Removed { index } => match self.registry.remove(index) {
                Ok(link) => {
                    info!("Link {} ({}) removed", index, link.name);
                    self.emit_event(MonitorEvent::LinkRemoved {
                        index,
                        name: link.name,
                    });
                    Ok(())
                }
                Err(e) if e.is_not_found() => {
                    debug!("Ignoring removal of unknown link {}", index);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        }
    }

    fn upsert(&self, link: &LinkInfo) -> Result<()> {
        let upserted = self
            .registry
            .upsert(link.index, link.name.clone(), &link.updates())?;

        match upserted.membership {
            Membership::Added => {
                info!("Link {} ({}) added", link.index, link.name);
                self.emit_event(MonitorEvent::LinkAdded {
                    index: link.index,
                    name: link.name.clone(),
                });
            }
            Membership::Renamed { old_name } => {
                info!("Link {} renamed {} -> {}", link.index, old_name, link.name);
                self.emit_event(MonitorEvent::LinkRenamed {
                    index: link.index,
                    old_name,
                    new_name: link.name.clone(),
                });
            }
            Membership::Unchanged => {}
        }

        if !upserted.changed.is_empty() {
            self.emit_event(MonitorEvent::StateChanged {
                index: link.index,
                changed: upserted.changed,
            });
        }

        Ok(())
    }

    /// Emit a monitor event
    fn emit_event(&self, event: MonitorEvent) {
        // Never block the monitor on a slow consumer
        if self.event_tx.try_send(event).is_err() {
            warn!("Monitor event channel full, dropping event");
        }
    }
}
