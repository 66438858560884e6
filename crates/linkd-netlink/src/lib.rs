// # Kernel Link Source
//
// This crate provides the detection subsystem for Linux hosts.
//
// ## How It Works
//
// 1. Subscribe to RTMGRP_LINK on a NETLINK_ROUTE socket
// 2. Enumerate `/sys/class/net` for the links present right now
// 3. Parse RTM_NEWLINK / RTM_DELLINK with `netlink-packet-route`
// 4. Emit LinkEvent for each change
//
// The socket is opened before enumeration, so a change racing startup is
// still delivered by the watch stream.
//
// ## Platform Support
//
// Netlink is Linux-specific. On other platforms the factory refuses to
// build a source and the name resolver never resolves.

pub mod kernel;
pub mod resolver;
pub mod sysfs;

#[cfg(target_os = "linux")]
mod watch;

pub use resolver::SystemNameResolver;

use linkd_core::config::LinkSourceConfig;
use linkd_core::traits::{LinkEvent, LinkInfo, LinkSource, LinkSourceFactory};
use linkd_core::{Error, Result};
use std::path::PathBuf;
use std::pin::Pin;
use tokio_stream::Stream;

#[cfg(target_os = "linux")]
use std::sync::{Mutex, PoisonError};
#[cfg(target_os = "linux")]
use tracing::{debug, error};

/// Kernel events buffered between the netlink task and the monitor
const EVENT_BUFFER: usize = 256;

/// Link source backed by sysfs (enumeration) and rtnetlink (changes)
pub struct NetlinkLinkSource {
    sysfs_root: PathBuf,

    /// Socket opened by `current()`, handed over to `watch()`
    #[cfg(target_os = "linux")]
    pending_socket: Mutex<Option<netlink_sys::TokioSocket>>,
}

impl NetlinkLinkSource {
    pub fn new() -> Self {
        Self::with_sysfs_root(sysfs::SYSFS_NET)
    }

    /// Enumerate from a different sysfs directory
    pub fn with_sysfs_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: root.into(),
            #[cfg(target_os = "linux")]
            pending_socket: Mutex::new(None),
        }
    }

    #[cfg(target_os = "linux")]
    fn subscribe_early(&self) {
        let mut pending = self
            .pending_socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if pending.is_some() {
            return;
        }

        match watch::open_socket() {
            Ok(socket) => *pending = Some(socket),
            // watch() retries and reports the failure
            Err(e) => debug!("Early netlink subscription failed: {}", e),
        }
    }
}

impl Default for NetlinkLinkSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LinkSource for NetlinkLinkSource {
    async fn current(&self) -> Result<Vec<LinkInfo>> {
        #[cfg(target_os = "linux")]
        self.subscribe_early();

        let links = sysfs::read_links(&self.sysfs_root).await.map_err(|e| {
            Error::link_source(format!(
                "Failed to enumerate {}: {}",
                self.sysfs_root.display(),
                e
            ))
        })?;

        Ok(links.iter().filter_map(kernel::KernelLink::to_link_info).collect())
    }

    #[cfg(target_os = "linux")]
    fn watch(&self) -> Pin<Box<dyn Stream<Item = LinkEvent> + Send + 'static>> {
        let pending = self
            .pending_socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let opened = match pending {
            Some(socket) => Ok(socket),
            None => watch::open_socket(),
        };

        let socket = match opened {
            Ok(socket) => socket,
            Err(e) => {
                error!("Failed to open netlink socket, link changes will not be seen: {}", e);
                return Box::pin(tokio_stream::empty());
            }
        };

        let (tx, rx) = tokio::sync::mpsc::channel(EVENT_BUFFER);
        tokio::spawn(watch::run(socket, tx));

        Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))
    }

    #[cfg(not(target_os = "linux"))]
    fn watch(&self) -> Pin<Box<dyn Stream<Item = LinkEvent> + Send + 'static>> {
        Box::pin(tokio_stream::empty())
    }

    fn source_name(&self) -> &'static str {
        "netlink"
    }
}

/// Factory for creating kernel link sources
pub struct NetlinkFactory;

#[cfg(target_os = "linux")]
impl LinkSourceFactory for NetlinkFactory {
    fn create(&self, config: &LinkSourceConfig) -> Result<Box<dyn LinkSource>> {
        match config {
            LinkSourceConfig::Netlink => Ok(Box::new(NetlinkLinkSource::new())),
            other => Err(Error::config(format!(
                "Invalid config for netlink link source: {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl LinkSourceFactory for NetlinkFactory {
    fn create(&self, _config: &LinkSourceConfig) -> Result<Box<dyn LinkSource>> {
        Err(Error::config("Netlink link source is only supported on Linux"))
    }
}
