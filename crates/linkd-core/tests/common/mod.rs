//! Test doubles and common utilities for registry contract tests
//!
//! This module provides minimal test doubles that observe the registry
//! from the outside without implementing real link detection.

#![allow(dead_code)]

use linkd_core::error::Result;
use linkd_core::notify::{DeliveryError, Observer, ObserverDispatcher, PropertiesChanged, Scope};
use linkd_core::traits::{LinkEvent, LinkInfo, LinkSource};
use linkd_core::{LinkRegistry, ResourcePaths};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// An observer that records every event it receives
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PropertiesChanged>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All events received so far
    pub fn events(&self) -> Vec<PropertiesChanged> {
        self.events.lock().unwrap().clone()
    }

    /// Events about the manager object
    pub fn manager_events(&self) -> Vec<PropertiesChanged> {
        self.events()
            .into_iter()
            .filter(|e| e.scope == Scope::Manager)
            .collect()
    }

    /// Events about one link
    pub fn link_events(&self, index: i32) -> Vec<PropertiesChanged> {
        self.events()
            .into_iter()
            .filter(|e| e.scope == Scope::Link(index))
            .collect()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Observer for RecordingObserver {
    fn deliver(&self, event: &PropertiesChanged) -> std::result::Result<(), DeliveryError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A registry wired to an observer dispatcher with one recording observer
pub fn observed_registry() -> (Arc<LinkRegistry>, Arc<RecordingObserver>) {
    let dispatcher = Arc::new(ObserverDispatcher::new(ResourcePaths::default(), 64));
    let observer = RecordingObserver::new();
    dispatcher.register(observer.clone());

    let registry = Arc::new(LinkRegistry::new(dispatcher));
    (registry, observer)
}

/// A controlled LinkSource that can emit events on demand
pub struct ControlledLinkSource {
    /// Receiver for the monitor's watch stream
    monitor_rx: Mutex<Option<mpsc::UnboundedReceiver<LinkEvent>>>,
    /// Links to report from current()
    initial: Vec<LinkInfo>,
    /// Call counter for current()
    current_call_count: Arc<AtomicUsize>,
}

impl ControlledLinkSource {
    /// Create a new controlled link source
    pub fn new(initial: Vec<LinkInfo>) -> (Self, mpsc::UnboundedSender<LinkEvent>) {
        let (test_tx, monitor_rx) = mpsc::unbounded_channel();

        let source = Self {
            monitor_rx: Mutex::new(Some(monitor_rx)),
            initial,
            current_call_count: Arc::new(AtomicUsize::new(0)),
        };

        (source, test_tx)
    }

    /// Shared counter of current() calls
    pub fn current_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.current_call_count)
    }
}

#[async_trait::async_trait]
impl LinkSource for ControlledLinkSource {
    async fn current(&self) -> Result<Vec<LinkInfo>> {
        self.current_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.initial.clone())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = LinkEvent> + Send + 'static>> {
        // Take the receiver (only called once)
        let rx = self
            .monitor_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "controlled"
    }
}

/// A link source that never emits events (for idle testing)
pub struct IdleLinkSource;

#[async_trait::async_trait]
impl LinkSource for IdleLinkSource {
    async fn current(&self) -> Result<Vec<LinkInfo>> {
        Ok(Vec::new())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = LinkEvent> + Send + 'static>> {
        Box::pin(tokio_stream::pending())
    }

    fn source_name(&self) -> &'static str {
        "idle"
    }
}

/// Give spawned tasks a moment to drain their queues
pub async fn settle() {
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
}
