//! Configuration types for linkd
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::link::DEFAULT_BASE_PATH;

/// Main linkd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkdConfig {
    /// Object paths and transport endpoint
    #[serde(default)]
    pub bus: BusConfig,

    /// Observer delivery settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// How manager summary states are derived from link states
    #[serde(default)]
    pub aggregation: AggregationPolicy,

    /// Where link events come from
    #[serde(default)]
    pub source: LinkSourceConfig,
}

impl LinkdConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.bus.validate()?;
        self.notify.validate()?;
        Ok(())
    }
}

/// Object path and transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Prefix for the manager object path; links live under `<base>/link/`
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Unix socket the daemon listens on
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

impl BusConfig {
    /// Validate the bus configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            return Err(crate::Error::config(format!(
                "Base path must be absolute, got '{}'",
                self.base_path
            )));
        }
        if self.socket_path.is_empty() {
            return Err(crate::Error::config("Socket path cannot be empty"));
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            socket_path: default_socket_path(),
        }
    }
}

/// Observer delivery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Capacity of each observer's event channel
    ///
    /// When an observer's channel is full, new events for that observer are
    /// dropped (with a warning log). Other observers are unaffected.
    ///
    /// Default: 256 events
    #[serde(default = "default_observer_channel_capacity")]
    pub observer_channel_capacity: usize,
}

impl NotifyConfig {
    /// Validate the notification configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.observer_channel_capacity == 0 {
            return Err(crate::Error::config(
                "Observer channel capacity must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            observer_channel_capacity: default_observer_channel_capacity(),
        }
    }
}

/// Summary aggregation rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPolicy {
    /// Most degraded link state wins
    #[default]
    Worst,
    /// Best link state wins
    Best,
}

impl std::str::FromStr for AggregationPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "worst" => Ok(AggregationPolicy::Worst),
            "best" => Ok(AggregationPolicy::Best),
            other => Err(crate::Error::config(format!(
                "Unknown aggregation policy '{}'. Valid policies: worst, best",
                other
            ))),
        }
    }
}

/// Link source configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkSourceConfig {
    /// Kernel rtnetlink events (Linux)
    #[default]
    Netlink,

    /// No detection; the registry only changes through the API
    None,
}

impl LinkSourceConfig {
    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            LinkSourceConfig::Netlink => "netlink",
            LinkSourceConfig::None => "none",
        }
    }
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

fn default_socket_path() -> String {
    "/run/linkd/io.socket".to_string()
}

fn default_observer_channel_capacity() -> usize {
    256
}
