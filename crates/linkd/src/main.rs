// # linkd - Network Link Registry Daemon
//
// This daemon is a thin integration layer. All registry, aggregation and
// query logic lives in linkd-core.
//
// The linkd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the registry, link source and query handler together
// 4. Serving queries on a Unix socket until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `LINKD_BASE_PATH`: Resource path prefix (default `/org/freedesktop/network1`)
// - `LINKD_SOCKET_PATH`: Query socket (default `/run/linkd/io.socket`)
// - `LINKD_OBSERVER_CAPACITY`: Per-subscriber event queue size (default 256)
// - `LINKD_AGGREGATION`: Manager summary policy (worst, best)
// - `LINKD_LINK_SOURCE`: Detection subsystem (netlink, none)
// - `LINKD_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export LINKD_SOCKET_PATH=/run/linkd/io.socket
// export LINKD_AGGREGATION=worst
//
// linkd
// ```

#[cfg(unix)]
mod transport;

use anyhow::Result;
use linkd_core::config::{AggregationPolicy, LinkSourceConfig, LinkdConfig};
use linkd_core::traits::LinkSource;
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long shutdown may take before the daemon gives up waiting
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum LinkdExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<LinkdExitCode> for ExitCode {
    fn from(code: LinkdExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration as read from the environment
struct Config {
    base_path: Option<String>,
    socket_path: Option<String>,
    observer_capacity: Option<String>,
    aggregation: Option<String>,
    link_source: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self {
            base_path: env::var("LINKD_BASE_PATH").ok(),
            socket_path: env::var("LINKD_SOCKET_PATH").ok(),
            observer_capacity: env::var("LINKD_OBSERVER_CAPACITY").ok(),
            aggregation: env::var("LINKD_AGGREGATION").ok(),
            link_source: env::var("LINKD_LINK_SOURCE").ok(),
            log_level: env::var("LINKD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Build and validate the library configuration
    ///
    /// Unset variables keep the library defaults.
    fn to_linkd_config(&self) -> Result<LinkdConfig> {
        let mut config = LinkdConfig::new();

        if let Some(base_path) = &self.base_path {
            config.bus.base_path = base_path.clone();
        }

        if let Some(socket_path) = &self.socket_path {
            config.bus.socket_path = socket_path.clone();
        }

        if let Some(capacity) = &self.observer_capacity {
            config.notify.observer_channel_capacity = capacity.parse().map_err(|_| {
                anyhow::anyhow!(
                    "LINKD_OBSERVER_CAPACITY must be a positive integer. Got: {}",
                    capacity
                )
            })?;
        }

        if let Some(aggregation) = &self.aggregation {
            config.aggregation = aggregation.parse::<AggregationPolicy>()?;
        }

        if let Some(source) = &self.link_source {
            config.source = match source.to_lowercase().as_str() {
                "netlink" => LinkSourceConfig::Netlink,
                "none" => LinkSourceConfig::None,
                _ => anyhow::bail!(
                    "LINKD_LINK_SOURCE '{}' is not supported. \
                    Supported sources: netlink, none",
                    source
                ),
            };
        }

        config.validate()?;
        Ok(config)
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "LINKD_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    let env_config = Config::from_env();

    let (config, log_level) = match env_config
        .to_linkd_config()
        .and_then(|config| Ok((config, env_config.log_level()?)))
    {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return LinkdExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return LinkdExitCode::ConfigError.into();
    }

    info!("Starting linkd daemon");
    info!(
        "Configuration loaded: source={}, aggregation={:?}, socket={}",
        config.source.type_name(),
        config.aggregation,
        config.bus.socket_path
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return LinkdExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = daemon::run(config).await {
            error!("Daemon error: {:#}", e);
            LinkdExitCode::RuntimeError
        } else {
            LinkdExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Build the configured detection subsystem, if any
fn create_link_source(config: &LinkSourceConfig) -> Result<Option<Box<dyn LinkSource>>> {
    match config {
        LinkSourceConfig::None => Ok(None),

        #[cfg(feature = "netlink")]
        LinkSourceConfig::Netlink => {
            use linkd_core::traits::LinkSourceFactory;
            Ok(Some(linkd_netlink::NetlinkFactory.create(config)?))
        }

        #[cfg(not(feature = "netlink"))]
        LinkSourceConfig::Netlink => {
            anyhow::bail!("LINKD_LINK_SOURCE=netlink requires linkd built with the 'netlink' feature")
        }
    }
}

#[cfg(unix)]
mod daemon {
    use super::*;
    use anyhow::Context;
    use linkd_core::monitor::{LinkMonitor, MonitorEvent};
    use linkd_core::notify::ObserverDispatcher;
    use linkd_core::query::QueryHandler;
    use linkd_core::registry::LinkRegistry;
    use linkd_core::link::ResourcePaths;
    use std::sync::Arc;
    use tokio::sync::{mpsc, oneshot, watch};
    use tokio::task::JoinHandle;
    use tracing::{debug, warn};

    use crate::transport::Server;

    type MonitorTask = (oneshot::Sender<()>, JoinHandle<linkd_core::Result<()>>);

    /// Run the daemon until a shutdown signal arrives
    pub async fn run(config: LinkdConfig) -> Result<()> {
        let paths = ResourcePaths::new(config.bus.base_path.clone());
        let dispatcher = Arc::new(ObserverDispatcher::new(
            paths.clone(),
            config.notify.observer_channel_capacity,
        ));

        let registry = LinkRegistry::from_config(&config, dispatcher.clone());

        // Name lookups follow the same identity source as the monitor
        #[cfg(feature = "netlink")]
        let registry = if config.source == LinkSourceConfig::Netlink {
            registry.with_name_resolver(Arc::new(linkd_netlink::SystemNameResolver))
        } else {
            registry
        };

        let registry = Arc::new(registry);

        // Populate the registry before accepting queries
        let monitor = match create_link_source(&config.source)? {
            Some(source) => Some(
                start_monitor(
                    source,
                    Arc::clone(&registry),
                    config.notify.observer_channel_capacity,
                )
                .await?,
            ),
            None => {
                info!("No link source configured, registry starts empty");
                None
            }
        };

        let handler = QueryHandler::new(Arc::clone(&registry), paths);
        let server = Server::bind(&config.bus.socket_path, handler, dispatcher)
            .with_context(|| format!("Failed to bind {}", config.bus.socket_path))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server_task = tokio::spawn(server.run(shutdown_rx));

        info!("Daemon initialized successfully, {} link(s) known", registry.len());

        let signal = wait_for_shutdown().await?;
        info!("Received shutdown signal: {}", signal);

        let _ = shutdown_tx.send(true);

        let stopped = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            if let Some((monitor_shutdown, monitor_task)) = monitor {
                debug!("Stopping link monitor");
                let _ = monitor_shutdown.send(());
                match monitor_task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Link monitor stopped with error: {}", e),
                    Err(e) => warn!("Link monitor task failed: {}", e),
                }
            }
            if let Err(e) = server_task.await {
                warn!("Server task failed: {}", e);
            }
        })
        .await;

        if stopped.is_err() {
            anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT);
        }

        info!("Shutting down daemon");
        Ok(())
    }

    /// Spawn the monitor and wait until the initial link set is loaded
    async fn start_monitor(
        source: Box<dyn LinkSource>,
        registry: Arc<LinkRegistry>,
        event_capacity: usize,
    ) -> Result<MonitorTask> {
        info!("Starting {} link source", source.source_name());

        let (monitor, mut events) = LinkMonitor::new(source, registry, event_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let mut task = tokio::spawn(async move { monitor.run_with_shutdown(Some(shutdown_rx)).await });

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(MonitorEvent::Started { links_count }) => {
                        info!("Link monitor started with {} link(s)", links_count);
                        break;
                    }
                    Some(event) => debug!("Monitor event: {:?}", event),
                    None => anyhow::bail!("Link monitor stopped during startup"),
                },

                joined = &mut task => {
                    return match joined {
                        Ok(Ok(())) => Err(anyhow::anyhow!("Link monitor exited during startup")),
                        Ok(Err(e)) => Err(e.into()),
                        Err(e) => Err(anyhow::anyhow!("Link monitor task failed: {}", e)),
                    };
                }
            }
        }

        tokio::spawn(log_monitor_events(events));
        Ok((shutdown_tx, task))
    }

    async fn log_monitor_events(mut events: mpsc::Receiver<MonitorEvent>) {
        while let Some(event) = events.recv().await {
            debug!("Monitor event: {:?}", event);
        }
    }

    /// Wait for SIGTERM or SIGINT
    async fn wait_for_shutdown() -> Result<&'static str> {
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

        Ok(tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        })
    }
}

#[cfg(not(unix))]
mod daemon {
    use super::*;

    pub async fn run(_config: LinkdConfig) -> Result<()> {
        anyhow::bail!("linkd serves queries on a Unix socket and requires a Unix platform")
    }
}
