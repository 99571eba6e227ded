/*!
 * Lifecycle of the discovery pipeline.
 *
 * [`DiscoveryManager::startup`] starts the enabled producers as tasks of
 * one [`JoinSet`] and the builder as its own task.
 * [`DiscoveryManager::shutdown`] stops them in order: announce listener,
 * producers, builder, queue. Producers get the configured grace period and
 * are aborted after it. The builder is always joined; every transport call
 * it makes is bounded by the command timeout, so it finishes the device in
 * hand and exits.
 */
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use zigflow_core::config::{DiscoveryConfig, DiscoveryMode};
use zigflow_core::logging::component_span;

use crate::device::{DeviceError, Result};
use crate::discovery::announce::AnnounceListener;
use crate::discovery::browser::NetworkBrowser;
use crate::discovery::builder::{BuilderStats, DeviceBuilder};
use crate::discovery::lqi::LqiNetworkBrowser;
use crate::discovery::queue::DiscoveryQueue;
use crate::registry::SharedDeviceRegistry;
use crate::transport::NetworkTransport;
use crate::zcl::client::ClusterClient;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Constructed, not started
    Created,
    /// Tasks are running
    Running,
    /// Shut down; cannot be restarted
    Stopped,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryState::Created => f.write_str("created"),
            DiscoveryState::Running => f.write_str("running"),
            DiscoveryState::Stopped => f.write_str("stopped"),
        }
    }
}

struct ManagerInner {
    state: DiscoveryState,
    enabled: Vec<DiscoveryMode>,
    producers: JoinSet<(DiscoveryMode, usize)>,
    builder: Option<JoinHandle<BuilderStats>>,
    announce: Option<AnnounceListener>,
    builder_stats: Option<BuilderStats>,
}

/// Owns the discovery producers, the builder and their shutdown
pub struct DiscoveryManager {
    config: DiscoveryConfig,
    client: Arc<ClusterClient>,
    queue: Arc<DiscoveryQueue>,
    registry: SharedDeviceRegistry,
    producer_cancel: CancellationToken,
    builder_cancel: CancellationToken,
    inner: Mutex<ManagerInner>,
}

impl fmt::Debug for DiscoveryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryManager")
            .field("state", &self.state())
            .field("queue", &self.queue)
            .finish()
    }
}

impl DiscoveryManager {
    /// Create a manager; nothing runs until [`startup`](Self::startup)
    pub fn new(
        transport: Arc<dyn NetworkTransport>,
        registry: SharedDeviceRegistry,
        config: DiscoveryConfig,
    ) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(ClusterClient::new(transport, config.command_timeout()));
        let queue = Arc::new(DiscoveryQueue::new(config.queue_capacity));
        Ok(Self {
            config,
            client,
            queue,
            registry,
            producer_cancel: CancellationToken::new(),
            builder_cancel: CancellationToken::new(),
            inner: Mutex::new(ManagerInner {
                state: DiscoveryState::Created,
                enabled: Vec::new(),
                producers: JoinSet::new(),
                builder: None,
                announce: None,
                builder_stats: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ManagerInner> {
        match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start the enabled producers and the builder
    ///
    /// Must be called from within a Tokio runtime; outside one it fails with
    /// [`DeviceError::InvalidState`] and the manager stays startable. A
    /// producer that fails to start is logged and left out; the others still
    /// start.
    pub fn startup(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            DiscoveryState::Created => {}
            state => {
                return Err(DeviceError::InvalidState(format!(
                    "discovery cannot start while {}",
                    state
                )))
            }
        }

        if Handle::try_current().is_err() {
            return Err(DeviceError::InvalidState(
                "discovery must start inside a Tokio runtime".to_string(),
            ));
        }

        let cleared = self.queue.clear();
        if cleared > 0 {
            debug!(cleared, "Discarded stale candidates");
        }

        let requested = self.config.enabled_modes();
        info!(modes = ?requested, "Starting discovery");

        for mode in requested {
            match mode {
                DiscoveryMode::Announce => {
                    let listener = AnnounceListener::new(self.client.transport().clone(), self.queue.clone());
                    match listener.register() {
                        Ok(()) => inner.announce = Some(listener),
                        Err(e) => {
                            warn!("Announce listener failed to start: {}", e);
                            continue;
                        }
                    }
                }
                DiscoveryMode::Addressing => {
                    let browser = NetworkBrowser::new(
                        self.client.clone(),
                        self.queue.clone(),
                        self.registry.clone(),
                        self.config.skip_coordinator,
                    );
                    let cancel = self.producer_cancel.clone();
                    inner.producers.spawn(
                        async move { (mode, browser.run(cancel).await) }
                            .instrument(component_span("network_browser", None)),
                    );
                }
                DiscoveryMode::LinkQuality => {
                    let browser = LqiNetworkBrowser::new(
                        self.client.clone(),
                        self.queue.clone(),
                        self.registry.clone(),
                        self.config.min_link_quality,
                        self.config.max_lqi_depth,
                        self.config.skip_coordinator,
                    );
                    let cancel = self.producer_cancel.clone();
                    inner.producers.spawn(
                        async move { (mode, browser.run(cancel).await) }
                            .instrument(component_span("lqi_network_browser", None)),
                    );
                }
            }
            inner.enabled.push(mode);
        }

        let builder = DeviceBuilder::new(
            self.client.clone(),
            self.queue.clone(),
            self.registry.clone(),
        );
        let cancel = self.builder_cancel.clone();
        inner.builder = Some(tokio::spawn(
            async move { builder.run(cancel).await }
                .instrument(component_span("device_builder", None)),
        ));

        inner.state = DiscoveryState::Running;
        info!(modes = ?inner.enabled, "Discovery running");
        Ok(())
    }

    /// Stop everything; safe to call in any state and more than once
    pub async fn shutdown(&self) {
        let (mut producers, builder, announce) = {
            let mut inner = self.lock();
            match inner.state {
                DiscoveryState::Stopped => {
                    debug!("Discovery already stopped");
                    return;
                }
                DiscoveryState::Created => {
                    inner.state = DiscoveryState::Stopped;
                    self.queue.close();
                    return;
                }
                DiscoveryState::Running => {}
            }
            inner.state = DiscoveryState::Stopped;
            (
                std::mem::take(&mut inner.producers),
                inner.builder.take(),
                inner.announce.take(),
            )
        };
        info!("Stopping discovery");

        if let Some(listener) = announce {
            listener.unregister();
        }
        self.producer_cancel.cancel();
        self.builder_cancel.cancel();
        self.queue.close();

        let deadline = Instant::now() + self.config.shutdown_grace();
        loop {
            match timeout_at(deadline, producers.join_next()).await {
                Ok(Some(Ok((mode, queued)))) => {
                    debug!(mode = %mode, queued, "Producer finished");
                }
                Ok(Some(Err(e))) if e.is_panic() => warn!("Producer panicked: {}", e),
                Ok(Some(Err(_))) => {}
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = producers.len(),
                        "Producers did not stop within {:?}, aborting",
                        self.config.shutdown_grace()
                    );
                    producers.shutdown().await;
                    break;
                }
            }
        }

        let builder_stats = match builder {
            Some(handle) => match handle.await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("Device builder did not finish cleanly: {}", e);
                    None
                }
            },
            None => None,
        };

        self.lock().builder_stats = builder_stats;
        info!("Discovery stopped");
    }

    /// Current lifecycle state
    pub fn state(&self) -> DiscoveryState {
        self.lock().state
    }

    /// Modes that actually started
    pub fn enabled_modes(&self) -> Vec<DiscoveryMode> {
        self.lock().enabled.clone()
    }

    /// Builder counters, available once shutdown joined the builder
    pub fn builder_stats(&self) -> Option<BuilderStats> {
        self.lock().builder_stats
    }

    /// The work queue
    pub fn queue(&self) -> &Arc<DiscoveryQueue> {
        &self.queue
    }

    /// The registry devices are registered into
    pub fn registry(&self) -> &SharedDeviceRegistry {
        &self.registry
    }

    /// The command client, for building proxies over discovered devices
    pub fn client(&self) -> &Arc<ClusterClient> {
        &self.client
    }
}
