/*!
 * Device discovery pipeline.
 *
 * Producers find candidate addresses and push them onto a bounded
 * [`DiscoveryQueue`]; a single [`DeviceBuilder`] pops them in order,
 * interrogates each device and registers the result. The
 * [`DiscoveryManager`] owns the tasks and their shutdown.
 *
 * ```text
 *  AnnounceListener ──┐
 *  NetworkBrowser ────┼──> DiscoveryQueue ──> DeviceBuilder ──> DeviceRegistry
 *  LqiNetworkBrowser ─┘
 * ```
 */
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use zigflow_core::types::NetworkAddress;

pub mod announce;
pub mod browser;
pub mod builder;
pub mod lqi;
pub mod manager;
pub mod queue;

pub use announce::AnnounceListener;
pub use browser::NetworkBrowser;
pub use builder::{BuilderStats, DeviceBuilder};
pub use lqi::LqiNetworkBrowser;
pub use manager::{DiscoveryManager, DiscoveryState};
pub use queue::{DiscoveryQueue, PushOutcome};

/// Which producer found a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoverySource {
    /// A device announcement
    Announce,
    /// The transport's address table
    AddressScan,
    /// A neighbor table
    LqiScan,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoverySource::Announce => f.write_str("announce"),
            DiscoverySource::AddressScan => f.write_str("address-scan"),
            DiscoverySource::LqiScan => f.write_str("lqi-scan"),
        }
    }
}

/// An address waiting to be interrogated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryCandidate {
    /// Address to interrogate
    pub network_address: NetworkAddress,
    /// Producer that found it
    pub source: DiscoverySource,
    /// When it was found
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveryCandidate {
    /// Candidate found now
    pub fn new(network_address: NetworkAddress, source: DiscoverySource) -> Self {
        Self {
            network_address,
            source,
            discovered_at: Utc::now(),
        }
    }
}
