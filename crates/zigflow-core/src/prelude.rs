/*!
 * Prelude module for ZigFlow Core.
 *
 * This module re-exports commonly used types and functions from the ZigFlow Core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{ClusterId, EndpointId, ExtendedAddress, Id, NetworkAddress, ProfileId};

// Re-export config types
pub use crate::config::{
    Config, ConfigBuilder, DiscoveryConfig, DiscoveryMode, DiscoveryModes, SharedConfig,
};

// Re-export utility functions
pub use crate::utils::{with_retry, with_timeout};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
