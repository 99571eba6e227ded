//! Event-driven producer fed by device announcements.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::device::{DeviceError, Result};
use crate::discovery::queue::{DiscoveryQueue, PushOutcome};
use crate::discovery::{DiscoveryCandidate, DiscoverySource};
use crate::transport::{AnnounceEvent, AnnounceSubscription, NetworkTransport};

/// Turns every device announcement into an `Announce` candidate
///
/// The callback runs on the transport's delivery thread, so it only ever
/// uses the non-blocking [`DiscoveryQueue::try_push`].
#[derive(Debug)]
pub struct AnnounceListener {
    transport: Arc<dyn NetworkTransport>,
    queue: Arc<DiscoveryQueue>,
    subscription: Mutex<Option<AnnounceSubscription>>,
}

impl AnnounceListener {
    /// Create an unregistered listener
    pub fn new(transport: Arc<dyn NetworkTransport>, queue: Arc<DiscoveryQueue>) -> Self {
        Self {
            transport,
            queue,
            subscription: Mutex::new(None),
        }
    }

    /// Subscribe to the transport's announce channel
    pub fn register(&self) -> Result<()> {
        let mut subscription = self
            .subscription
            .lock()
            .map_err(|_| DeviceError::Other("announce listener lock poisoned".to_string()))?;
        if subscription.is_some() {
            return Err(DeviceError::InvalidState(
                "announce listener already registered".to_string(),
            ));
        }

        let queue = self.queue.clone();
        let handle = self
            .transport
            .subscribe_announce(Arc::new(move |event: &AnnounceEvent| {
                let candidate = DiscoveryCandidate::new(event.network_address, DiscoverySource::Announce);
                if queue.try_push(candidate) == PushOutcome::Enqueued {
                    debug!(address = %event.network_address, "Queued announced device");
                }
            }))?;
        info!(
            transport = self.transport.name(),
            subscription = handle.id(),
            "Announce listener registered"
        );
        *subscription = Some(handle);
        Ok(())
    }

    /// Drop the subscription; does nothing when not registered
    pub fn unregister(&self) {
        let handle = match self.subscription.lock() {
            Ok(mut subscription) => subscription.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            self.transport.unsubscribe_announce(handle);
            info!(subscription = handle.id(), "Announce listener unregistered");
        }
    }

    /// Whether a subscription is active
    pub fn is_registered(&self) -> bool {
        self.subscription
            .lock()
            .map(|subscription| subscription.is_some())
            .unwrap_or(false)
    }
}
