/*!
 * Bounded work queue between the discovery producers and the builder.
 *
 * Closing the queue stops intake but not delivery: entries already queued
 * are still popped in FIFO order, after which [`DiscoveryQueue::pop`]
 * returns `None`.
 */
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::discovery::DiscoveryCandidate;

/// Result of offering a candidate to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The candidate was queued
    Enqueued,
    /// The same address from the same source is already waiting
    Duplicate,
    /// The queue was full (non-blocking push only)
    Full,
    /// The queue is closed
    Closed,
}

impl PushOutcome {
    /// Whether the candidate was queued
    pub fn is_enqueued(self) -> bool {
        self == PushOutcome::Enqueued
    }
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<DiscoveryCandidate>,
    closed: bool,
}

impl QueueState {
    fn holds(&self, candidate: &DiscoveryCandidate) -> bool {
        self.items.iter().any(|queued| {
            queued.network_address == candidate.network_address
                && queued.source == candidate.source
        })
    }
}

/// Closable bounded FIFO of discovery candidates
#[derive(Debug)]
pub struct DiscoveryQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Notify,
    not_full: Notify,
}

impl DiscoveryQueue {
    /// Create a queue holding at most `capacity` candidates (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn offer(&self, state: &mut QueueState, candidate: DiscoveryCandidate) -> Option<PushOutcome> {
        if state.closed {
            debug!(address = %candidate.network_address, "Queue closed, dropping candidate");
            return Some(PushOutcome::Closed);
        }
        if state.holds(&candidate) {
            debug!(
                address = %candidate.network_address,
                source = %candidate.source,
                "Candidate already queued"
            );
            return Some(PushOutcome::Duplicate);
        }
        if state.items.len() >= self.capacity {
            return None;
        }
        state.items.push_back(candidate);
        Some(PushOutcome::Enqueued)
    }

    /// Queue a candidate, waiting for room while the queue is full
    ///
    /// Returns immediately with [`PushOutcome::Closed`] once the queue is closed,
    /// including when the close happens while waiting.
    pub async fn push(&self, candidate: DiscoveryCandidate) -> PushOutcome {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(outcome) = self.offer(&mut state, candidate.clone()) {
                    drop(state);
                    if outcome.is_enqueued() {
                        self.not_empty.notify_one();
                    }
                    return outcome;
                }
            }

            notified.await;
        }
    }

    /// Queue a candidate without waiting; a full queue drops it
    pub fn try_push(&self, candidate: DiscoveryCandidate) -> PushOutcome {
        let address = candidate.network_address;
        let outcome = {
            let mut state = self.lock();
            self.offer(&mut state, candidate)
        };
        match outcome {
            Some(outcome) => {
                if outcome.is_enqueued() {
                    self.not_empty.notify_one();
                }
                outcome
            }
            None => {
                warn!(address = %address, capacity = self.capacity, "Queue full, dropping candidate");
                PushOutcome::Full
            }
        }
    }

    /// Take the oldest candidate, waiting while the queue is empty
    ///
    /// Returns `None` only when the queue is closed and drained.
    pub async fn pop(&self) -> Option<DiscoveryCandidate> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(candidate) = state.items.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(candidate);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stop accepting candidates and wake every waiter; idempotent
    pub fn close(&self) {
        let newly_closed = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if newly_closed {
            debug!("Discovery queue closed");
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Discard every queued candidate without closing; returns how many were dropped
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut state = self.lock();
            let dropped = state.items.len();
            state.items.clear();
            dropped
        };
        if dropped > 0 {
            self.not_full.notify_waiters();
        }
        dropped
    }

    /// Number of queued candidates
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue was closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Maximum number of queued candidates
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::join_all;
    use tokio_test::{assert_pending, assert_ready, task};
    use zigflow_core::types::NetworkAddress;

    use crate::discovery::DiscoverySource;

    fn candidate(address: u16, source: DiscoverySource) -> DiscoveryCandidate {
        DiscoveryCandidate::new(NetworkAddress(address), source)
    }

    #[tokio::test]
    async fn test_drain_on_close() {
        let queue = DiscoveryQueue::new(8);
        for address in [0x10, 0x20, 0x30] {
            assert_eq!(
                queue.push(candidate(address, DiscoverySource::AddressScan)).await,
                PushOutcome::Enqueued
            );
        }
        queue.close();

        let mut drained = Vec::new();
        while let Some(c) = queue.pop().await {
            drained.push(c.network_address.raw());
        }
        assert_eq!(drained, vec![0x10, 0x20, 0x30]);
        assert_eq!(queue.pop().await, None);
        assert_eq!(
            queue.push(candidate(0x40, DiscoverySource::Announce)).await,
            PushOutcome::Closed
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_wakes_pop() {
        let queue = Arc::new(DiscoveryQueue::new(4));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.close();
        queue.close();
        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("pop stayed blocked after close")
            .unwrap();
        assert_eq!(popped, None);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_push_waits_for_room() {
        let queue = DiscoveryQueue::new(1);
        assert_eq!(
            queue.try_push(candidate(1, DiscoverySource::LqiScan)),
            PushOutcome::Enqueued
        );
        assert_eq!(queue.try_push(candidate(2, DiscoverySource::LqiScan)), PushOutcome::Full);

        let mut push = task::spawn(queue.push(candidate(2, DiscoverySource::LqiScan)));
        assert_pending!(push.poll());

        let mut pop = task::spawn(queue.pop());
        let first = assert_ready!(pop.poll());
        assert_eq!(first.map(|c| c.network_address), Some(NetworkAddress(1)));

        assert!(push.is_woken());
        assert_eq!(assert_ready!(push.poll()), PushOutcome::Enqueued);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_close_releases_blocked_push() {
        let queue = DiscoveryQueue::new(1);
        queue.try_push(candidate(1, DiscoverySource::AddressScan));

        let mut push = task::spawn(queue.push(candidate(2, DiscoverySource::AddressScan)));
        assert_pending!(push.poll());
        queue.close();
        assert!(push.is_woken());
        assert_eq!(assert_ready!(push.poll()), PushOutcome::Closed);
    }

    #[test]
    fn test_duplicates_suppressed_per_source() {
        let queue = DiscoveryQueue::new(8);
        assert!(queue.try_push(candidate(7, DiscoverySource::Announce)).is_enqueued());
        assert_eq!(
            queue.try_push(candidate(7, DiscoverySource::Announce)),
            PushOutcome::Duplicate
        );
        assert!(queue.try_push(candidate(7, DiscoverySource::AddressScan)).is_enqueued());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert!(!queue.is_closed());
        assert!(queue.try_push(candidate(7, DiscoverySource::Announce)).is_enqueued());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_lose_nothing() {
        const PER_PRODUCER: u16 = 50;
        let queue = Arc::new(DiscoveryQueue::new(4));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(c) = queue.pop().await {
                    seen.push(c);
                }
                seen
            })
        };

        let producers = [
            DiscoverySource::Announce,
            DiscoverySource::AddressScan,
            DiscoverySource::LqiScan,
        ]
        .into_iter()
        .enumerate()
        .map(|(index, source)| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let base = (index as u16 + 1) * 0x1000;
                for offset in 0..PER_PRODUCER {
                    let outcome = queue.push(candidate(base + offset, source)).await;
                    assert_eq!(outcome, PushOutcome::Enqueued);
                }
            })
        });
        for result in join_all(producers).await {
            result.unwrap();
        }
        queue.close();

        let seen = consumer.await.unwrap();
        assert_eq!(seen.len(), 3 * PER_PRODUCER as usize);
        for source in [
            DiscoverySource::Announce,
            DiscoverySource::AddressScan,
            DiscoverySource::LqiScan,
        ] {
            let order: Vec<u16> = seen
                .iter()
                .filter(|c| c.source == source)
                .map(|c| c.network_address.raw() & 0x0FFF)
                .collect();
            assert_eq!(order, (0..PER_PRODUCER).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_try_push_from_driver_threads() {
        const PER_THREAD: u16 = 40;
        let queue = Arc::new(DiscoveryQueue::new(256));

        let threads: Vec<_> = (0..3u16)
            .map(|index| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    let base = (index + 1) * 0x1000;
                    for offset in 0..PER_THREAD {
                        let outcome = queue.try_push(candidate(base + offset, DiscoverySource::Announce));
                        assert_eq!(outcome, PushOutcome::Enqueued);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        queue.close();

        let mut seen = Vec::new();
        while let Some(c) = queue.pop().await {
            seen.push(c.network_address.raw());
        }
        assert_eq!(seen.len(), 3 * PER_THREAD as usize);
        for index in 1..=3u16 {
            let order: Vec<u16> = seen
                .iter()
                .filter(|a| *a >> 12 == index)
                .map(|a| a & 0x0FFF)
                .collect();
            assert_eq!(order, (0..PER_THREAD).collect::<Vec<_>>());
        }
    }
}
