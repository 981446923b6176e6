//! Per-proposal mutation locks

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per proposal id. Holding the guard serializes
/// read-modify-write cycles on that proposal; other proposals are unaffected.
#[derive(Default)]
pub struct ProposalLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProposalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `proposal_id`
    pub async fn acquire(&self, proposal_id: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await
        let lock = self
            .locks
            .entry(proposal_id.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_is_exclusive() {
        let locks = ProposalLocks::new();
        let _guard = locks.acquire("p1").await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire("p1")).await;
        assert!(second.is_err(), "second acquire on the same id should block");
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = ProposalLocks::new();
        let _guard = locks.acquire("p1").await;

        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire("p2")).await;
        assert!(other.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_waiter_wakes_when_guard_dropped() {
        let locks = ProposalLocks::new();
        let guard = tokio_test::block_on(locks.acquire("p1"));

        let mut waiter = tokio_test::task::spawn(locks.acquire("p1"));
        tokio_test::assert_pending!(waiter.poll());

        drop(guard);
        assert!(waiter.is_woken());
        let _second = tokio_test::assert_ready!(waiter.poll());
    }
}
