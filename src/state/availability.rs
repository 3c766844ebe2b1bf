use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::warn;

use crate::dao::storage::StorageError;

/// Outcome of [`AvailabilityGuard::start_check`].
pub enum ProbeStatus {
    /// The collection is already known to be absent; do not probe.
    Missing,
    /// Another caller's probe is in flight; await its outcome instead of
    /// issuing a duplicate request. `None` means the probe is still running,
    /// a closed channel means it was abandoned.
    Pending(watch::Receiver<Option<bool>>),
    /// This caller won the probe slot and must resolve the ticket once its
    /// request finishes.
    Probe(ProbeTicket),
}

#[derive(Default)]
struct GuardInner {
    missing: HashSet<String>,
    in_flight: HashMap<String, watch::Sender<Option<bool>>>,
}

/// Circuit breaker tracking which remote collections are known absent, and
/// deduplicating concurrent existence probes so at most one real request per
/// collection is ever in flight.
///
/// Owned by [`AppState`](super::AppState) and constructed per instance so
/// tests get independent registries; entries live until process restart.
#[derive(Clone, Default)]
pub struct AvailabilityGuard {
    inner: Arc<Mutex<GuardInner>>,
}

impl AvailabilityGuard {
    /// Create an empty guard: every collection is presumed available.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True unless the collection has been marked missing.
    pub fn is_available(&self, collection: &str) -> bool {
        !self.lock().missing.contains(collection)
    }

    /// Claim the probe slot for `collection`, or learn why it cannot be
    /// claimed. Concurrent callers for the same unresolved name all receive
    /// the same completion handle.
    pub fn start_check(&self, collection: &str) -> ProbeStatus {
        let mut inner = self.lock();
        if inner.missing.contains(collection) {
            return ProbeStatus::Missing;
        }
        if let Some(tx) = inner.in_flight.get(collection) {
            return ProbeStatus::Pending(tx.subscribe());
        }

        let (tx, _rx) = watch::channel(None);
        inner.in_flight.insert(collection.to_owned(), tx);
        ProbeStatus::Probe(ProbeTicket {
            inner: Arc::clone(&self.inner),
            collection: collection.to_owned(),
            resolved: false,
        })
    }

    /// Permanently (for this process) record the collection as absent and
    /// release any in-flight probe handle.
    pub fn mark_missing(&self, collection: &str) {
        let mut inner = self.lock();
        if inner.missing.insert(collection.to_owned()) {
            warn!(collection, "remote collection marked missing; using local fallback from now on");
        }
        if let Some(tx) = inner.in_flight.remove(collection) {
            let _ = tx.send(Some(false));
        }
    }

    /// Classify a backend error as "collection absent" versus any other
    /// failure. Only absent collections feed [`Self::mark_missing`].
    pub fn is_missing_error(err: &StorageError) -> bool {
        err.is_missing()
    }
}

/// Resolver handed to the single caller allowed to probe a collection.
///
/// Dropping the ticket without resolving clears the in-flight slot so a later
/// caller may retry; waiters observe the closed channel.
pub struct ProbeTicket {
    inner: Arc<Mutex<GuardInner>>,
    collection: String,
    resolved: bool,
}

impl ProbeTicket {
    /// Report the probe outcome, waking every waiter. `available = false`
    /// marks the collection missing for the rest of the process lifetime.
    pub fn resolve(mut self, available: bool) {
        self.resolved = true;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !available && inner.missing.insert(self.collection.clone()) {
            warn!(collection = %self.collection, "probe found collection missing");
        }
        if let Some(tx) = inner.in_flight.remove(&self.collection) {
            let _ = tx.send(Some(available));
        }
    }
}

impl Drop for ProbeTicket {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Abandoned probe: free the slot without deciding availability.
        inner.in_flight.remove(&self.collection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collections_start_available() {
        let guard = AvailabilityGuard::new();
        assert!(guard.is_available("event_scores"));
    }

    #[test]
    fn mark_missing_is_permanent_and_idempotent() {
        let guard = AvailabilityGuard::new();
        guard.mark_missing("achievements");
        guard.mark_missing("achievements");
        assert!(!guard.is_available("achievements"));
        assert!(matches!(guard.start_check("achievements"), ProbeStatus::Missing));
    }

    #[test]
    fn only_one_probe_ticket_per_collection() {
        let guard = AvailabilityGuard::new();

        let first = guard.start_check("event_scores");
        let ProbeStatus::Probe(ticket) = first else {
            panic!("first caller should win the probe slot");
        };

        for _ in 0..8 {
            assert!(matches!(
                guard.start_check("event_scores"),
                ProbeStatus::Pending(_)
            ));
        }

        ticket.resolve(true);
        assert!(guard.is_available("event_scores"));
        // Slot is free again once resolved.
        assert!(matches!(guard.start_check("event_scores"), ProbeStatus::Probe(_)));
    }

    #[test]
    fn resolving_unavailable_marks_missing() {
        let guard = AvailabilityGuard::new();
        let ProbeStatus::Probe(ticket) = guard.start_check("event_history") else {
            panic!("expected probe ticket");
        };
        ticket.resolve(false);
        assert!(!guard.is_available("event_history"));
    }

    #[tokio::test]
    async fn waiters_share_the_probe_outcome() {
        let guard = AvailabilityGuard::new();
        let ProbeStatus::Probe(ticket) = guard.start_check("event_scores") else {
            panic!("expected probe ticket");
        };
        let ProbeStatus::Pending(mut rx) = guard.start_check("event_scores") else {
            panic!("expected pending handle");
        };

        let waiter = tokio::spawn(async move {
            rx.wait_for(|outcome| outcome.is_some())
                .await
                .map(|outcome| (*outcome).unwrap_or(false))
        });

        ticket.resolve(true);
        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn dropped_ticket_frees_the_slot() {
        let guard = AvailabilityGuard::new();
        let ProbeStatus::Probe(ticket) = guard.start_check("event_scores") else {
            panic!("expected probe ticket");
        };
        let ProbeStatus::Pending(mut rx) = guard.start_check("event_scores") else {
            panic!("expected pending handle");
        };

        drop(ticket);

        // The watch sender is gone; waiters see the channel close.
        assert!(rx.wait_for(|outcome| outcome.is_some()).await.is_err());
        assert!(matches!(guard.start_check("event_scores"), ProbeStatus::Probe(_)));
    }

    #[tokio::test]
    async fn concurrent_start_checks_yield_one_ticket() {
        let guard = AvailabilityGuard::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move { guard.start_check("event_scores") }));
        }

        // Keep every returned status alive while counting so a winner's
        // ticket cannot drop and free the slot mid-test.
        let mut statuses = Vec::new();
        for handle in handles {
            statuses.push(handle.await.unwrap());
        }
        let winners = statuses
            .iter()
            .filter(|status| matches!(status, ProbeStatus::Probe(_)))
            .count();
        assert_eq!(winners, 1);
    }
}
