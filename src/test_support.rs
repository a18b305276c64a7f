//! In-memory broker used by tests and benches.
//!
//! It models the part of a transactional broker that recovery observes: per-id epochs, the
//! set of open transactions and the topics they touch. Every fencing call bumps the id's
//! epoch and reports the one before the bump, so only an id that was never initialized
//! reports [`Epoch::UNUSED`]. A fencing call that finds an open transaction also aborts it
//! and records the id in [`InMemoryBroker::fenced_ids`].

use crate::broker::{OpenTransactionLister, TransactionAborter};
use crate::error::BrokerError;
use crate::identity::{Epoch, TransactionalId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct BrokerState {
    epochs: HashMap<String, i16>,
    /// Open transaction name to the topic it wrote to; `None` matches every topic.
    open: BTreeMap<String, Option<String>>,
    abort_calls: Vec<String>,
    fenced: Vec<String>,
    aborts_before_failure: Option<usize>,
    fail_listing: bool,
}

/// Thread-safe fake broker implementing both collaborator traits.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a producer initializing `id` and beginning a transaction.
    pub fn open(&self, id: &TransactionalId) {
        self.open_entry(id.as_str(), None);
    }

    /// Open a transaction under `id` that wrote to `topic`.
    pub fn open_on(&self, topic: &str, id: &TransactionalId) {
        self.open_entry(id.as_str(), Some(topic));
    }

    /// Open a transaction under an arbitrary name, e.g. one of another application.
    pub fn open_raw(&self, topic: &str, name: &str) {
        self.open_entry(name, Some(topic));
    }

    fn open_entry(&self, name: &str, topic: Option<&str>) {
        let mut state = self.state.lock();
        let epoch = state.epochs.entry(name.to_string()).or_insert(0);
        *epoch = epoch.saturating_add(1);
        state
            .open
            .insert(name.to_string(), topic.map(str::to_string));
    }

    /// Complete the transaction under `id` without fencing it.
    pub fn commit(&self, id: &TransactionalId) -> bool {
        self.state.lock().open.remove(id.as_str()).is_some()
    }

    /// Let `successes` more abort calls through, then fail every following one.
    pub fn fail_aborts_after(&self, successes: usize) {
        self.state.lock().aborts_before_failure = Some(successes);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().fail_listing = fail;
    }

    pub fn epoch(&self, id: &TransactionalId) -> Epoch {
        Epoch(self.state.lock().epochs.get(id.as_str()).copied().unwrap_or(0))
    }

    pub fn is_open(&self, id: &TransactionalId) -> bool {
        self.state.lock().open.contains_key(id.as_str())
    }

    /// Open transactions that follow the naming scheme, sorted.
    pub fn open_ids(&self) -> Vec<TransactionalId> {
        self.state
            .lock()
            .open
            .keys()
            .filter_map(|name| TransactionalId::parse(name).ok())
            .collect()
    }

    /// Every id passed to `abort`, in call order.
    pub fn abort_calls(&self) -> Vec<TransactionalId> {
        to_ids(&self.state.lock().abort_calls)
    }

    /// Ids whose open transaction was aborted by a fencing call, in call order.
    pub fn fenced_ids(&self) -> Vec<TransactionalId> {
        to_ids(&self.state.lock().fenced)
    }

    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        state.abort_calls.clear();
        state.fenced.clear();
    }
}

fn to_ids(names: &[String]) -> Vec<TransactionalId> {
    names
        .iter()
        .filter_map(|name| TransactionalId::parse(name).ok())
        .collect()
}

impl TransactionAborter for InMemoryBroker {
    fn abort(&self, transactional_id: &TransactionalId) -> Result<Epoch, BrokerError> {
        let mut state = self.state.lock();
        match state.aborts_before_failure {
            Some(0) => {
                return Err(BrokerError::abort(
                    transactional_id.as_str(),
                    "injected broker failure",
                ))
            }
            Some(ref mut remaining) => *remaining -= 1,
            None => {}
        }

        let name = transactional_id.as_str();
        state.abort_calls.push(name.to_string());
        let epoch = state.epochs.entry(name.to_string()).or_insert(0);
        let previous = *epoch;
        *epoch = previous.saturating_add(1);
        if state.open.remove(name).is_some() {
            state.fenced.push(name.to_string());
        }
        Ok(Epoch(previous))
    }
}

impl OpenTransactionLister for InMemoryBroker {
    fn list_open_transactional_ids(&self, topics: &[String]) -> Result<Vec<String>, BrokerError> {
        let state = self.state.lock();
        if state.fail_listing {
            return Err(BrokerError::list(topics, "injected broker failure"));
        }
        Ok(state
            .open
            .iter()
            .filter(|(_, topic)| match topic {
                Some(topic) => topics.iter().any(|t| t == topic),
                None => true,
            })
            .map(|(name, _)| name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fencing_reports_epoch_of_open_transaction() {
        let broker = InMemoryBroker::new();
        let id = TransactionalId::new("app", 0, 0);
        broker.open(&id);
        broker.open(&id);

        assert_eq!(broker.abort(&id).unwrap(), Epoch(2));
        assert_eq!(broker.epoch(&id), Epoch(3));
        assert!(!broker.is_open(&id));
        assert_eq!(broker.abort(&id).unwrap(), Epoch(3));
        assert_eq!(broker.epoch(&id), Epoch(4));
        assert_eq!(broker.fenced_ids(), vec![id]);
    }

    #[test]
    fn unknown_ids_report_unused() {
        let broker = InMemoryBroker::new();
        let id = TransactionalId::new("app", 9, 9);
        assert_eq!(broker.abort(&id).unwrap(), Epoch::UNUSED);
        assert_eq!(broker.abort(&id).unwrap(), Epoch(1));
        assert_eq!(broker.abort_calls(), vec![id.clone(), id]);
        assert!(broker.fenced_ids().is_empty());
    }

    #[test]
    fn listing_filters_by_topic() {
        let broker = InMemoryBroker::new();
        broker.open_on("orders", &TransactionalId::new("app", 0, 1));
        broker.open_on("audit", &TransactionalId::new("app", 0, 2));
        broker.open(&TransactionalId::new("app", 0, 3));

        let listed = broker
            .list_open_transactional_ids(&["orders".to_string()])
            .unwrap();
        assert_eq!(listed, vec!["app-0-1".to_string(), "app-0-3".to_string()]);
    }

    #[test]
    fn injected_failures() {
        let broker = InMemoryBroker::new();
        let id = TransactionalId::new("app", 0, 0);
        broker.fail_aborts_after(1);
        assert!(broker.abort(&id).is_ok());
        assert!(broker.abort(&id).is_err());

        broker.fail_listing(true);
        assert!(broker.list_open_transactional_ids(&[]).is_err());
    }

    #[test]
    fn commit_closes_without_fencing() {
        let broker = InMemoryBroker::new();
        let id = TransactionalId::new("app", 1, 4);
        broker.open(&id);
        assert!(broker.commit(&id));
        assert!(!broker.commit(&id));
        assert_eq!(broker.abort(&id).unwrap(), Epoch(1));
        assert!(broker.fenced_ids().is_empty());
    }
}
