//! # Broker Collaborators
//!
//! The recovery code never talks to the network itself. It goes through two narrow
//! traits that a client layer implements:
//!
//! - [`TransactionAborter`] fences one transactional id.
//! - [`OpenTransactionLister`] reports the ids with open transactions (listing only).
//!
//! Retry and backoff, if wanted, belong to the implementations.

use crate::error::BrokerError;
use crate::identity::{Epoch, TransactionalId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Fences a transactional id on the broker.
///
/// Implementations run a fencing transaction initialization, which aborts whatever
/// transaction is open under the id and bumps its epoch. They return the epoch from
/// before the bump, so [`Epoch::UNUSED`] tells the caller the id had never been opened.
/// Calling this for an id the broker has never seen must succeed.
pub trait TransactionAborter: Send + Sync {
    fn abort(&self, transactional_id: &TransactionalId) -> Result<Epoch, BrokerError>;
}

impl<T: TransactionAborter + ?Sized> TransactionAborter for &T {
    fn abort(&self, transactional_id: &TransactionalId) -> Result<Epoch, BrokerError> {
        (**self).abort(transactional_id)
    }
}

impl<T: TransactionAborter + ?Sized> TransactionAborter for std::sync::Arc<T> {
    fn abort(&self, transactional_id: &TransactionalId) -> Result<Epoch, BrokerError> {
        (**self).abort(transactional_id)
    }
}

/// Broker introspection of open transactions.
pub trait OpenTransactionLister: Send + Sync {
    /// Raw names of transactional ids with an open transaction touching `topics`.
    ///
    /// Names are returned unparsed: the broker is shared, and other applications may use
    /// ids that do not follow this crate's scheme.
    fn list_open_transactional_ids(&self, topics: &[String]) -> Result<Vec<String>, BrokerError>;
}

impl<T: OpenTransactionLister + ?Sized> OpenTransactionLister for &T {
    fn list_open_transactional_ids(&self, topics: &[String]) -> Result<Vec<String>, BrokerError> {
        (**self).list_open_transactional_ids(topics)
    }
}

impl<T: OpenTransactionLister + ?Sized> OpenTransactionLister for std::sync::Arc<T> {
    fn list_open_transactional_ids(&self, topics: &[String]) -> Result<Vec<String>, BrokerError> {
        (**self).list_open_transactional_ids(topics)
    }
}

/// Aborter decorator that counts calls and fenced ids.
#[derive(Debug)]
pub struct CountingAborter<A> {
    inner: A,
    calls: AtomicU64,
    fenced: AtomicU64,
}

impl<A: TransactionAborter> CountingAborter<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            calls: AtomicU64::new(0),
            fenced: AtomicU64::new(0),
        }
    }

    /// Abort requests that reached the broker successfully.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Requests that hit an id with a previous epoch.
    pub fn fenced(&self) -> u64 {
        self.fenced.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<A: TransactionAborter> TransactionAborter for CountingAborter<A> {
    fn abort(&self, transactional_id: &TransactionalId) -> Result<Epoch, BrokerError> {
        let epoch = self.inner.abort(transactional_id)?;
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !epoch.is_unused() {
            self.fenced.fetch_add(1, Ordering::Relaxed);
        }
        Ok(epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEpoch(i16);

    impl TransactionAborter for FixedEpoch {
        fn abort(&self, _: &TransactionalId) -> Result<Epoch, BrokerError> {
            Ok(Epoch(self.0))
        }
    }

    struct Failing;

    impl TransactionAborter for Failing {
        fn abort(&self, id: &TransactionalId) -> Result<Epoch, BrokerError> {
            Err(BrokerError::abort(id.as_str(), "unreachable"))
        }
    }

    #[test]
    fn counts_calls_and_fenced_ids() {
        let id = TransactionalId::new("app", 0, 0);

        let used = CountingAborter::new(FixedEpoch(4));
        used.abort(&id).unwrap();
        used.abort(&id).unwrap();
        assert_eq!((used.calls(), used.fenced()), (2, 2));

        let unused = CountingAborter::new(FixedEpoch(0));
        unused.abort(&id).unwrap();
        assert_eq!((unused.calls(), unused.fenced()), (1, 0));
    }

    #[test]
    fn failed_calls_are_not_counted() {
        let aborter = CountingAborter::new(Failing);
        assert!(aborter.abort(&TransactionalId::new("app", 0, 0)).is_err());
        assert_eq!(aborter.calls(), 0);
    }

    #[test]
    fn references_forward_to_the_aborter() {
        let inner = FixedEpoch(2);
        let by_ref: &dyn TransactionAborter = &inner;
        let counting = CountingAborter::new(by_ref);
        assert_eq!(
            counting.abort(&TransactionalId::new("app", 1, 1)).unwrap(),
            Epoch(2)
        );
    }
}
