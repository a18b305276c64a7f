//! # Recovery Coordinator
//!
//! Runs the configured abort strategy once per restart attempt, before the sink opens any
//! new transaction. A failed pass must stop the startup: continuing with stale transactions
//! still open could expose uncommitted data or block readers.

use crate::broker::CountingAborter;
use crate::config::SinkConfig;
use crate::context::RecoveryContext;
use crate::error::Result;
use crate::strategy::AbortStrategy;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Outcome of one recovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub strategy: AbortStrategy,
    pub subtask_index: u32,
    pub parallelism: u32,
    /// Fencing calls issued, including probes that found an unused id.
    pub abort_calls: u64,
    /// Calls that hit an id with a previous epoch.
    pub fenced: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// One-shot driver of the stale transaction cleanup.
///
/// [`RecoveryCoordinator::run`] consumes the coordinator, so a restart attempt builds a
/// fresh one together with a fresh [`RecoveryContext`].
#[derive(Debug, Clone)]
pub struct RecoveryCoordinator {
    strategy: AbortStrategy,
}

impl RecoveryCoordinator {
    pub fn new(strategy: AbortStrategy) -> Self {
        Self { strategy }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(config.effective_abort_strategy())
    }

    pub fn strategy(&self) -> AbortStrategy {
        self.strategy
    }

    #[instrument(
        skip(self, context),
        fields(strategy = %self.strategy, subtask = %context.placement())
    )]
    pub fn run(self, context: &RecoveryContext<'_>) -> Result<RecoveryReport> {
        let started = Instant::now();
        let counting = CountingAborter::new(context.aborter());
        let counted = context.with_aborter(&counting);

        self.strategy.abort_transactions(&counted)?;

        let report = RecoveryReport {
            strategy: self.strategy,
            subtask_index: context.subtask_index(),
            parallelism: context.parallelism(),
            abort_calls: counting.calls(),
            fenced: counting.fenced(),
            elapsed: started.elapsed(),
        };
        info!(
            abort_calls = report.abort_calls,
            fenced = report.fenced,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "stale transaction recovery finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeliveryGuarantee;
    use crate::error::RecoveryError;
    use crate::identity::TransactionalId;
    use crate::naming::TransactionNamingStrategy;
    use crate::ownership::SubtaskPlacement;
    use crate::test_support::InMemoryBroker;

    #[test]
    fn reports_calls_and_fenced_ids() {
        let broker = InMemoryBroker::new();
        for sequence in 3..6 {
            broker.open(&TransactionalId::new("app", 1, sequence));
        }
        let context = RecoveryContext::builder(SubtaskPlacement::new(1, 2).unwrap(), &broker)
            .prefix("app")
            .start_sequence(3)
            .build()
            .unwrap();

        let report = RecoveryCoordinator::new(AbortStrategy::Probing)
            .run(&context)
            .unwrap();

        assert_eq!(report.strategy, AbortStrategy::Probing);
        assert_eq!(report.fenced, 3);
        // 3 fenced + unused probe for owner 1 + unused probe for owner 3.
        assert_eq!(report.abort_calls, 5);
        assert_eq!((report.subtask_index, report.parallelism), (1, 2));
    }

    #[test]
    fn propagates_broker_failures() {
        let broker = InMemoryBroker::new();
        broker.open(&TransactionalId::new("app", 0, 0));
        broker.fail_aborts_after(0);
        let context = RecoveryContext::builder(SubtaskPlacement::new(0, 1).unwrap(), &broker)
            .prefix("app")
            .build()
            .unwrap();

        let err = RecoveryCoordinator::new(AbortStrategy::Probing)
            .run(&context)
            .unwrap_err();

        assert!(matches!(err, RecoveryError::Broker(_)));
        assert_eq!(broker.open_ids().len(), 1);
    }

    #[test]
    fn picks_strategy_from_config() {
        let mut config = SinkConfig {
            delivery_guarantee: DeliveryGuarantee::ExactlyOnce,
            transactional_id_prefix: Some("app".to_string()),
            ..SinkConfig::default()
        };
        assert_eq!(
            RecoveryCoordinator::from_config(&config).strategy(),
            AbortStrategy::Probing
        );

        config.naming_strategy = TransactionNamingStrategy::Pooling;
        assert_eq!(
            RecoveryCoordinator::from_config(&config).strategy(),
            AbortStrategy::Listing
        );
    }
}
