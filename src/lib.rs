//! # txn_recovery
//!
//! Transactional-id naming and stale transaction recovery for exactly-once sinks that write
//! to a transactional broker from a checkpointed, rescalable streaming job.
//!
//! Every transaction a sink subtask opens is named `<prefix>-<subtask>-<sequence>`. After a
//! crash the job may restart with a different parallelism, and transactions opened by the
//! dead producers can still be open on the broker. Before a restarted subtask opens any
//! new transaction it runs a [`RecoveryCoordinator`] pass that fences the stale
//! transactions it owns, either by probing regenerated ids or by listing the broker's open
//! transactions.
//!
//! ```no_run
//! use txn_recovery::{
//!     AbortStrategy, RecoveryContext, RecoveryCoordinator, SubtaskPlacement,
//!     test_support::InMemoryBroker,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let broker = InMemoryBroker::new();
//! let context = RecoveryContext::builder(SubtaskPlacement::new(0, 2)?, &broker)
//!     .prefix("orders-sink")
//!     .start_sequence(42)
//!     .build()?;
//! let report = RecoveryCoordinator::new(AbortStrategy::Probing).run(&context)?;
//! println!("fenced {} transactions", report.fenced);
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod naming;
pub mod ownership;
pub mod strategy;
pub mod test_support;

pub use broker::{CountingAborter, OpenTransactionLister, TransactionAborter};
pub use config::{ConfigError, ConfigOverrides, DeliveryGuarantee, SinkConfig};
pub use context::{RecoveryContext, RecoveryContextBuilder};
pub use coordinator::{RecoveryCoordinator, RecoveryReport};
pub use error::{BrokerError, BrokerOperation, RecoveryError, Result};
pub use identity::{Epoch, IdFields, TransactionalId};
pub use naming::{IncrementingNamer, PoolingNamer, TransactionNamingStrategy};
pub use ownership::{owner_of, SubtaskPlacement};
pub use strategy::AbortStrategy;
