//! # Transaction Naming
//!
//! How the sink picks the sequence part of the transactional ids it opens.
//!
//! - `Incrementing` uses the checkpoint id as the sequence. Every checkpoint gets a new id,
//!   so the broker keeps metadata for each of them until it expires, but older brokers are
//!   supported.
//! - `Pooling` leases small slot numbers and reuses them once a transaction is committed or
//!   aborted. Broker metadata stays bounded by the number of concurrently pending
//!   transactions. Recovering from pooled ids needs broker introspection.
//!
//! Recovery does not care which one produced the ids; it only needs the starting sequence
//! and the set of prefixes.

use crate::error::{RecoveryError, Result};
use crate::identity::TransactionalId;
use crate::ownership::SubtaskPlacement;
use crate::strategy::AbortStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// First checkpoint id of a fresh job.
pub const FIRST_CHECKPOINT_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionNamingStrategy {
    #[default]
    Incrementing,
    Pooling,
}

impl TransactionNamingStrategy {
    /// Abort strategy that can find the ids this naming produces.
    pub fn default_abort_strategy(self) -> AbortStrategy {
        match self {
            TransactionNamingStrategy::Incrementing => AbortStrategy::Probing,
            TransactionNamingStrategy::Pooling => AbortStrategy::Listing,
        }
    }

    /// Sequence recovery starts from after restoring `restored_checkpoint`.
    ///
    /// Incrementing ids up to and including the restored checkpoint were either committed
    /// or are tracked by the committer, so probing starts right after it. Pooled slots are
    /// reused, so every slot is a candidate.
    pub fn start_sequence(self, restored_checkpoint: Option<u64>) -> u64 {
        match self {
            TransactionNamingStrategy::Incrementing => restored_checkpoint
                .map(|checkpoint| checkpoint.saturating_add(1))
                .unwrap_or(FIRST_CHECKPOINT_ID),
            TransactionNamingStrategy::Pooling => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionNamingStrategy::Incrementing => "incrementing",
            TransactionNamingStrategy::Pooling => "pooling",
        }
    }
}

impl fmt::Display for TransactionNamingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionNamingStrategy {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incrementing" => Ok(TransactionNamingStrategy::Incrementing),
            "pooling" => Ok(TransactionNamingStrategy::Pooling),
            other => Err(RecoveryError::invalid(
                "naming_strategy",
                format!("unknown strategy `{other}`, expected `incrementing` or `pooling`"),
            )),
        }
    }
}

/// Names one transaction per checkpoint.
#[derive(Debug, Clone)]
pub struct IncrementingNamer {
    prefix: String,
    placement: SubtaskPlacement,
}

impl IncrementingNamer {
    pub fn new(prefix: impl Into<String>, placement: SubtaskPlacement) -> Self {
        Self {
            prefix: prefix.into(),
            placement,
        }
    }

    /// Id of the transaction that collects records for `checkpoint_id`.
    pub fn transactional_id(&self, checkpoint_id: u64) -> TransactionalId {
        TransactionalId::new(&self.prefix, self.placement.index(), checkpoint_id)
    }
}

/// Leases ids from a pool of reusable slots, lowest free slot first.
///
/// Only leased slots are stored. The lowest free slot is the first gap in the leased set,
/// so a restored pool costs memory proportional to its leases, not to its highest slot.
#[derive(Debug, Clone)]
pub struct PoolingNamer {
    prefix: String,
    placement: SubtaskPlacement,
    leased: BTreeSet<u64>,
    high_water: u64,
}

impl PoolingNamer {
    pub fn new(prefix: impl Into<String>, placement: SubtaskPlacement) -> Self {
        Self {
            prefix: prefix.into(),
            placement,
            leased: BTreeSet::new(),
            high_water: 0,
        }
    }

    /// Restore a pool whose `leased` ids are still pending commit.
    pub fn restore<I>(prefix: impl Into<String>, placement: SubtaskPlacement, leased: I) -> Result<Self>
    where
        I: IntoIterator<Item = TransactionalId>,
    {
        let mut namer = Self::new(prefix, placement);
        for id in leased {
            let fields = id.fields()?;
            if fields.prefix != namer.prefix || fields.owner != placement.index() {
                return Err(RecoveryError::invalid(
                    "leased",
                    format!("{id} was not issued by {}-{}", namer.prefix, placement.index()),
                ));
            }
            let next = fields.sequence.checked_add(1).ok_or_else(|| {
                RecoveryError::invalid("leased", format!("slot of {id} is out of range"))
            })?;
            namer.leased.insert(fields.sequence);
            namer.high_water = namer.high_water.max(next);
        }
        Ok(namer)
    }

    /// Lease the lowest free slot.
    pub fn acquire(&mut self) -> TransactionalId {
        let slot = self.lowest_free_slot();
        self.leased.insert(slot);
        self.high_water = self.high_water.max(slot + 1);
        TransactionalId::new(&self.prefix, self.placement.index(), slot)
    }

    fn lowest_free_slot(&self) -> u64 {
        let mut candidate = 0u64;
        for &slot in &self.leased {
            if slot != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    /// Return the slot of a committed or aborted transaction to the pool.
    pub fn release(&mut self, id: &TransactionalId) -> Result<()> {
        let fields = id.fields()?;
        if fields.prefix != self.prefix
            || fields.owner != self.placement.index()
            || !self.leased.remove(&fields.sequence)
        {
            return Err(RecoveryError::invalid(
                "transactional_id",
                format!("{id} is not leased from this pool"),
            ));
        }
        Ok(())
    }

    /// Ids currently leased, in slot order.
    pub fn leased(&self) -> Vec<TransactionalId> {
        self.leased
            .iter()
            .map(|slot| TransactionalId::new(&self.prefix, self.placement.index(), *slot))
            .collect()
    }

    /// One past the highest slot ever leased.
    pub fn pool_size(&self) -> u64 {
        self.high_water
    }
}
