//! Inputs of one recovery pass.

use crate::broker::{OpenTransactionLister, TransactionAborter};
use crate::error::{RecoveryError, Result};
use crate::identity::{TransactionalId, SEPARATOR};
use crate::ownership::SubtaskPlacement;
use std::collections::{BTreeSet, HashSet};

/// Everything a strategy needs to clean up after previous runs of one subtask.
///
/// Built once per restart attempt and owned by that attempt's recovery pass.
pub struct RecoveryContext<'a> {
    placement: SubtaskPlacement,
    start_sequence: u64,
    prefixes: BTreeSet<String>,
    precommitted: HashSet<TransactionalId>,
    topics: Vec<String>,
    aborter: &'a dyn TransactionAborter,
    lister: Option<&'a dyn OpenTransactionLister>,
}

impl<'a> RecoveryContext<'a> {
    pub fn builder(
        placement: SubtaskPlacement,
        aborter: &'a dyn TransactionAborter,
    ) -> RecoveryContextBuilder<'a> {
        RecoveryContextBuilder {
            placement,
            start_sequence: 0,
            prefixes: BTreeSet::new(),
            precommitted: HashSet::new(),
            topics: Vec::new(),
            aborter,
            lister: None,
        }
    }

    pub fn placement(&self) -> SubtaskPlacement {
        self.placement
    }

    pub fn subtask_index(&self) -> u32 {
        self.placement.index()
    }

    pub fn parallelism(&self) -> u32 {
        self.placement.parallelism()
    }

    /// First sequence number that may belong to a transaction opened after the last
    /// completed checkpoint.
    pub fn start_sequence(&self) -> u64 {
        self.start_sequence
    }

    /// Prefixes this job has used, in a stable order.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefixes.contains(prefix)
    }

    /// True if `raw` starts with `<prefix>-` for one of the known prefixes.
    pub(crate) fn may_carry_known_prefix(&self, raw: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            raw.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with(SEPARATOR))
        })
    }

    /// Ids already handed to the committer. These must survive recovery.
    pub fn is_precommitted(&self, id: &TransactionalId) -> bool {
        self.precommitted.contains(id)
    }

    pub fn precommitted_len(&self) -> usize {
        self.precommitted.len()
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn aborter(&self) -> &'a dyn TransactionAborter {
        self.aborter
    }

    pub fn lister(&self) -> Option<&'a dyn OpenTransactionLister> {
        self.lister
    }

    pub(crate) fn with_aborter<'b>(&self, aborter: &'b dyn TransactionAborter) -> RecoveryContext<'b>
    where
        'a: 'b,
    {
        RecoveryContext {
            placement: self.placement,
            start_sequence: self.start_sequence,
            prefixes: self.prefixes.clone(),
            precommitted: self.precommitted.clone(),
            topics: self.topics.clone(),
            aborter,
            lister: self.lister,
        }
    }
}

impl std::fmt::Debug for RecoveryContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryContext")
            .field("placement", &self.placement)
            .field("start_sequence", &self.start_sequence)
            .field("prefixes", &self.prefixes)
            .field("precommitted", &self.precommitted.len())
            .field("topics", &self.topics)
            .field("lister", &self.lister.is_some())
            .finish()
    }
}

/// Builder for [`RecoveryContext`].
pub struct RecoveryContextBuilder<'a> {
    placement: SubtaskPlacement,
    start_sequence: u64,
    prefixes: BTreeSet<String>,
    precommitted: HashSet<TransactionalId>,
    topics: Vec<String>,
    aborter: &'a dyn TransactionAborter,
    lister: Option<&'a dyn OpenTransactionLister>,
}

impl<'a> RecoveryContextBuilder<'a> {
    pub fn start_sequence(mut self, start_sequence: u64) -> Self {
        self.start_sequence = start_sequence;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into());
        self
    }

    pub fn prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes.extend(prefixes.into_iter().map(Into::into));
        self
    }

    pub fn precommitted<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = TransactionalId>,
    {
        self.precommitted.extend(ids);
        self
    }

    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    pub fn lister(mut self, lister: &'a dyn OpenTransactionLister) -> Self {
        self.lister = Some(lister);
        self
    }

    pub fn build(self) -> Result<RecoveryContext<'a>> {
        if self.prefixes.is_empty() {
            return Err(RecoveryError::invalid(
                "prefixes",
                "at least one transactional id prefix is required",
            ));
        }
        if self.prefixes.contains("") {
            return Err(RecoveryError::invalid(
                "prefixes",
                "transactional id prefix must not be empty",
            ));
        }
        Ok(RecoveryContext {
            placement: self.placement,
            start_sequence: self.start_sequence,
            prefixes: self.prefixes,
            precommitted: self.precommitted,
            topics: self.topics,
            aborter: self.aborter,
            lister: self.lister,
        })
    }
}
