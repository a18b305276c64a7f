//! # Abort Strategies
//!
//! Two ways to find and fence transactions left open by earlier runs:
//!
//! - **Probing** regenerates candidate ids and fences them one by one until the broker
//!   reports an id that was never used. It works against any broker, but every probe leaves
//!   a metadata record on the broker until the transaction log retention drops it.
//! - **Listing** asks the broker which transactions are open and fences the ones this
//!   subtask owns. It needs broker introspection support, and its cost only depends on
//!   the number of open transactions.

use crate::broker::TransactionAborter;
use crate::context::RecoveryContext;
use crate::error::{RecoveryError, Result};
use crate::identity::TransactionalId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How stale transactions are discovered on recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortStrategy {
    /// Guess ids from the starting sequence upward.
    Probing,
    /// Query the broker for open transactions.
    Listing,
}

impl AbortStrategy {
    /// Fence every transaction that earlier runs of this subtask (and of the historical
    /// subtasks it inherits) may have left open.
    ///
    /// Running it again with the same context aborts no open transaction, although probing
    /// issues a few more fencing calls because the first pass initialized the ids it probed.
    /// The first error ends the pass.
    pub fn abort_transactions(&self, context: &RecoveryContext<'_>) -> Result<()> {
        match self {
            AbortStrategy::Probing => probe(context),
            AbortStrategy::Listing => list_and_abort(context),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AbortStrategy::Probing => "probing",
            AbortStrategy::Listing => "listing",
        }
    }
}

impl fmt::Display for AbortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbortStrategy {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "probing" => Ok(AbortStrategy::Probing),
            "listing" => Ok(AbortStrategy::Listing),
            other => Err(RecoveryError::invalid(
                "abort_strategy",
                format!("unknown strategy `{other}`, expected `probing` or `listing`"),
            )),
        }
    }
}

fn probe(context: &RecoveryContext<'_>) -> Result<()> {
    for prefix in context.prefixes() {
        probe_prefix(prefix, context)?;
    }
    Ok(())
}

/// Walks the historical owners this subtask is responsible for: its own index, then every
/// index congruent to it modulo the current parallelism. An owner without a single used id
/// means no higher owner existed either.
fn probe_prefix(prefix: &str, context: &RecoveryContext<'_>) -> Result<()> {
    let mut owner = Some(context.subtask_index());
    while let Some(current) = owner {
        if probe_owner(prefix, current, context)? == 0 {
            break;
        }
        owner = current.checked_add(context.parallelism());
    }
    Ok(())
}

/// Fences `owner`'s ids from the starting sequence until the first unused one and returns
/// how many previously used ids it passed. Committed ids count as used, so the walk
/// continues past them.
///
/// Ids are assumed to be used without gaps; a skipped sequence number hides everything
/// above it.
fn probe_owner(prefix: &str, owner: u32, context: &RecoveryContext<'_>) -> Result<u64> {
    let aborter = context.aborter();
    let mut used = 0u64;
    let mut sequence = Some(context.start_sequence());
    while let Some(current) = sequence {
        let id = TransactionalId::new(prefix, owner, current);
        let epoch = aborter.abort(&id)?;
        debug!(transactional_id = %id, %epoch, "probed transactional id");
        if epoch.is_unused() {
            break;
        }
        used += 1;
        sequence = current.checked_add(1);
    }
    if used > 0 {
        info!(
            prefix,
            owner,
            fenced = used,
            subtask = %context.placement(),
            "fenced transactional ids of historical subtask"
        );
    }
    Ok(used)
}

fn list_and_abort(context: &RecoveryContext<'_>) -> Result<()> {
    let lister = context.lister().ok_or_else(|| {
        RecoveryError::invalid(
            "lister",
            "listing strategy requires broker transaction introspection",
        )
    })?;
    let open: BTreeSet<String> = lister
        .list_open_transactional_ids(context.topics())?
        .into_iter()
        .collect();
    if open.is_empty() {
        return Ok(());
    }

    let owned = owned_open_transactions(&open, context)?;
    warn!(
        count = owned.len(),
        subtask = %context.placement(),
        transactions = ?owned.iter().map(TransactionalId::as_str).collect::<Vec<_>>(),
        "found open transactions for subtask"
    );

    let targets: Vec<&TransactionalId> = owned
        .iter()
        .filter(|id| {
            let keep = context.is_precommitted(id);
            if keep {
                debug!(transactional_id = %id, "skipping transaction that is pending commit");
            }
            !keep
        })
        .collect();

    abort_all(context.aborter(), &targets)
}

/// Open ids that carry a known prefix and belong to this subtask.
///
/// Names that do not start with a known prefix belong to other applications and are
/// ignored. A name that does but cannot be parsed is a naming-scheme mismatch and fails
/// the pass.
fn owned_open_transactions(
    open: &BTreeSet<String>,
    context: &RecoveryContext<'_>,
) -> Result<Vec<TransactionalId>> {
    let placement = context.placement();
    let mut owned = Vec::new();
    for raw in open {
        if !context.may_carry_known_prefix(raw) {
            continue;
        }
        let id = TransactionalId::parse(raw)?;
        let fields = id.fields()?;
        if context.has_prefix(fields.prefix) && placement.owns(fields.owner) {
            owned.push(id);
        }
    }
    Ok(owned)
}

fn abort_all(aborter: &dyn TransactionAborter, targets: &[&TransactionalId]) -> Result<()> {
    targets.par_iter().try_for_each(|id| {
        let epoch = aborter.abort(id)?;
        debug!(transactional_id = %id, %epoch, "aborted open transaction");
        Ok::<(), RecoveryError>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::SubtaskPlacement;
    use crate::test_support::InMemoryBroker;

    fn context<'a>(
        broker: &'a InMemoryBroker,
        index: u32,
        parallelism: u32,
    ) -> crate::context::RecoveryContextBuilder<'a> {
        RecoveryContext::builder(SubtaskPlacement::new(index, parallelism).unwrap(), broker)
            .lister(broker)
            .topics(["orders"])
    }

    #[test]
    fn parses_strategy_names() {
        assert_eq!("probing".parse::<AbortStrategy>().unwrap(), AbortStrategy::Probing);
        assert_eq!(" LISTING ".parse::<AbortStrategy>().unwrap(), AbortStrategy::Listing);
        assert!("guessing".parse::<AbortStrategy>().is_err());
        assert_eq!(AbortStrategy::Listing.to_string(), "listing");
    }

    #[test]
    fn probing_stops_at_first_unused_sequence() {
        let broker = InMemoryBroker::new();
        for sequence in 0..5 {
            broker.open(&TransactionalId::new("app", 0, sequence));
        }
        let ctx = context(&broker, 0, 1).prefix("app").build().unwrap();

        AbortStrategy::Probing.abort_transactions(&ctx).unwrap();

        assert_eq!(broker.fenced_ids().len(), 5);
        // 5 fenced, one unused probe for owner 0 and one for owner 1.
        assert_eq!(broker.abort_calls().len(), 7);
        assert!(broker.open_ids().is_empty());
    }

    #[test]
    fn probing_starts_at_the_start_sequence() {
        let broker = InMemoryBroker::new();
        broker.open(&TransactionalId::new("app", 0, 2));
        broker.open(&TransactionalId::new("app", 0, 10));
        broker.open(&TransactionalId::new("app", 0, 11));
        let ctx = context(&broker, 0, 1)
            .prefix("app")
            .start_sequence(10)
            .build()
            .unwrap();

        AbortStrategy::Probing.abort_transactions(&ctx).unwrap();

        assert_eq!(
            broker.open_ids(),
            vec![TransactionalId::new("app", 0, 2)]
        );
    }

    #[test]
    fn probing_covers_every_known_prefix() {
        let broker = InMemoryBroker::new();
        broker.open(&TransactionalId::new("old", 0, 0));
        broker.open(&TransactionalId::new("new", 0, 0));
        let ctx = context(&broker, 0, 1)
            .prefixes(["old", "new"])
            .build()
            .unwrap();

        AbortStrategy::Probing.abort_transactions(&ctx).unwrap();

        assert!(broker.open_ids().is_empty());
    }

    #[test]
    fn listing_requires_a_lister() {
        let broker = InMemoryBroker::new();
        let ctx = RecoveryContext::builder(SubtaskPlacement::new(0, 1).unwrap(), &broker)
            .prefix("app")
            .build()
            .unwrap();
        assert!(matches!(
            AbortStrategy::Listing.abort_transactions(&ctx),
            Err(RecoveryError::InvalidArgument { field: "lister", .. })
        ));
    }

    #[test]
    fn listing_ignores_foreign_names() {
        let broker = InMemoryBroker::new();
        broker.open_raw("orders", "other-application");
        broker.open_raw("orders", "apple-0-1");
        broker.open(&TransactionalId::new("app", 0, 1));
        let ctx = context(&broker, 0, 1).prefix("app").build().unwrap();

        AbortStrategy::Listing.abort_transactions(&ctx).unwrap();

        assert_eq!(broker.fenced_ids(), vec![TransactionalId::new("app", 0, 1)]);
    }

    #[test]
    fn listing_fails_on_malformed_id_with_known_prefix() {
        let broker = InMemoryBroker::new();
        broker.open_raw("orders", "app-zero-1");
        let ctx = context(&broker, 0, 1).prefix("app").build().unwrap();

        assert!(matches!(
            AbortStrategy::Listing.abort_transactions(&ctx),
            Err(RecoveryError::MalformedIdentity { .. })
        ));
        assert!(broker.abort_calls().is_empty());
    }

    #[test]
    fn listing_requires_exact_prefix_match() {
        let broker = InMemoryBroker::new();
        broker.open(&TransactionalId::new("app-eu", 0, 1));
        let ctx = context(&broker, 0, 1).prefix("app").build().unwrap();

        AbortStrategy::Listing.abort_transactions(&ctx).unwrap();

        assert!(broker.abort_calls().is_empty());
    }
}
