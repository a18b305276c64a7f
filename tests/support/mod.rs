use txn_recovery::test_support::InMemoryBroker;
use txn_recovery::{
    AbortStrategy, RecoveryContext, RecoveryCoordinator, RecoveryReport, SubtaskPlacement,
    TransactionalId,
};

/// Open `sequences` for every owner in `owners`, as a crashed run would leave them.
#[allow(dead_code)]
pub fn leave_open(
    broker: &InMemoryBroker,
    prefix: &str,
    owners: impl IntoIterator<Item = u32>,
    sequences: std::ops::Range<u64>,
) -> Vec<TransactionalId> {
    let mut opened = Vec::new();
    for owner in owners {
        for sequence in sequences.clone() {
            let id = TransactionalId::new(prefix, owner, sequence);
            broker.open_on("orders", &id);
            opened.push(id);
        }
    }
    opened
}

/// Run one recovery pass for `index` of `parallelism`.
#[allow(dead_code)]
pub fn recover(
    broker: &InMemoryBroker,
    strategy: AbortStrategy,
    index: u32,
    parallelism: u32,
    prefixes: &[&str],
    start_sequence: u64,
    precommitted: &[TransactionalId],
) -> anyhow::Result<RecoveryReport> {
    let context = RecoveryContext::builder(SubtaskPlacement::new(index, parallelism)?, broker)
        .lister(broker)
        .topics(["orders"])
        .prefixes(prefixes.iter().copied())
        .start_sequence(start_sequence)
        .precommitted(precommitted.iter().cloned())
        .build()?;
    Ok(RecoveryCoordinator::new(strategy).run(&context)?)
}
