use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use txn_recovery::config::{CONFIG_PATH_ENV, DEFAULT_LOG_FILTER};
use txn_recovery::{
    AbortStrategy, ConfigOverrides, DeliveryGuarantee, SinkConfig, SubtaskPlacement,
    TransactionNamingStrategy, TransactionalId,
};

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn required_arg(flag: &str) -> anyhow::Result<String> {
    parse_arg(flag).ok_or_else(|| anyhow::anyhow!("{flag} is required"))
}

fn print_help() {
    eprintln!(
        r#"txn_recovery_tool - inspect transactional ids and sink recovery settings

USAGE:
    txn_recovery_tool <COMMAND> [OPTIONS]

COMMANDS:
    build     --prefix <P> --owner <N> --sequence <N>
              Print the transactional id for the given fields
    parse     <ID>
              Print prefix, owner and sequence of an id
    owner     <ID> --parallelism <N>
              Print the current subtask responsible for an id
    inherit   --subtask <N> --parallelism <N> --previous-parallelism <N>
              Print the historical subtask indices a subtask cleans up
    config    [-c <FILE>] [--prefix <P>] [--naming <S>] [--abort <S>] [--topics <T,..>]
              [--previous-prefixes <P,..>]
              Print the resolved sink configuration as JSON

ENVIRONMENT:
    TXN_RECOVERY_CONFIG     Path to config file
    TXN_RECOVERY_*          Any sink option, e.g. TXN_RECOVERY_NAMING_STRATEGY=pooling
    RUST_LOG                Log filter
"#
    );
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn positional(index: usize) -> Option<String> {
    std::env::args().nth(index).filter(|arg| !arg.starts_with('-'))
}

fn build_command() -> anyhow::Result<()> {
    let prefix = required_arg("--prefix")?;
    let owner: i64 = required_arg("--owner")?.parse()?;
    let sequence: i64 = required_arg("--sequence")?.parse()?;
    println!("{}", TransactionalId::try_new(&prefix, owner, sequence)?);
    Ok(())
}

fn parse_command() -> anyhow::Result<()> {
    let raw = positional(2).ok_or_else(|| anyhow::anyhow!("parse requires an id"))?;
    let id = TransactionalId::parse(&raw)?;
    let fields = id.fields()?;
    println!(
        "{}",
        serde_json::json!({
            "prefix": fields.prefix,
            "owner": fields.owner,
            "sequence": fields.sequence,
        })
    );
    Ok(())
}

fn owner_command() -> anyhow::Result<()> {
    let raw = positional(2).ok_or_else(|| anyhow::anyhow!("owner requires an id"))?;
    let parallelism: u32 = required_arg("--parallelism")?.parse()?;
    let owner = TransactionalId::parse(&raw)?.owner()?;
    let responsible = (0..parallelism)
        .map(|index| SubtaskPlacement::new(index, parallelism))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .find(|placement| placement.owns(owner))
        .ok_or_else(|| anyhow::anyhow!("--parallelism must be at least 1"))?;
    println!("{}", responsible);
    Ok(())
}

fn inherit_command() -> anyhow::Result<()> {
    let subtask: u32 = required_arg("--subtask")?.parse()?;
    let parallelism: u32 = required_arg("--parallelism")?.parse()?;
    let previous: u32 = required_arg("--previous-parallelism")?.parse()?;
    let placement = SubtaskPlacement::new(subtask, parallelism)?;
    let inherited: Vec<u32> = placement.inherited_indices(previous).collect();
    println!("{}", serde_json::to_string(&inherited)?);
    Ok(())
}

fn config_command() -> anyhow::Result<()> {
    let mut overrides = ConfigOverrides::default();
    if let Some(prefix) = parse_arg("--prefix") {
        overrides.transactional_id_prefix = Some(prefix);
        overrides.delivery_guarantee = Some(DeliveryGuarantee::ExactlyOnce);
    }
    if let Some(naming) = parse_arg("--naming") {
        overrides.naming_strategy = Some(naming.parse::<TransactionNamingStrategy>()?);
    }
    if let Some(abort) = parse_arg("--abort") {
        overrides.abort_strategy = Some(abort.parse::<AbortStrategy>()?);
    }
    if let Some(topics) = parse_arg("--topics") {
        overrides.topics = Some(split_list(&topics));
    }
    if let Some(previous) = parse_arg("--previous-prefixes") {
        overrides.previous_prefixes = Some(split_list(&previous));
    }

    // Load config: CLI > Env > File > Defaults
    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(PathBuf::from);
    let config = SinkConfig::load(config_path.as_deref(), overrides)?;
    tracing::info!(
        strategy = %config.effective_abort_strategy(),
        naming = %config.naming_strategy,
        "resolved sink configuration"
    );
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    match std::env::args().nth(1).as_deref() {
        Some("build") => build_command(),
        Some("parse") => parse_command(),
        Some("owner") => owner_command(),
        Some("inherit") => inherit_command(),
        Some("config") => config_command(),
        _ => {
            print_help();
            anyhow::bail!("unknown or missing command")
        }
    }
}
