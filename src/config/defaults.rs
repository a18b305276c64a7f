//! Default constants for sink configuration.

/// Prefix of environment variables read by [`super::SinkConfig::load`].
pub const ENV_PREFIX: &str = "TXN_RECOVERY_";

/// Environment variable naming the config file used by the tool binary.
pub const CONFIG_PATH_ENV: &str = "TXN_RECOVERY_CONFIG";

/// Default log filter for the tool binary when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Topic list used when none is configured.
pub fn default_topics() -> Vec<String> {
    Vec::new()
}
