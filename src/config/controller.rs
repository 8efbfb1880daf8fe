//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::config::parse_kubernetes_duration;
use anyhow::{Context, Result};
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Delay before a policy is reconciled again after a completed run
    pub reconcile_interval: Duration,
    /// Fixed retry delay after the namespace list could not be fetched
    pub namespace_fetch_retry: Duration,
    /// Only watch SyncPolicy resources in this namespace (all namespaces when unset)
    pub watch_namespace: Option<String>,
    /// Run leader election before starting the watch loop
    pub enable_leader_election: bool,
    /// Namespace holding the leader election Lease
    pub leader_election_namespace: String,
    /// Name of the leader election Lease
    pub leader_election_id: String,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Exponential backoff starting value (milliseconds)
    /// Initial delay before restarting a failed watch stream
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Maximum concurrent reconciliations
    /// Limits how many policies can be reconciled simultaneously
    pub max_concurrent_reconciliations: u16,
}

/// Values supplied on the command line
///
/// Every field left unset keeps the value loaded from the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub reconcile_interval: Option<String>,
    pub watch_namespace: Option<String>,
    pub enable_leader_election: bool,
    pub metrics_port: Option<u16>,
    pub debug: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            reconcile_interval: Duration::from_secs(10),
            namespace_fetch_retry: Duration::from_secs(60),
            watch_namespace: None,
            enable_leader_election: false,
            leader_election_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            leader_election_id: DEFAULT_LEADER_ELECTION_ID.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: LogFormat::Json,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// Fails only when a duration variable is set to something unparsable.
    pub fn from_env() -> Result<Self> {
        use crate::constants::*;

        let reconcile_interval = env_var_or_default_duration(
            "RECONCILE_INTERVAL",
            DEFAULT_RECONCILE_INTERVAL,
        )?;
        let namespace_fetch_retry = env_var_or_default_duration(
            "NAMESPACE_FETCH_RETRY",
            DEFAULT_NAMESPACE_FETCH_RETRY,
        )?;
        let pod_namespace = env_var_or_default_str("POD_NAMESPACE", DEFAULT_CONTROLLER_NAMESPACE);

        Ok(Self {
            reconcile_interval,
            namespace_fetch_retry,
            watch_namespace: env_var_non_empty("WATCH_NAMESPACE"),
            enable_leader_election: env_var_or_default_bool("ENABLE_LEADER_ELECTION", false),
            leader_election_namespace: env_var_or_default_str(
                "LEADER_ELECTION_NAMESPACE",
                &pod_namespace,
            ),
            leader_election_id: env_var_or_default_str(
                "LEADER_ELECTION_ID",
                DEFAULT_LEADER_ELECTION_ID,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: parse_log_format(&env_var_or_default_str("LOG_FORMAT", "json")),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
        })
    }

    /// Apply command line overrides on top of the environment configuration
    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(interval) = overrides.reconcile_interval {
            self.reconcile_interval = parse_kubernetes_duration(&interval)
                .with_context(|| format!("Invalid --reconcile-interval '{interval}'"))?;
        }
        if let Some(namespace) = overrides.watch_namespace.filter(|ns| !ns.is_empty()) {
            self.watch_namespace = Some(namespace);
        }
        if overrides.enable_leader_election {
            self.enable_leader_election = true;
        }
        if let Some(port) = overrides.metrics_port {
            self.metrics_port = port;
        }
        if overrides.debug {
            self.log_level = "DEBUG".to_string();
        }
        Ok(self)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Get backoff start duration
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Tracing filter directive derived from the configured log level
    pub fn log_filter(&self) -> String {
        format!(
            "sync_policy_controller={},kube=warn,kube_runtime=warn,tower_http=warn",
            self.log_level.to_lowercase()
        )
    }
}

fn parse_log_format(value: &str) -> LogFormat {
    match value.to_lowercase().as_str() {
        "text" | "pretty" | "plain" => LogFormat::Text,
        _ => LogFormat::Json,
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read environment variable, treating empty values as unset
fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read environment variable as Kubernetes duration or parse the default
fn env_var_or_default_duration(key: &str, default: &str) -> Result<Duration> {
    let raw = env_var_or_default_str(key, default);
    parse_kubernetes_duration(&raw).with_context(|| format!("Invalid {key} '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_documented_values() {
        let config = ControllerConfig::default();
        assert_eq!(config.reconcile_interval, Duration::from_secs(10));
        assert_eq!(config.namespace_fetch_retry, Duration::from_secs(60));
        assert_eq!(config.metrics_port, 8080);
        assert!(!config.enable_leader_election);
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = ControllerConfig::default()
            .apply_overrides(ConfigOverrides {
                reconcile_interval: Some("30s".to_string()),
                watch_namespace: Some("team-a".to_string()),
                enable_leader_election: true,
                metrics_port: Some(9090),
                debug: true,
            })
            .unwrap();

        assert_eq!(config.reconcile_interval, Duration::from_secs(30));
        assert_eq!(config.watch_namespace.as_deref(), Some("team-a"));
        assert!(config.enable_leader_election);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "DEBUG");
        assert!(config.log_filter().starts_with("sync_policy_controller=debug"));
    }

    #[test]
    fn test_empty_overrides_keep_values() {
        let base = ControllerConfig {
            watch_namespace: Some("ops".to_string()),
            ..ControllerConfig::default()
        };
        let config = base
            .apply_overrides(ConfigOverrides {
                watch_namespace: Some(String::new()),
                ..ConfigOverrides::default()
            })
            .unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("ops"));
        assert_eq!(config.log_level, "INFO");
    }

    #[test]
    fn test_invalid_interval_override_is_rejected() {
        let result = ControllerConfig::default().apply_overrides(ConfigOverrides {
            reconcile_interval: Some("soon".to_string()),
            ..ConfigOverrides::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_log_format() {
        assert_eq!(parse_log_format("TEXT"), LogFormat::Text);
        assert_eq!(parse_log_format("json"), LogFormat::Json);
        assert_eq!(parse_log_format("unknown"), LogFormat::Json);
    }
}
