//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default interval between two successful reconciliations of the same policy
pub const DEFAULT_RECONCILE_INTERVAL: &str = "10s";

/// Fixed retry delay after the namespace list could not be fetched
pub const DEFAULT_NAMESPACE_FETCH_RETRY: &str = "1m";

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default number of policies reconciled in parallel by the watch loop
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 4;

/// Namespace used when `POD_NAMESPACE` is not set
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "octopilot-system";

/// Lease name used for leader election
pub const DEFAULT_LEADER_ELECTION_ID: &str = "sync-policy-controller-leader";

/// Field manager / component name used for status writes and events
pub const FIELD_MANAGER: &str = "sync-policy-controller";

/// Placeholder replaced with the target namespace name inside every synced manifest
pub const PROJECT_NAME_PLACEHOLDER: &str = "${PROJECT_NAME}";

/// Maximum nesting depth accepted by the placeholder substitution
pub const MAX_MANIFEST_DEPTH: usize = 64;

/// How long a foreground delete may take before a force-recreate gives up
pub const FOREGROUND_DELETE_TIMEOUT_SECS: u64 = 60;

/// Poll interval while waiting for a foreground delete to finish
pub const FOREGROUND_DELETE_POLL_INTERVAL_MS: u64 = 500;

/// Lifecycle phase of namespaces that accept object creation and deletion
pub const NAMESPACE_PHASE_ACTIVE: &str = "Active";
