//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server
//! startup and Kubernetes client setup.

use crate::config::{ControllerConfig, LogFormat};
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::SyncPolicy;
use crate::observability;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// Installs the rustls crypto provider, sets up tracing, registers metrics,
/// starts the HTTP server and waits for it to bind, then connects to the
/// cluster.
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Must happen before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    init_tracing(&config)?;

    info!("Starting Sync Policy Controller");
    info!(
        build.timestamp = env!("BUILD_TIMESTAMP"),
        build.datetime = env!("BUILD_DATETIME"),
        build.git_hash = env!("BUILD_GIT_HASH"),
        "Build info"
    );
    info!(
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        leader_election = config.enable_leader_election,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::new());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!(error = %e, "HTTP server error");
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    log_existing_policies(&client, &config).await;

    let reconciler = Arc::new(Reconciler::new(client.clone(), config));

    info!("Controller initialized");
    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
    })
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured log level.
pub fn init_tracing(config: &ControllerConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.log_format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Text => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
}

async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Log a per-namespace summary of the policies present at startup
///
/// Also tells the operator early when the CRD is not installed.
async fn log_existing_policies(client: &Client, config: &ControllerConfig) {
    let policies: Api<SyncPolicy> = match &config.watch_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    match policies.list(&ListParams::default()).await {
        Ok(list) => {
            let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for policy in &list.items {
                by_namespace
                    .entry(policy.metadata.namespace.clone().unwrap_or_default())
                    .or_default()
                    .push(policy.metadata.name.clone().unwrap_or_default());
            }
            info!(
                policies = list.items.len(),
                namespaces = by_namespace.len(),
                "Found existing SyncPolicy resources"
            );
            for (namespace, mut names) in by_namespace {
                names.sort();
                info!(namespace = %namespace, policies = %names.join(", "), "Existing policies");
            }
        }
        Err(e) => {
            error!(error = %e, "SyncPolicy CRD is not queryable, is the CRD installed?");
            warn!("Continuing, the watch will retry");
        }
    }
}
