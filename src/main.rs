//! # Sync Policy Controller
//!
//! A Kubernetes controller that keeps resource manifests synchronized into
//! every namespace selected by a `SyncPolicy`, and deletes listed resources
//! from them.
//!
//! Configuration comes from environment variables; the flags below override
//! them.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use sync_policy_controller::config::{ConfigOverrides, ControllerConfig};
use sync_policy_controller::runtime::initialization::initialize;
use sync_policy_controller::runtime::leader_election::{default_identity, LeaderElector};
use sync_policy_controller::runtime::watch_loop::run_watch_loop;
use tracing::{error, info};

/// Synchronize resources into namespaces selected by SyncPolicy objects
#[derive(Debug, Parser)]
#[command(name = "sync-policy-controller", version, about, long_about = None)]
struct Cli {
    /// Delay between two reconciliations of a policy (e.g. 10s, 5m, 1h)
    #[arg(long, value_name = "DURATION")]
    reconcile_interval: Option<String>,

    /// Only watch SyncPolicy objects in this namespace
    #[arg(long, value_name = "NAMESPACE")]
    watch_namespace: Option<String>,

    /// Run Lease based leader election before starting the controllers
    #[arg(long)]
    enable_leader_election: bool,

    /// Port of the metrics and probe server
    #[arg(long, value_name = "PORT")]
    metrics_port: Option<u16>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

impl From<Cli> for ConfigOverrides {
    fn from(cli: Cli) -> Self {
        Self {
            reconcile_interval: cli.reconcile_interval,
            watch_namespace: cli.watch_namespace,
            enable_leader_election: cli.enable_leader_election,
            metrics_port: cli.metrics_port,
            debug: cli.debug,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ControllerConfig::from_env()
        .context("Failed to load configuration from environment")?
        .apply_overrides(cli.into())?;

    let leader_election = config.enable_leader_election.then(|| {
        (
            config.leader_election_id.clone(),
            config.leader_election_namespace.clone(),
        )
    });

    let init = initialize(config).await?;

    let Some((lease_name, lease_namespace)) = leader_election else {
        return run_watch_loop(init.client, init.reconciler, init.server_state).await;
    };

    let identity = default_identity();
    let elector = Arc::new(LeaderElector::new(
        init.client.clone(),
        &lease_name,
        &lease_namespace,
        &identity,
    ));
    let mut guard = elector.acquire().await;

    let outcome = tokio::select! {
        result = run_watch_loop(init.client, init.reconciler, init.server_state) => Some(result),
        () = guard.lost() => None,
    };

    match outcome {
        Some(result) => {
            guard.release().await;
            info!("Shutdown complete");
            result
        }
        None => {
            error!(identity = %identity, "Leadership lost, exiting so the pod restarts");
            Err(anyhow::anyhow!("leadership lost"))
        }
    }
}
