//! # Watch Loop
//!
//! Runs the SyncPolicy controller and the Namespace controller side by side
//! and restarts both when a watch stream fails or ends.

use crate::controller::reconciler::{reconcile, reconcile_namespace, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::SyncPolicy;
use crate::runtime::error_policy::{
    handle_namespace_error, handle_policy_error, handle_watch_stream_error, WatchBackoff,
};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::Api;
use kube::Client;
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

type ControllerResult<K> =
    Result<(ObjectRef<K>, Action), controller::Error<ReconcilerError, watcher::Error>>;

/// Run both controllers until a shutdown signal is received
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = Arc::clone(&reconciler.config);
    let backoff = Arc::new(WatchBackoff::new(config.backoff_start_ms, config.backoff_max_ms));

    let shutdown_state = Arc::clone(&server_state);
    let shutdown_reconciler = Arc::clone(&reconciler);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, finishing in-flight reconciliations");
        shutdown_state.mark_not_ready();
        shutdown_reconciler.request_shutdown();
    });

    let controller_config = controller::Config::default()
        .concurrency(config.max_concurrent_reconciliations);

    loop {
        if !server_state.is_ready() {
            break;
        }

        let policies: Api<SyncPolicy> = match &config.watch_namespace {
            Some(namespace) => Api::namespaced(client.clone(), namespace),
            None => Api::all(client.clone()),
        };
        let namespaces: Api<Namespace> = Api::all(client.clone());

        info!(
            watch_namespace = config.watch_namespace.as_deref().unwrap_or("*"),
            concurrency = config.max_concurrent_reconciliations,
            "Starting controllers"
        );

        let policy_stream = Controller::new(policies, watcher::Config::default().any_semantic())
            .with_config(controller_config.clone())
            .shutdown_on_signal()
            .run(reconcile, handle_policy_error, Arc::clone(&reconciler));

        let namespace_stream = Controller::new(namespaces, watcher::Config::default())
            .with_config(controller_config.clone())
            .shutdown_on_signal()
            .run(reconcile_namespace, handle_namespace_error, Arc::clone(&reconciler));

        // Either stream stopping tears down both so they restart together
        tokio::select! {
            () = drive("syncpolicy", policy_stream, &backoff, config.watch_restart_delay_duration())
                .instrument(info_span!("controller.watch", controller = "syncpolicy")) => {}
            () = drive("namespace", namespace_stream, &backoff, config.watch_restart_delay_duration())
                .instrument(info_span!("controller.watch", controller = "namespace")) => {}
        }

        if !server_state.is_ready() {
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(delay_secs = delay.as_secs(), "Controller watch stream ended, restarting");
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Consume a controller stream until it ends or an error requires a restart
async fn drive<K, S>(
    name: &'static str,
    stream: S,
    backoff: &WatchBackoff,
    restart_delay: std::time::Duration,
) where
    K: kube::Resource,
    S: Stream<Item = ControllerResult<K>>,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(result) = stream.next().await {
        match result {
            Ok((object, action)) => {
                backoff.reset();
                debug!(controller = name, object = %object, action = ?action, "watch.event.reconciled");
            }
            // Already handled by the error policy
            Err(controller::Error::ReconcilerFailed(error, object)) => {
                debug!(controller = name, object = %object, error = %error, "watch.event.reconciliation_failed");
            }
            Err(error) => {
                let rendered = format!("{error:?}");
                if handle_watch_stream_error(name, &rendered, backoff, restart_delay).await {
                    return;
                }
            }
        }
    }
}
