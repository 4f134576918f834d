//! Controller runner - builds the futures that drive the trust bundle watch

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::Store;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use crate::config::{Config, WatchTarget};
use crate::controller::trust_bundle::{error_policy, reconcile, Context};
use crate::health::ReadinessState;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A boxed future driving part of the controller until shutdown
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Watcher configuration scoped to the one watched Secret
///
/// The API server only sends events for `metadata.name=<name>`; the
/// reconciler checks the full identity again.
pub fn watcher_config(target: &WatchTarget) -> WatcherConfig {
    WatcherConfig::default()
        .fields(&target.field_selector())
        .timeout(WATCH_TIMEOUT_SECS)
}

/// Build the trust bundle controller futures
///
/// Returns the controller loop itself plus a future that flips `readiness`
/// once the Secret cache has completed its initial list. The controller
/// stops on SIGTERM/ctrl-c.
pub fn build_trust_bundle_controller(
    client: Client,
    config: Arc<Config>,
    readiness: ReadinessState,
) -> Vec<ControllerFuture> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &config.target.namespace);
    let controller = Controller::new(secrets, watcher_config(&config.target));
    let store = controller.store();

    tracing::info!(
        namespace = %config.target.namespace,
        secret = %config.target.name,
        "- TrustBundle controller"
    );

    let ctx = Arc::new(Context::from_client(client, config));
    let ctrl = controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("TrustBundle"));

    vec![
        Box::pin(mark_ready_when_synced(store, readiness)),
        Box::pin(ctrl),
    ]
}

/// Wait for the reflector's initial list, then report ready
async fn mark_ready_when_synced(store: Store<Secret>, readiness: ReadinessState) {
    match store.wait_until_ready().await {
        Ok(()) => {
            tracing::info!("Secret cache synced");
            readiness.mark_ready();
        }
        Err(e) => tracing::warn!(error = ?e, "Secret cache stopped before initial sync"),
    }
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
