//! dapr-cert-transformer - syncs cert-manager output into the Dapr trust bundle

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;

use dapr_cert_transformer::config::ControllerArgs;
use dapr_cert_transformer::controller::build_trust_bundle_controller;
use dapr_cert_transformer::health::{self, ReadinessState};
use dapr_cert_transformer::telemetry::init_logging;
use dapr_cert_transformer::Config;

/// Connect timeout for the API server
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read timeout for the API server - must exceed the watch timeout
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --version and --help print and exit here
    let args = ControllerArgs::parse();

    init_logging(args.log_format)?;

    let config = match Config::from_env(&args) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %config.target.namespace,
        secret = %config.target.name,
        "dapr-cert-transformer starting..."
    );

    let client = create_client(args.kubeconfig.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let readiness = ReadinessState::new();
    let listener = health::bind(args.health_probe_bind_address)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to bind health probe server on {}: {}",
                args.health_probe_bind_address,
                e
            )
        })?;
    let health_task = tokio::spawn(health::serve(listener, readiness.clone()));

    tracing::info!("Starting controllers...");
    futures::future::join_all(build_trust_bundle_controller(client, config, readiness)).await;

    health_task.abort();
    tracing::info!("Shutting down");
    Ok(())
}

/// Create a kube client from an explicit kubeconfig path, or infer one
///
/// Inference tries `$KUBECONFIG`, then `~/.kube/config`, then the in-cluster
/// service account.
async fn create_client(kubeconfig: Option<&Path>) -> anyhow::Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| anyhow::anyhow!("failed to read kubeconfig {:?}: {}", path, e))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| anyhow::anyhow!("failed to load kubeconfig: {}", e))?
        }
        None => kube::Config::infer()
            .await
            .map_err(|e| anyhow::anyhow!("failed to infer kubeconfig: {}", e))?,
    };
    config.connect_timeout = Some(CONNECT_TIMEOUT);
    config.read_timeout = Some(READ_TIMEOUT);
    Client::try_from(config).map_err(|e| anyhow::anyhow!("failed to create client: {}", e))
}
