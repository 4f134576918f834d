//! Shared setup for the kind integration tests

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tokio::task::JoinHandle;

use dapr_cert_transformer::config::{KeyMapping, WatchTarget};
use dapr_cert_transformer::controller::build_trust_bundle_controller;
use dapr_cert_transformer::health::ReadinessState;
use dapr_cert_transformer::Config;

/// Namespace all test Secrets live in
pub const TEST_NAMESPACE: &str = "dapr-cert-transformer-test";

/// Connect to the cluster and make sure the test namespace exists
pub async fn ensure_test_namespace() -> Result<Client, String> {
    let client = Client::try_default()
        .await
        .map_err(|e| format!("failed to create client: {}", e))?;

    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 409 => {}
        Err(e) => return Err(format!("failed to create namespace: {}", e)),
    }
    Ok(client)
}

/// Build a Secret with the given string fields
pub fn secret(name: &str, fields: &[(&str, &str)]) -> Secret {
    let data: BTreeMap<String, ByteString> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
        .collect();
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Create a Secret, replacing any leftover from an earlier run
pub async fn recreate_secret(client: &Client, secret: &Secret) -> Secret {
    let api: Api<Secret> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = secret.metadata.name.clone().unwrap_or_default();
    delete_secret(client, &name).await;
    api.create(&PostParams::default(), secret)
        .await
        .expect("failed to create secret")
}

/// Best-effort cleanup
pub async fn delete_secret(client: &Client, name: &str) {
    let api: Api<Secret> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Read a field of a Secret as a string
pub async fn read_field(client: &Client, name: &str, field: &str) -> Option<String> {
    let api: Api<Secret> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let secret = api.get(name).await.ok()?;
    let bytes = secret.data?.get(field)?.0.clone();
    String::from_utf8(bytes).ok()
}

/// Poll until `field` of Secret `name` equals `expected` or the timeout passes
pub async fn wait_for_field(
    client: &Client,
    name: &str,
    field: &str,
    expected: &str,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if read_field(client, name, field).await.as_deref() == Some(expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

/// Run the controller for `secret_name` in the background until the handle is aborted
pub async fn start_controller(client: Client, secret_name: &str) -> JoinHandle<()> {
    let config = Arc::new(Config {
        target: WatchTarget {
            namespace: TEST_NAMESPACE.to_string(),
            name: secret_name.to_string(),
        },
        keys: KeyMapping::default(),
    });
    let readiness = ReadinessState::new();
    let futures = build_trust_bundle_controller(client, config, readiness.clone());
    let handle = tokio::spawn(async move {
        futures::future::join_all(futures).await;
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !readiness.is_ready() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(readiness.is_ready(), "secret cache never synced");
    handle
}
