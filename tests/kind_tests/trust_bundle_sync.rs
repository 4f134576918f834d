//! Integration tests for trust bundle synchronization
//!
//! Each story starts a controller scoped to one Secret name, mutates Secrets
//! through the API server like cert-manager would, and observes the result.

use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};

use super::helpers::{
    delete_secret, ensure_test_namespace, read_field, recreate_secret, secret, start_controller,
    wait_for_field, TEST_NAMESPACE,
};

const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Story: cert-manager writes a fresh certificate into a new trust bundle
///
/// The issuer fields do not exist yet. The controller copies `tls.crt` and
/// `tls.key` into `issuer.crt` and `issuer.key`.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_initial_issuer_material_is_populated() {
    let client = ensure_test_namespace()
        .await
        .expect("failed to setup cluster");
    let name = "trust-bundle-initial";

    recreate_secret(
        &client,
        &secret(name, &[("tls.crt", "CERT-1"), ("tls.key", "KEY-1"), ("ca.crt", "CA")]),
    )
    .await;
    let controller = start_controller(client.clone(), name).await;

    assert!(wait_for_field(&client, name, "issuer.crt", "CERT-1", SYNC_TIMEOUT).await);
    assert!(wait_for_field(&client, name, "issuer.key", "KEY-1", SYNC_TIMEOUT).await);
    assert_eq!(
        read_field(&client, name, "ca.crt").await.as_deref(),
        Some("CA")
    );

    controller.abort();
    delete_secret(&client, name).await;
}

/// Story: cert-manager renews the certificate
///
/// The trust bundle was in sync, then `tls.crt`/`tls.key` change. The issuer
/// fields follow.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_renewal_is_copied_into_issuer_fields() {
    let client = ensure_test_namespace()
        .await
        .expect("failed to setup cluster");
    let name = "trust-bundle-renewal";

    recreate_secret(
        &client,
        &secret(
            name,
            &[
                ("tls.crt", "OLD-CERT"),
                ("tls.key", "OLD-KEY"),
                ("issuer.crt", "OLD-CERT"),
                ("issuer.key", "OLD-KEY"),
            ],
        ),
    )
    .await;
    let controller = start_controller(client.clone(), name).await;

    let api: Api<Secret> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let mut renewed = api.get(name).await.expect("failed to get secret");
    if let Some(data) = renewed.data.as_mut() {
        data.insert("tls.crt".to_string(), ByteString(b"NEW-CERT".to_vec()));
        data.insert("tls.key".to_string(), ByteString(b"NEW-KEY".to_vec()));
    }
    api.replace(name, &PostParams::default(), &renewed)
        .await
        .expect("failed to renew secret");

    assert!(wait_for_field(&client, name, "issuer.crt", "NEW-CERT", SYNC_TIMEOUT).await);
    assert!(wait_for_field(&client, name, "issuer.key", "NEW-KEY", SYNC_TIMEOUT).await);

    controller.abort();
    delete_secret(&client, name).await;
}

/// Story: another Secret in the same namespace is never touched
///
/// Only the configured trust bundle is reconciled, even when another Secret
/// carries the same field layout.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_unrelated_secret_is_left_alone() {
    let client = ensure_test_namespace()
        .await
        .expect("failed to setup cluster");
    let watched = "trust-bundle-watched";
    let other = "trust-bundle-unrelated";

    recreate_secret(&client, &secret(watched, &[("tls.crt", "C"), ("tls.key", "K")])).await;
    recreate_secret(&client, &secret(other, &[("tls.crt", "C"), ("tls.key", "K")])).await;
    let controller = start_controller(client.clone(), watched).await;

    assert!(wait_for_field(&client, watched, "issuer.crt", "C", SYNC_TIMEOUT).await);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(read_field(&client, other, "issuer.crt").await, None);

    controller.abort();
    delete_secret(&client, watched).await;
    delete_secret(&client, other).await;
}

/// Story: the trust bundle has no renewed material yet
///
/// With `tls.key` missing the controller writes nothing and keeps waiting.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_incomplete_source_is_not_copied() {
    let client = ensure_test_namespace()
        .await
        .expect("failed to setup cluster");
    let name = "trust-bundle-incomplete";

    let created = recreate_secret(&client, &secret(name, &[("tls.crt", "CERT")])).await;
    let controller = start_controller(client.clone(), name).await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    let api: Api<Secret> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let current = api.get(name).await.expect("failed to get secret");
    assert_eq!(
        current.metadata.resource_version,
        created.metadata.resource_version
    );
    assert_eq!(read_field(&client, name, "issuer.crt").await, None);

    controller.abort();
    delete_secret(&client, name).await;
}
