//! Trust bundle reconciliation
//!
//! Keeps the destination fields of the watched Secret equal to its source
//! fields. Each reconciliation is a stateless read-check-write against the API
//! server:
//!
//! 1. Ignore anything that is not the configured `(namespace, name)`.
//! 2. Read the Secret fresh from the API server.
//! 3. If both source fields exist and either destination differs, copy both.
//! 4. Write the whole Secret back with `replace`, conditioned on the
//!    `resourceVersion` that was read.
//!
//! Duplicate or overlapping invocations are safe because the write fails with
//! 409 Conflict whenever the Secret moved after the read.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::{Config, KeyMapping, WatchTarget};
use crate::{Error, Result, PROGRAM_NAME};

/// Requeue delay after a write lost an optimistic concurrency race
pub const REQUEUE_CONFLICT_SECS: u64 = 1;

/// Requeue delay after any other transient failure
pub const REQUEUE_ERROR_SECS: u64 = 30;

// =============================================================================
// Remote store seam
// =============================================================================

/// Reads and conditionally writes the watched Secret
///
/// The production implementation talks to the API server; tests substitute a
/// mock so the reconciliation logic runs without a cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the current state of a Secret, including its `resourceVersion`
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    /// Replace a Secret wholesale
    ///
    /// Must fail if the stored `resourceVersion` no longer matches the one in
    /// `secret.metadata`.
    async fn replace_secret(&self, secret: &Secret) -> Result<Secret>;
}

/// [`SecretStore`] backed by the Kubernetes API
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    /// Create a store wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret> {
        let namespace = secret
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::missing_metadata("namespace"))?;
        let name = secret
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::missing_metadata("name"))?;
        // PUT without a resourceVersion is an unconditional overwrite
        if secret.metadata.resource_version.is_none() {
            return Err(Error::missing_metadata("resourceVersion"));
        }

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            field_manager: Some(PROGRAM_NAME.to_string()),
            ..Default::default()
        };
        Ok(api.replace(name, &params, secret).await?)
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// Controller context shared across reconciliations
pub struct Context {
    /// Secret reads and writes
    pub store: Arc<dyn SecretStore>,
    /// Immutable startup configuration
    pub config: Arc<Config>,
}

impl Context {
    /// Create a context with the given store
    pub fn new(store: Arc<dyn SecretStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    /// Create a context talking to the API server through `client`
    pub fn from_client(client: Client, config: Arc<Config>) -> Self {
        Self::new(Arc::new(KubeSecretStore::new(client)), config)
    }
}

// =============================================================================
// Decision logic
// =============================================================================

/// Non-error result of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The object is not the watched Secret; nothing was read or written
    Skipped,
    /// Destination fields already match the source fields; nothing was written
    AlreadySynchronized,
    /// Destination fields were overwritten and the Secret was written back
    Synchronized,
}

/// Returns true iff `secret` identifies the configured trust bundle
pub fn is_watched_resource(target: &WatchTarget, secret: &ObjectRef<Secret>) -> bool {
    secret
        .namespace
        .as_deref()
        .is_some_and(|ns| target.matches(ns, &secret.name))
}

/// Returns true iff both source fields exist and either destination differs
///
/// Comparison is exact byte equality. A missing destination field never
/// equals a present source field.
pub fn needs_update(data: &BTreeMap<String, ByteString>, keys: &KeyMapping) -> bool {
    let (Some(cert), Some(key)) = (
        data.get(&keys.source_cert_key),
        data.get(&keys.source_key_key),
    ) else {
        return false;
    };

    data.get(&keys.dest_cert_key) != Some(cert) || data.get(&keys.dest_key_key) != Some(key)
}

/// Overwrite both destination fields with the source fields
///
/// The pair is always copied together, even when only one side diverged.
pub fn copy_source_to_destination(data: &mut BTreeMap<String, ByteString>, keys: &KeyMapping) {
    if let Some(cert) = data.get(&keys.source_cert_key).cloned() {
        data.insert(keys.dest_cert_key.clone(), cert);
    }
    if let Some(key) = data.get(&keys.source_key_key).cloned() {
        data.insert(keys.dest_key_key.clone(), key);
    }
}

/// Bring the identified Secret's destination fields in line with its sources
///
/// Read and write failures are returned untouched; retrying is left to the
/// controller's error policy.
pub async fn sync_trust_bundle(
    identity: &ObjectRef<Secret>,
    ctx: &Context,
) -> Result<ReconcileOutcome> {
    let target = &ctx.config.target;
    if !is_watched_resource(target, identity) {
        info!(
            secret = %identity.name,
            namespace = ?identity.namespace,
            "Avoid reconciling other secret"
        );
        return Ok(ReconcileOutcome::Skipped);
    }

    let mut secret = ctx
        .store
        .get_secret(&target.namespace, &target.name)
        .await
        .inspect_err(|e| error!(error = %e, "Failed to get secret"))?;

    let keys = &ctx.config.keys;
    let Some(data) = secret.data.as_mut().filter(|data| needs_update(data, keys)) else {
        info!("Already up-to-date");
        return Ok(ReconcileOutcome::AlreadySynchronized);
    };

    copy_source_to_destination(data, keys);
    debug!(
        resource_version = ?secret.metadata.resource_version,
        source_cert = %keys.source_cert_key,
        dest_cert = %keys.dest_cert_key,
        source_key = %keys.source_key_key,
        dest_key = %keys.dest_key_key,
        "Copying source fields into destination fields"
    );

    ctx.store
        .replace_secret(&secret)
        .await
        .inspect_err(|e| error!(error = %e, conflict = e.is_conflict(), "Failed to update secret"))?;

    info!("Successful reconciliation");
    Ok(ReconcileOutcome::Synchronized)
}

// =============================================================================
// kube-runtime integration
// =============================================================================

/// Reconcile a Secret delivered by the controller
///
/// Only the identity of the delivered object is used; the payload is always
/// re-read so decisions never rest on a stale cache entry.
#[instrument(skip(secret, ctx), fields(secret = %secret.name_any()))]
pub async fn reconcile(secret: Arc<Secret>, ctx: Arc<Context>) -> Result<Action> {
    debug!("reconciling trust bundle");
    let identity = ObjectRef::from_obj(secret.as_ref());
    let outcome = sync_trust_bundle(&identity, &ctx).await?;
    debug!(?outcome, "reconciliation finished");

    // The watch delivers the next change; no periodic resync is needed
    Ok(Action::await_change())
}

/// Error policy for the trust bundle controller
///
/// - Conflicts: requeue almost immediately to retry against fresh state
/// - Other API and transport errors (including not found and forbidden):
///   requeue after [`REQUEUE_ERROR_SECS`]
/// - Errors in the delivered object itself: wait for the next change
pub fn error_policy(secret: Arc<Secret>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(
        ?error,
        secret = %secret.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_conflict() {
        Action::requeue(Duration::from_secs(REQUEUE_CONFLICT_SECS))
    } else if error.is_retryable() {
        Action::requeue(Duration::from_secs(REQUEUE_ERROR_SECS))
    } else {
        Action::await_change()
    }
}
