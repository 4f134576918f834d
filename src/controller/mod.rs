//! Controller for the Dapr trust bundle Secret
//!
//! [`trust_bundle`] holds the reconciliation logic; [`runner`] wires it into a
//! kube-runtime `Controller` watching the configured namespace.

pub mod runner;
pub mod trust_bundle;

pub use runner::{build_trust_bundle_controller, ControllerFuture};
pub use trust_bundle::{
    copy_source_to_destination, error_policy, is_watched_resource, needs_update, reconcile,
    sync_trust_bundle, Context, KubeSecretStore, ReconcileOutcome, SecretStore,
};
