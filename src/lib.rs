//! dapr-cert-transformer - keeps the Dapr trust bundle in sync with cert-manager
//!
//! cert-manager style issuers write renewed certificates under the conventional
//! `tls.crt`/`tls.key` keys of a Secret, while Dapr reads its issuer material
//! from `issuer.crt`/`issuer.key` of the same `dapr-trust-bundle` Secret. This
//! controller watches that one Secret and copies the source pair over the
//! destination pair whenever they diverge.
//!
//! # Modules
//!
//! - [`config`] - Command line/environment configuration and the immutable [`Config`]
//! - [`controller`] - Trust bundle reconciliation and the kube-runtime controller wiring
//! - [`health`] - Liveness and readiness HTTP probes
//! - [`telemetry`] - Logging initialization
//! - [`error`] - Error types for the controller

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod health;
pub mod telemetry;

pub use config::Config;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Program name reported by `--version` and used as the field manager
pub const PROGRAM_NAME: &str = "dapr-cert-transformer";

/// Default name of the watched Secret
pub const DEFAULT_TRUST_BUNDLE_NAME: &str = "dapr-trust-bundle";

/// Default field holding the renewed certificate
pub const DEFAULT_SOURCE_CERT_KEY: &str = "tls.crt";

/// Default field Dapr reads the issuer certificate from
pub const DEFAULT_DEST_CERT_KEY: &str = "issuer.crt";

/// Default field holding the renewed private key
pub const DEFAULT_SOURCE_KEY_KEY: &str = "tls.key";

/// Default field Dapr reads the issuer private key from
pub const DEFAULT_DEST_KEY_KEY: &str = "issuer.key";

/// Default bind address for the health probe server
pub const DEFAULT_HEALTH_PROBE_ADDRESS: &str = "0.0.0.0:8081";

/// Environment variable used to discover the namespace when none is configured
///
/// Set through the Deployment downward API (`metadata.namespace`).
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";
