//! Startup configuration
//!
//! Flags are parsed once in `main` into [`ControllerArgs`], resolved against
//! the hosting environment, and frozen into a [`Config`] that is shared by
//! reference with the reconciler for the rest of the process lifetime.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{
    Error, Result, DEFAULT_DEST_CERT_KEY, DEFAULT_DEST_KEY_KEY, DEFAULT_HEALTH_PROBE_ADDRESS,
    DEFAULT_SOURCE_CERT_KEY, DEFAULT_SOURCE_KEY_KEY, DEFAULT_TRUST_BUNDLE_NAME,
    POD_NAMESPACE_ENV,
};

/// dapr-cert-transformer - copies renewed cert-manager material into the Dapr trust bundle
#[derive(Parser, Debug, Clone)]
#[command(name = "dapr-cert-transformer", version, about, long_about = None)]
pub struct ControllerArgs {
    /// Namespace of the watched Secret (defaults to $POD_NAMESPACE)
    #[arg(long, env = "WATCH_SECRET_NAMESPACE", default_value = "")]
    pub watch_secret_namespace: String,

    /// Name of the watched Secret
    #[arg(long, env = "WATCH_SECRET_NAME", default_value = DEFAULT_TRUST_BUNDLE_NAME)]
    pub watch_secret_name: String,

    /// Secret field holding the renewed certificate
    #[arg(long, env = "SOURCE_CERT_SECRET_KEY", default_value = DEFAULT_SOURCE_CERT_KEY)]
    pub source_cert_secret_key: String,

    /// Secret field receiving the certificate
    #[arg(long, env = "DEST_CERT_SECRET_KEY", default_value = DEFAULT_DEST_CERT_KEY)]
    pub dest_cert_secret_key: String,

    /// Secret field holding the renewed private key
    #[arg(long, env = "SOURCE_KEY_SECRET_KEY", default_value = DEFAULT_SOURCE_KEY_KEY)]
    pub source_key_secret_key: String,

    /// Secret field receiving the private key
    #[arg(long, env = "DEST_KEY_SECRET_KEY", default_value = DEFAULT_DEST_KEY_KEY)]
    pub dest_key_secret_key: String,

    /// Path to a kubeconfig file (falls back to $KUBECONFIG, ~/.kube/config, then in-cluster)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Address the liveness/readiness probe server binds to
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = DEFAULT_HEALTH_PROBE_ADDRESS)]
    pub health_probe_bind_address: SocketAddr,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable single-line output
    Text,
    /// One JSON object per line
    Json,
}

/// The one Secret this process watches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    /// Namespace of the trust bundle Secret
    pub namespace: String,
    /// Name of the trust bundle Secret
    pub name: String,
}

impl WatchTarget {
    /// Returns true iff `(namespace, name)` is exactly this target
    pub fn matches(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }

    /// Field selector restricting a watch to this Secret
    pub fn field_selector(&self) -> String {
        format!("metadata.name={}", self.name)
    }
}

/// Which Secret fields are compared and copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMapping {
    /// Field holding the source certificate
    pub source_cert_key: String,
    /// Field receiving the certificate
    pub dest_cert_key: String,
    /// Field holding the source private key
    pub source_key_key: String,
    /// Field receiving the private key
    pub dest_key_key: String,
}

impl Default for KeyMapping {
    fn default() -> Self {
        Self {
            source_cert_key: DEFAULT_SOURCE_CERT_KEY.to_string(),
            dest_cert_key: DEFAULT_DEST_CERT_KEY.to_string(),
            source_key_key: DEFAULT_SOURCE_KEY_KEY.to_string(),
            dest_key_key: DEFAULT_DEST_KEY_KEY.to_string(),
        }
    }
}

/// Immutable controller configuration, built once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The watched Secret
    pub target: WatchTarget,
    /// Source/destination field names
    pub keys: KeyMapping,
}

impl Config {
    /// Resolve parsed flags into a validated configuration
    ///
    /// An empty `--watch-secret-namespace` falls back to `pod_namespace`
    /// (normally `$POD_NAMESPACE`). Fails when neither yields a namespace or
    /// when any name or field is empty.
    pub fn from_args(args: &ControllerArgs, pod_namespace: Option<String>) -> Result<Self> {
        let namespace = if args.watch_secret_namespace.is_empty() {
            match pod_namespace.filter(|ns| !ns.is_empty()) {
                Some(ns) => ns,
                None => {
                    return Err(Error::config(format!(
                        "could not identify namespace to watch: \
                         --watch-secret-namespace is empty and {POD_NAMESPACE_ENV} is not set"
                    )))
                }
            }
        } else {
            args.watch_secret_namespace.clone()
        };

        let config = Self {
            target: WatchTarget {
                namespace,
                name: args.watch_secret_name.clone(),
            },
            keys: KeyMapping {
                source_cert_key: args.source_cert_secret_key.clone(),
                dest_cert_key: args.dest_cert_secret_key.clone(),
                source_key_key: args.source_key_secret_key.clone(),
                dest_key_key: args.dest_key_secret_key.clone(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve flags using `$POD_NAMESPACE` from the process environment
    pub fn from_env(args: &ControllerArgs) -> Result<Self> {
        Self::from_args(args, std::env::var(POD_NAMESPACE_ENV).ok())
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("watch-secret-name", &self.target.name),
            ("source-cert-secret-key", &self.keys.source_cert_key),
            ("dest-cert-secret-key", &self.keys.dest_cert_key),
            ("source-key-secret-key", &self.keys.source_key_key),
            ("dest-key-secret-key", &self.keys.dest_key_key),
        ];
        for (flag, value) in fields {
            if value.is_empty() {
                return Err(Error::config(format!("--{flag} must not be empty")));
            }
        }
        Ok(())
    }
}
