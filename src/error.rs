//! Error types for the trust bundle controller
//!
//! Only configuration errors are fatal. Everything else is handed back to the
//! controller's error policy, which decides whether the Secret is requeued.

use thiserror::Error;

/// Main error type for dapr-cert-transformer operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error (read, write, or optimistic concurrency conflict)
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Invalid or missing startup configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what is missing or invalid
        message: String,
    },

    /// A delivered object is missing identifying metadata
    #[error("object is missing metadata.{field}")]
    MissingMetadata {
        /// The missing metadata field (`name`, `namespace`, `resourceVersion`)
        field: &'static str,
    },
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an error for a missing metadata field
    pub fn missing_metadata(field: &'static str) -> Self {
        Self::MissingMetadata { field }
    }

    /// HTTP status code of the underlying API error, if any
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(ae)) => Some(ae.code),
            _ => None,
        }
    }

    /// The write was rejected because the Secret changed since it was read
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    /// The watched Secret does not exist
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// Check if this error is retryable
    ///
    /// Every API or transport failure is retried: a forbidden write succeeds
    /// once RBAC is fixed and a missing Secret may be created later. Only
    /// errors in the request itself are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(_) => true,
            Error::Config { .. } => false,
            Error::MissingMetadata { .. } => false,
        }
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} (test)"),
        reason: reason.to_string(),
        code,
    }))
}
