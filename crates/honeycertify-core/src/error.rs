//! Error types for HoneyCertify Core

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The provisioning step that a `Error::Provisioning` failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStep {
    /// Input validation before anything is created
    Validate,
    /// Physically creating the tenant's backing store
    CreateStore,
    /// Persisting the tenant config in the master registry
    Register,
    /// Applying schema migrations to the new store
    ApplyMigrations,
    /// Flipping the registry entry to `Ready`
    Activate,
    /// Tearing down an abandoned store
    Cleanup,
}

impl ProvisioningStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStep::Validate => "validate",
            ProvisioningStep::CreateStore => "create_store",
            ProvisioningStep::Register => "register",
            ProvisioningStep::ApplyMigrations => "apply_migrations",
            ProvisioningStep::Activate => "activate",
            ProvisioningStep::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    // Multi-tenancy errors
    #[error("Tenant could not be resolved from the request")]
    TenantNotResolved,

    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("Provisioning failed at step '{step}': {message}")]
    Provisioning {
        step: ProvisioningStep,
        message: String,
    },

    // Data store errors
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),

    // Auth errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a provisioning failure for `step`.
    pub fn provisioning(step: ProvisioningStep, message: impl Into<String>) -> Self {
        Error::Provisioning {
            step,
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(_))
    }

    /// Stable machine-readable error kind, used in HTTP error bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::TenantNotResolved => "tenant_not_resolved",
            Error::TenantNotFound(_) => "tenant_not_found",
            Error::InvalidTenant(_) => "invalid_tenant",
            Error::Provisioning { .. } => "provisioning_failure",
            Error::Connection(_) => "connection_failure",
            Error::Timeout(_) => "timeout",
            Error::Database(_) => "database_error",
            Error::Unauthorized(_) => "unauthorized",
            Error::Config(_) => "config_error",
            Error::Internal(_) => "internal_error",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::Connection("refused".to_string()).is_retryable());
        assert!(Error::Timeout("acquire".to_string()).is_retryable());
        assert!(!Error::TenantNotFound("acme".to_string()).is_retryable());
        assert!(!Error::TenantNotResolved.is_retryable());
    }

    #[test]
    fn test_provisioning_error_names_step() {
        let err = Error::provisioning(ProvisioningStep::ApplyMigrations, "exit status 1");
        assert_eq!(
            err.to_string(),
            "Provisioning failed at step 'apply_migrations': exit status 1"
        );
        assert_eq!(err.kind(), "provisioning_failure");
    }
}
