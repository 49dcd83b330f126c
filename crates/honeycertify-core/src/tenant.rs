//! Tenant types for multi-tenancy support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, ProvisioningStep, Result};

/// Maximum identifier length (a PostgreSQL identifier is at most 63 bytes).
pub const MAX_TENANT_ID_LEN: usize = 63;

/// Unique identifier for a tenant.
///
/// Identifiers are opaque, but restricted to `[A-Za-z0-9_-]` so they can be
/// embedded in a store name or a connection URL without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Parse a tenant ID from a string
    pub fn new(s: impl AsRef<str>) -> Result<Self> {
        let s = s.as_ref().trim();
        if s.is_empty() {
            return Err(Error::InvalidTenant("tenant ID cannot be empty".to_string()));
        }
        if s.len() > MAX_TENANT_ID_LEN {
            return Err(Error::InvalidTenant(format!(
                "tenant ID exceeds {} characters",
                MAX_TENANT_ID_LEN
            )));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(Error::InvalidTenant(format!(
                "tenant ID contains invalid character '{}'",
                c
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Address of a tenant's dedicated data store (URL-style).
///
/// `Debug` and `Display` never print the password component.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionDescriptor(String);

impl ConnectionDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Full address including credentials. Only hand this to a driver.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Address with the password replaced by `***`
    pub fn redacted(&self) -> String {
        let Some(scheme_end) = self.0.find("://") else {
            return self.0.clone();
        };
        let rest = &self.0[scheme_end + 3..];
        // Userinfo ends at the last '@' of the authority
        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let Some(at) = rest[..authority_end].rfind('@') else {
            return self.0.clone();
        };
        let userinfo = &rest[..at];
        match userinfo.find(':') {
            Some(colon) => format!(
                "{}{}:***{}",
                &self.0[..scheme_end + 3],
                &userinfo[..colon],
                &rest[at..]
            ),
            None => self.0.clone(),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionDescriptor")
            .field(&self.redacted())
            .finish()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Lifecycle of a tenant from the provisioning request until it can serve traffic.
///
/// Transitions only move forward:
/// `Requested → StoreCreated → Registered → MigrationsApplied → Ready`.
/// `Abandoned` is terminal and only reachable from states before `Registered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Requested,
    StoreCreated,
    Registered,
    MigrationsApplied,
    Ready,
    Abandoned,
}

impl ProvisioningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningState::Requested => "requested",
            ProvisioningState::StoreCreated => "store_created",
            ProvisioningState::Registered => "registered",
            ProvisioningState::MigrationsApplied => "migrations_applied",
            ProvisioningState::Ready => "ready",
            ProvisioningState::Abandoned => "abandoned",
        }
    }

    /// The step that moves a tenant out of this state, if any.
    pub fn next_step(&self) -> Option<ProvisioningStep> {
        match self {
            ProvisioningState::Requested => Some(ProvisioningStep::CreateStore),
            ProvisioningState::StoreCreated => Some(ProvisioningStep::Register),
            ProvisioningState::Registered => Some(ProvisioningStep::ApplyMigrations),
            ProvisioningState::MigrationsApplied => Some(ProvisioningStep::Activate),
            ProvisioningState::Ready | ProvisioningState::Abandoned => None,
        }
    }

    /// Whether the cleanup path may tear the store down.
    pub fn is_before_registered(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Requested | ProvisioningState::StoreCreated
        )
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisioningState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "requested" => Ok(ProvisioningState::Requested),
            "store_created" => Ok(ProvisioningState::StoreCreated),
            "registered" => Ok(ProvisioningState::Registered),
            "migrations_applied" => Ok(ProvisioningState::MigrationsApplied),
            "ready" => Ok(ProvisioningState::Ready),
            "abandoned" => Ok(ProvisioningState::Abandoned),
            other => Err(Error::Database(format!(
                "Unknown provisioning state '{}'",
                other
            ))),
        }
    }
}

/// Registry entry describing one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: TenantId,
    /// Display name (the company name given at provisioning)
    pub name: String,
    #[serde(skip)]
    pub descriptor: ConnectionDescriptor,
    pub subdomain: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub state: ProvisioningState,
}

impl TenantConfig {
    /// Whether requests may be routed to this tenant
    pub fn is_servable(&self) -> bool {
        self.active && self.state == ProvisioningState::Ready
    }
}

/// Journal entry tracking one provisioning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningRecord {
    pub tenant_id: TenantId,
    pub company_name: String,
    pub subdomain: String,
    pub store_name: String,
    #[serde(skip)]
    pub descriptor: ConnectionDescriptor,
    pub state: ProvisioningState,
    /// Last failure, prefixed with the step that produced it
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProvisioningRecord {
    /// Config as it is registered at the `Registered` step
    pub fn to_config(&self, state: ProvisioningState) -> TenantConfig {
        TenantConfig {
            id: self.tenant_id.clone(),
            name: self.company_name.clone(),
            descriptor: self.descriptor.clone(),
            subdomain: self.subdomain.clone(),
            created_at: self.updated_at,
            active: true,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_from_string() {
        let tenant_id = TenantId::new("acme").unwrap();
        assert_eq!(tenant_id.to_string(), "acme");
        assert_eq!(TenantId::new("  a1b2c3d4e5f6 ").unwrap().as_str(), "a1b2c3d4e5f6");
    }

    #[test]
    fn test_tenant_id_rejects_invalid() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("   ").is_err());
        assert!(TenantId::new("../etc").is_err());
        assert!(TenantId::new("acme corp").is_err());
        assert!(TenantId::new("a".repeat(64)).is_err());
    }

    #[test]
    fn test_tenant_id_serde() {
        let id: TenantId = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(id.as_str(), "acme");
        assert!(serde_json::from_str::<TenantId>("\"a/b\"").is_err());
    }

    #[test]
    fn test_descriptor_redacts_password() {
        let d = ConnectionDescriptor::new("postgres://app:s3cret@db:5432/tenant_abc");
        assert_eq!(d.redacted(), "postgres://app:***@db:5432/tenant_abc");
        assert!(!format!("{:?}", d).contains("s3cret"));
        assert!(!d.to_string().contains("s3cret"));
        assert_eq!(d.expose(), "postgres://app:s3cret@db:5432/tenant_abc");
    }

    #[test]
    fn test_descriptor_redacts_password_containing_at() {
        let d = ConnectionDescriptor::new("postgres://app:p@ss@db:5432/tenant_abc?user=x@y");
        assert_eq!(d.redacted(), "postgres://app:***@db:5432/tenant_abc?user=x@y");
        assert!(!d.to_string().contains("ss@db"));
    }

    #[test]
    fn test_tenant_config_json_omits_descriptor() {
        let config = TenantConfig {
            id: TenantId::new("a1b2c3").unwrap(),
            name: "Acme Honey".to_string(),
            descriptor: ConnectionDescriptor::new("postgres://app:s3cret@db/tenant_a1b2c3"),
            subdomain: "acme".to_string(),
            created_at: Utc::now(),
            active: true,
            state: ProvisioningState::Ready,
        };

        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("descriptor").is_none());

        let parsed: TenantConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.id, config.id);
        assert_eq!(parsed.created_at, config.created_at);
        assert_eq!(parsed.descriptor, ConnectionDescriptor::default());
    }

    #[test]
    fn test_descriptor_without_credentials() {
        let d = ConnectionDescriptor::new("postgres://db/tenant_abc");
        assert_eq!(d.redacted(), "postgres://db/tenant_abc");
    }

    #[test]
    fn test_provisioning_state_order() {
        assert!(ProvisioningState::Requested < ProvisioningState::StoreCreated);
        assert!(ProvisioningState::MigrationsApplied < ProvisioningState::Ready);
        assert!(ProvisioningState::StoreCreated.is_before_registered());
        assert!(!ProvisioningState::Registered.is_before_registered());
        assert_eq!(ProvisioningState::Ready.next_step(), None);
        assert_eq!(
            "migrations_applied".parse::<ProvisioningState>().unwrap(),
            ProvisioningState::MigrationsApplied
        );
    }
}
