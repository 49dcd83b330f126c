//! Master registry trait
//!
//! The `TenantRegistry` trait is the authoritative store of tenant configurations
//! and of the provisioning journal. Implementations:
//! - `PostgresTenantRegistry`: PostgreSQL master database (production)
//! - `InMemoryTenantRegistry`: process-local maps (tests, local development)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Result,
    tenant::{ConnectionDescriptor, ProvisioningRecord, ProvisioningState, TenantConfig, TenantId},
};

/// Master registry of tenants
///
/// # Example
/// ```no_run
/// # use honeycertify_core::{TenantRegistry, TenantId};
/// # async fn example(registry: &dyn TenantRegistry) -> honeycertify_core::Result<()> {
/// let id = TenantId::new("a1b2c3d4e5f6")?;
/// if let Some(config) = registry.fetch(&id).await? {
///     println!("{} lives at {}", config.name, config.descriptor);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Look up a tenant by its identifier
    ///
    /// Returns `Ok(None)` when no tenant is registered under `id`,
    /// whatever its state.
    async fn fetch(&self, id: &TenantId) -> Result<Option<TenantConfig>>;

    /// Look up a tenant by its subdomain label
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantConfig>>;

    /// Insert or replace a tenant config (keyed by `config.id`)
    ///
    /// # Errors
    /// - `Error::InvalidTenant` if the subdomain is taken by another tenant
    /// - `Error::Database` for storage errors
    async fn upsert(&self, config: &TenantConfig) -> Result<()>;

    /// Move a registered tenant to a new provisioning state
    ///
    /// # Errors
    /// - `Error::TenantNotFound` if the tenant is not registered
    async fn set_state(&self, id: &TenantId, state: ProvisioningState) -> Result<()>;

    /// Toggle the active flag
    ///
    /// # Errors
    /// - `Error::TenantNotFound` if the tenant is not registered
    async fn set_active(&self, id: &TenantId, active: bool) -> Result<()>;

    /// Replace the connection descriptor
    ///
    /// # Errors
    /// - `Error::TenantNotFound` if the tenant is not registered
    async fn rotate_descriptor(&self, id: &TenantId, descriptor: &ConnectionDescriptor)
    -> Result<()>;

    /// List all registered tenants, oldest first
    async fn list(&self) -> Result<Vec<TenantConfig>>;

    /// Insert or replace a provisioning journal entry
    async fn record_provisioning(&self, record: &ProvisioningRecord) -> Result<()>;

    /// Fetch the journal entry for a tenant
    async fn provisioning(&self, id: &TenantId) -> Result<Option<ProvisioningRecord>>;

    /// Journal entries still before `Registered` and last touched before `before`
    async fn stalled_provisioning(&self, before: DateTime<Utc>)
    -> Result<Vec<ProvisioningRecord>>;

    /// Check that the registry is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
