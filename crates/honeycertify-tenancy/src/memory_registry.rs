//! In-memory `TenantRegistry` for tests and single-process development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use honeycertify_core::{
    ConnectionDescriptor, Error, ProvisioningRecord, ProvisioningState, Result, TenantConfig,
    TenantId, TenantRegistry,
};

/// Process-local registry. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryTenantRegistry {
    tenants: RwLock<HashMap<TenantId, TenantConfig>>,
    journal: RwLock<HashMap<TenantId, ProvisioningRecord>>,
}

impl InMemoryTenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with ready-made configs
    pub fn with_tenants(tenants: impl IntoIterator<Item = TenantConfig>) -> Self {
        let registry = Self::new();
        {
            let mut map = registry.tenants.write();
            for config in tenants {
                map.insert(config.id.clone(), config);
            }
        }
        registry
    }

    fn update<F>(&self, id: &TenantId, f: F) -> Result<()>
    where
        F: FnOnce(&mut TenantConfig),
    {
        let mut tenants = self.tenants.write();
        let config = tenants
            .get_mut(id)
            .ok_or_else(|| Error::TenantNotFound(id.to_string()))?;
        f(config);
        Ok(())
    }
}

#[async_trait]
impl TenantRegistry for InMemoryTenantRegistry {
    async fn fetch(&self, id: &TenantId) -> Result<Option<TenantConfig>> {
        Ok(self.tenants.read().get(id).cloned())
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantConfig>> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|c| c.subdomain == subdomain)
            .cloned())
    }

    async fn upsert(&self, config: &TenantConfig) -> Result<()> {
        let mut tenants = self.tenants.write();
        if tenants
            .values()
            .any(|c| c.subdomain == config.subdomain && c.id != config.id)
        {
            return Err(Error::InvalidTenant(format!(
                "Subdomain '{}' is already registered",
                config.subdomain
            )));
        }
        tenants.insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn set_state(&self, id: &TenantId, state: ProvisioningState) -> Result<()> {
        self.update(id, |c| c.state = state)
    }

    async fn set_active(&self, id: &TenantId, active: bool) -> Result<()> {
        self.update(id, |c| c.active = active)
    }

    async fn rotate_descriptor(
        &self,
        id: &TenantId,
        descriptor: &ConnectionDescriptor,
    ) -> Result<()> {
        self.update(id, |c| c.descriptor = descriptor.clone())
    }

    async fn list(&self) -> Result<Vec<TenantConfig>> {
        let mut tenants: Vec<TenantConfig> = self.tenants.read().values().cloned().collect();
        tenants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tenants)
    }

    async fn record_provisioning(&self, record: &ProvisioningRecord) -> Result<()> {
        self.journal
            .write()
            .insert(record.tenant_id.clone(), record.clone());
        Ok(())
    }

    async fn provisioning(&self, id: &TenantId) -> Result<Option<ProvisioningRecord>> {
        Ok(self.journal.read().get(id).cloned())
    }

    async fn stalled_provisioning(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<ProvisioningRecord>> {
        Ok(self
            .journal
            .read()
            .values()
            .filter(|r| r.state.is_before_registered() && r.updated_at < before)
            .cloned()
            .collect())
    }
}
