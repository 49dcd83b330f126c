//! Tenant directory: cached view of the master registry
//!
//! Lookups accept either the opaque tenant id or the tenant's subdomain. Only
//! tenants that are active and fully provisioned resolve; everything else is
//! reported as `TenantNotFound`. Misses are never cached, so a tenant becomes
//! visible as soon as provisioning finishes.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use honeycertify_core::{
    ConnectionDescriptor, Error, Result, TenantConfig, TenantId, TenantRegistry,
};

pub struct TenantDirectory {
    registry: Arc<dyn TenantRegistry>,
    /// Keyed by the lookup key (id or subdomain alias)
    cache: DashMap<String, TenantConfig>,
}

impl TenantDirectory {
    pub fn new(registry: Arc<dyn TenantRegistry>) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<dyn TenantRegistry> {
        &self.registry
    }

    /// Resolve a lookup key to a servable tenant config
    ///
    /// The key is tried as a tenant id first and then as a subdomain. On a
    /// hit the config is cached under both the requested key and the
    /// canonical id.
    ///
    /// # Errors
    /// - `Error::TenantNotFound` if no active, ready tenant matches `key`
    /// - Registry errors are propagated unchanged
    pub async fn resolve_config(&self, key: &TenantId) -> Result<TenantConfig> {
        if let Some(cached) = self.cache.get(key.as_str())
            && cached.is_servable()
        {
            return Ok(cached.clone());
        }

        let found = match self.registry.fetch(key).await? {
            Some(config) => Some(config),
            None => self.registry.find_by_subdomain(key.as_str()).await?,
        };

        match found {
            Some(config) if config.is_servable() => {
                debug!(
                    key = %key,
                    tenant_id = %config.id,
                    "Tenant config loaded from registry"
                );
                self.cache.insert(key.as_str().to_string(), config.clone());
                if config.id != *key {
                    self.cache
                        .insert(config.id.as_str().to_string(), config.clone());
                }
                Ok(config)
            }
            Some(config) => {
                debug!(
                    tenant_id = %config.id,
                    active = config.active,
                    state = %config.state,
                    "Tenant exists but is not servable"
                );
                Err(Error::TenantNotFound(key.to_string()))
            }
            None => Err(Error::TenantNotFound(key.to_string())),
        }
    }

    /// Drop every cached entry (id and aliases) pointing at `id`
    pub fn invalidate(&self, id: &TenantId) {
        self.cache.retain(|_, config| config.id != *id);
    }

    /// Activate or deactivate a tenant and drop its cached config
    pub async fn set_active(&self, id: &TenantId, active: bool) -> Result<()> {
        self.registry.set_active(id, active).await?;
        self.invalidate(id);
        info!(tenant_id = %id, active, "Tenant activation changed");
        Ok(())
    }

    /// Persist a new connection descriptor and drop the cached config
    ///
    /// Callers holding open handles must also evict them from the handle
    /// cache for the new descriptor to take effect.
    pub async fn rotate_descriptor(
        &self,
        id: &TenantId,
        descriptor: &ConnectionDescriptor,
    ) -> Result<()> {
        self.registry.rotate_descriptor(id, descriptor).await?;
        self.invalidate(id);
        info!(tenant_id = %id, descriptor = %descriptor, "Tenant descriptor rotated");
        Ok(())
    }

    /// All registered tenants, servable or not
    pub async fn list(&self) -> Result<Vec<TenantConfig>> {
        self.registry.list().await
    }

    /// Number of cached lookup keys
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_registry::InMemoryTenantRegistry;
    use crate::testing::{CountingRegistry, ready_config};
    use honeycertify_core::ProvisioningState;

    fn setup(configs: Vec<TenantConfig>) -> (Arc<CountingRegistry>, TenantDirectory) {
        let inner = Arc::new(InMemoryTenantRegistry::with_tenants(configs));
        let registry = Arc::new(CountingRegistry::new(inner));
        let directory = TenantDirectory::new(registry.clone());
        (registry, directory)
    }

    fn id(s: &str) -> TenantId {
        TenantId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_by_id_and_caches() {
        let (registry, directory) = setup(vec![ready_config("a1b2c3", "acme")]);

        let config = directory.resolve_config(&id("a1b2c3")).await.unwrap();
        assert_eq!(config.subdomain, "acme");
        let lookups = registry.lookups();

        directory.resolve_config(&id("a1b2c3")).await.unwrap();
        assert_eq!(registry.lookups(), lookups);
    }

    #[tokio::test]
    async fn test_resolves_by_subdomain_alias() {
        let (_, directory) = setup(vec![ready_config("a1b2c3", "acme")]);

        let config = directory.resolve_config(&id("acme")).await.unwrap();
        assert_eq!(config.id, id("a1b2c3"));
        // Cached under both the alias and the canonical id
        assert_eq!(directory.cached_len(), 2);
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let (registry, directory) = setup(vec![]);

        for _ in 0..2 {
            let err = directory.resolve_config(&id("ghost")).await.unwrap_err();
            assert!(matches!(err, Error::TenantNotFound(_)));
        }
        // fetch + find_by_subdomain, twice
        assert_eq!(registry.lookups(), 4);
        assert_eq!(directory.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_unservable_tenants_are_not_found() {
        let mut inactive = ready_config("inactive1", "sleepy");
        inactive.active = false;
        let mut pending = ready_config("pending1", "pending");
        pending.state = ProvisioningState::Registered;
        let (_, directory) = setup(vec![inactive, pending]);

        for key in ["inactive1", "pending1", "sleepy"] {
            let err = directory.resolve_config(&id(key)).await.unwrap_err();
            assert!(matches!(err, Error::TenantNotFound(_)), "{key}");
        }
    }

    #[tokio::test]
    async fn test_deactivation_invalidates_cache() {
        let (_, directory) = setup(vec![ready_config("a1b2c3", "acme")]);
        directory.resolve_config(&id("acme")).await.unwrap();

        directory.set_active(&id("a1b2c3"), false).await.unwrap();
        assert_eq!(directory.cached_len(), 0);
        assert!(directory.resolve_config(&id("acme")).await.is_err());

        directory.set_active(&id("a1b2c3"), true).await.unwrap();
        assert!(directory.resolve_config(&id("acme")).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotate_descriptor_refreshes_config() {
        let (_, directory) = setup(vec![ready_config("a1b2c3", "acme")]);
        directory.resolve_config(&id("a1b2c3")).await.unwrap();

        let rotated = ConnectionDescriptor::new("mock://replica");
        directory
            .rotate_descriptor(&id("a1b2c3"), &rotated)
            .await
            .unwrap();

        let config = directory.resolve_config(&id("a1b2c3")).await.unwrap();
        assert_eq!(config.descriptor.expose(), "mock://replica");
    }

    #[tokio::test]
    async fn test_set_active_unknown_tenant() {
        let (_, directory) = setup(vec![]);
        let err = directory.set_active(&id("ghost"), true).await.unwrap_err();
        assert!(matches!(err, Error::TenantNotFound(_)));
    }
}
