//! Mock collaborators for exercising the tenancy layer without a database

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use honeycertify_core::{
    ConnectionDescriptor, Connector, Error, MigrationRunner, ProvisioningRecord,
    ProvisioningState, Result, StoreAdmin, TenantConfig, TenantId, TenantRegistry,
};

/// A `Ready`, active config pointing at `mock://<id>`
pub fn ready_config(id: &str, subdomain: &str) -> TenantConfig {
    TenantConfig {
        id: TenantId::new(id).expect("valid test tenant id"),
        name: format!("{} Honey Co", subdomain),
        descriptor: ConnectionDescriptor::new(format!("mock://{}", id)),
        subdomain: subdomain.to_string(),
        created_at: Utc::now(),
        active: true,
        state: ProvisioningState::Ready,
    }
}

/// Handle produced by `MockConnector`
#[derive(Debug)]
pub struct MockHandle {
    pub tenant_id: TenantId,
    pub descriptor: ConnectionDescriptor,
    /// Order in which this handle was constructed (1-based)
    pub serial: usize,
}

/// Connector that counts constructions and closes
#[derive(Debug, Default)]
pub struct MockConnector {
    connects: AtomicUsize,
    closed: Mutex<Vec<TenantId>>,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `connect`
    pub fn with_delay(delay: Duration) -> Self {
        let connector = Self::default();
        *connector.delay.lock() = Some(delay);
        connector
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> Vec<TenantId> {
        self.closed.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Handle = MockHandle;

    async fn connect(&self, config: &TenantConfig) -> Result<MockHandle> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Connection(format!(
                "connection refused: {}",
                config.descriptor
            )));
        }
        let serial = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockHandle {
            tenant_id: config.id.clone(),
            descriptor: config.descriptor.clone(),
            serial,
        })
    }

    async fn close(&self, handle: &MockHandle) {
        self.closed.lock().push(handle.tenant_id.clone());
    }
}

/// Store admin keeping store names in a set
#[derive(Debug, Default)]
pub struct MockStoreAdmin {
    stores: Mutex<HashSet<String>>,
    creates: AtomicUsize,
    fail_create: AtomicBool,
    fail_drop: AtomicBool,
}

impl MockStoreAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_drop(&self, fail: bool) {
        self.fail_drop.store(fail, Ordering::SeqCst);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.stores.lock().contains(name)
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreAdmin for MockStoreAdmin {
    async fn create_store(&self, name: &str) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Database(format!("could not create {}", name)));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.stores.lock().insert(name.to_string());
        Ok(())
    }

    async fn drop_store(&self, name: &str) -> Result<()> {
        if self.fail_drop.load(Ordering::SeqCst) {
            return Err(Error::Database(format!("could not drop {}", name)));
        }
        self.stores.lock().remove(name);
        Ok(())
    }

    async fn store_exists(&self, name: &str) -> Result<bool> {
        Ok(self.stores.lock().contains(name))
    }

    fn descriptor_for(&self, name: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new(format!("mock://{}", name))
    }
}

/// Migration runner recording which stores were migrated
#[derive(Debug, Default)]
pub struct MockMigrationRunner {
    applied: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MockMigrationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl MigrationRunner for MockMigrationRunner {
    async fn apply(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Database("migration 3 failed: syntax error".to_string()));
        }
        self.applied.lock().push(descriptor.expose().to_string());
        Ok(())
    }
}

/// Registry wrapper counting lookups
pub struct CountingRegistry {
    inner: Arc<dyn TenantRegistry>,
    lookups: AtomicUsize,
}

impl CountingRegistry {
    pub fn new(inner: Arc<dyn TenantRegistry>) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    /// Number of `fetch` + `find_by_subdomain` calls
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantRegistry for CountingRegistry {
    async fn fetch(&self, id: &TenantId) -> Result<Option<TenantConfig>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(id).await
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantConfig>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_subdomain(subdomain).await
    }

    async fn upsert(&self, config: &TenantConfig) -> Result<()> {
        self.inner.upsert(config).await
    }

    async fn set_state(&self, id: &TenantId, state: ProvisioningState) -> Result<()> {
        self.inner.set_state(id, state).await
    }

    async fn set_active(&self, id: &TenantId, active: bool) -> Result<()> {
        self.inner.set_active(id, active).await
    }

    async fn rotate_descriptor(
        &self,
        id: &TenantId,
        descriptor: &ConnectionDescriptor,
    ) -> Result<()> {
        self.inner.rotate_descriptor(id, descriptor).await
    }

    async fn list(&self) -> Result<Vec<TenantConfig>> {
        self.inner.list().await
    }

    async fn record_provisioning(&self, record: &ProvisioningRecord) -> Result<()> {
        self.inner.record_provisioning(record).await
    }

    async fn provisioning(&self, id: &TenantId) -> Result<Option<ProvisioningRecord>> {
        self.inner.provisioning(id).await
    }

    async fn stalled_provisioning(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<ProvisioningRecord>> {
        self.inner.stalled_provisioning(before).await
    }
}
