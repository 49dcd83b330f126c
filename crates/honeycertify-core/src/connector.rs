//! Data store collaborators
//!
//! These traits keep the tenancy layer independent of the database driver:
//! - `Connector` opens the per-tenant handle cached by the handle cache
//! - `StoreAdmin` physically creates and drops tenant stores
//! - `MigrationRunner` brings a freshly created store to the current schema

use async_trait::async_trait;

use crate::{
    Result,
    tenant::{ConnectionDescriptor, TenantConfig},
};

/// Opens data-access handles for tenant stores
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Handle type shared between requests (e.g. a connection pool)
    type Handle: Send + Sync + 'static;

    /// Open a handle bound to `config.descriptor`
    ///
    /// # Errors
    /// - `Error::Connection` if the store cannot be reached
    async fn connect(&self, config: &TenantConfig) -> Result<Self::Handle>;

    /// Release a handle that has been evicted from the cache
    async fn close(&self, _handle: &Self::Handle) {}

    /// Cheap liveness check on an open handle
    async fn ping(&self, _handle: &Self::Handle) -> Result<()> {
        Ok(())
    }
}

/// Creates and drops the physical stores backing tenants
#[async_trait]
pub trait StoreAdmin: Send + Sync {
    /// Create a store named `name`. Creating an existing store is not an error.
    async fn create_store(&self, name: &str) -> Result<()>;

    /// Drop the store named `name`. Dropping a missing store is not an error.
    async fn drop_store(&self, name: &str) -> Result<()>;

    /// Whether a store named `name` exists
    async fn store_exists(&self, name: &str) -> Result<bool>;

    /// Connection descriptor for the store named `name`
    fn descriptor_for(&self, name: &str) -> ConnectionDescriptor;
}

/// Applies schema migrations to a tenant store
///
/// Implementations must be idempotent: running them against an
/// up-to-date store is a no-op.
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    async fn apply(&self, descriptor: &ConnectionDescriptor) -> Result<()>;
}
