//! HoneyCertify tenant routing
//!
//! Every request is resolved to exactly one tenant before any domain logic runs:
//!
//! ```text
//! Request → TenantResolver → x-company-id → HandleCache::get_handle
//!                                               ↓ (miss)
//!                                   TenantDirectory → TenantRegistry
//! ```
//!
//! Tenants are created through the `Provisioner`, which drives the
//! `Requested → StoreCreated → Registered → MigrationsApplied → Ready`
//! state machine and journals every transition.

pub mod command_migrations;
pub mod directory;
pub mod handle_cache;
pub mod memory_registry;
pub mod provisioning;
pub mod resolver;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use command_migrations::CommandMigrationRunner;
pub use directory::TenantDirectory;
pub use handle_cache::{HandleCache, HandleCacheConfig, HandleCacheStats};
pub use memory_registry::InMemoryTenantRegistry;
pub use provisioning::{Provisioner, derive_tenant_id, store_name_for};
pub use resolver::{
    RequestParts, ResolvedTenant, ResolverConfig, TENANT_HEADER, TenantResolver, TenantSource,
    TenantSourceResolver,
};
