//! PostgreSQL backends for HoneyCertify tenant routing
//!
//! - `PostgresTenantRegistry`: the master registry (`tenants` and
//!   `tenant_provisioning` tables)
//! - `PostgresStoreAdmin`: creates and drops one database per tenant
//! - `PostgresConnector`: opens a `PgPool` per tenant for the handle cache
//! - `PostgresMigrationRunner`: versioned schema migrations for tenant stores
//!
//! # Example
//! ```no_run
//! # use honeycertify_registry_postgres::PostgresTenantRegistry;
//! # use honeycertify_core::TenantRegistry;
//! # async fn example() -> honeycertify_core::Result<()> {
//! let registry = PostgresTenantRegistry::new("postgres://localhost/honeycertify").await?;
//! let tenants = registry.list().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connector;
pub mod migrations;
mod registry;
mod store_admin;

pub use config::PostgresPoolConfig;
pub use connector::PostgresConnector;
pub use migrations::PostgresMigrationRunner;
pub use registry::PostgresTenantRegistry;
pub use store_admin::PostgresStoreAdmin;
