//! Database-per-tenant store administration

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use honeycertify_core::{ConnectionDescriptor, Error, Result, StoreAdmin};

/// Placeholder replaced by the store name in the tenant URL template
pub const STORE_PLACEHOLDER: &str = "{store}";

/// Duplicate database (SQLSTATE 42P04)
const DUPLICATE_DATABASE: &str = "42P04";

/// Creates and drops tenant databases on the cluster behind `pool`
///
/// `pool` must be connected with a role allowed to `CREATE DATABASE`.
/// Tenant descriptors are built from `url_template`, e.g.
/// `postgres://app:secret@db:5432/{store}`.
#[derive(Clone)]
pub struct PostgresStoreAdmin {
    pool: Arc<PgPool>,
    url_template: String,
}

impl PostgresStoreAdmin {
    /// # Errors
    /// - `Error::Config` if `url_template` has no `{store}` placeholder
    pub fn new(pool: PgPool, url_template: impl Into<String>) -> Result<Self> {
        let url_template = url_template.into();
        if !url_template.contains(STORE_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "Tenant URL template must contain '{}'",
                STORE_PLACEHOLDER
            )));
        }
        Ok(Self {
            pool: Arc::new(pool),
            url_template,
        })
    }
}

/// Quote a store name as a PostgreSQL identifier
///
/// `CREATE DATABASE` cannot take bind parameters, so names are restricted to
/// lowercase ASCII letters, digits and underscores before being quoted.
fn quote_store_name(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(Error::InvalidTenant(format!(
            "'{}' is not a valid store name",
            name
        )));
    }
    Ok(format!("\"{}\"", name))
}

#[async_trait]
impl StoreAdmin for PostgresStoreAdmin {
    async fn create_store(&self, name: &str) -> Result<()> {
        let quoted = quote_store_name(name)?;
        let result = sqlx::query(&format!("CREATE DATABASE {}", quoted))
            .execute(&*self.pool)
            .await;

        match result {
            Ok(_) => {
                info!(store = %name, "Created tenant store");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(DUPLICATE_DATABASE) => {
                info!(store = %name, "Tenant store already exists");
                Ok(())
            }
            Err(e) => Err(Error::Database(format!(
                "Failed to create store {}: {}",
                name, e
            ))),
        }
    }

    async fn drop_store(&self, name: &str) -> Result<()> {
        let quoted = quote_store_name(name)?;
        sqlx::query(&format!("DROP DATABASE IF EXISTS {}", quoted))
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to drop store {}: {}", name, e)))?;

        info!(store = %name, "Dropped tenant store");
        Ok(())
    }

    async fn store_exists(&self, name: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(name)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to look up store {}: {}", name, e)))
    }

    fn descriptor_for(&self, name: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new(self.url_template.replace(STORE_PLACEHOLDER, name))
    }
}
