//! PostgresTenantRegistry - TenantRegistry implementation for the master database

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    PgPool, Row,
    postgres::{PgQueryResult, PgRow},
};
use std::sync::Arc;
use tracing::{debug, info};

use honeycertify_core::{
    ConnectionDescriptor, Error, ProvisioningRecord, ProvisioningState, Result, TenantConfig,
    TenantId, TenantRegistry,
};

use crate::config::PostgresPoolConfig;

/// PostgreSQL-backed master registry
///
/// Holds one row per tenant in `tenants` and one row per provisioning run in
/// `tenant_provisioning`. Both tables are created on construction if missing.
#[derive(Clone)]
pub struct PostgresTenantRegistry {
    /// PostgreSQL connection pool
    pool: Arc<PgPool>,
}

impl PostgresTenantRegistry {
    /// Connect to the master database and ensure the registry schema
    ///
    /// # Errors
    /// - `Error::Database` if connection fails or schema creation fails
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_config(database_url, &PostgresPoolConfig::default()).await
    }

    pub async fn with_config(database_url: &str, config: &PostgresPoolConfig) -> Result<Self> {
        let pool = config
            .pool_options()
            .connect(database_url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to registry: {}", e)))?;

        let registry = Self {
            pool: Arc::new(pool),
        };
        registry.ensure_schema().await?;

        Ok(registry)
    }

    /// Create from an existing pool (useful for testing)
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the registry tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                subdomain TEXT NOT NULL UNIQUE,
                connection_url TEXT NOT NULL,
                state TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create tenants table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_provisioning (
                tenant_id TEXT PRIMARY KEY,
                company_name TEXT NOT NULL,
                subdomain TEXT NOT NULL,
                store_name TEXT NOT NULL,
                connection_url TEXT NOT NULL,
                state TEXT NOT NULL,
                last_error TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            Error::Database(format!("Failed to create tenant_provisioning table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_tenant_provisioning_stalled
            ON tenant_provisioning(state, updated_at)
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create provisioning index: {}", e)))?;

        info!("Tenant registry schema ready");
        Ok(())
    }

    fn config_from_row(row: &PgRow) -> Result<TenantConfig> {
        let id: String = get(row, "id")?;
        let connection_url: String = get(row, "connection_url")?;
        let state: String = get(row, "state")?;
        Ok(TenantConfig {
            id: TenantId::new(id)?,
            name: get(row, "name")?,
            descriptor: ConnectionDescriptor::new(connection_url),
            subdomain: get(row, "subdomain")?,
            created_at: get(row, "created_at")?,
            active: get(row, "active")?,
            state: state.parse()?,
        })
    }

    fn record_from_row(row: &PgRow) -> Result<ProvisioningRecord> {
        let tenant_id: String = get(row, "tenant_id")?;
        let connection_url: String = get(row, "connection_url")?;
        let state: String = get(row, "state")?;
        Ok(ProvisioningRecord {
            tenant_id: TenantId::new(tenant_id)?,
            company_name: get(row, "company_name")?,
            subdomain: get(row, "subdomain")?,
            store_name: get(row, "store_name")?,
            descriptor: ConnectionDescriptor::new(connection_url),
            state: state.parse()?,
            last_error: get(row, "last_error")?,
            updated_at: get(row, "updated_at")?,
        })
    }

    fn ensure_updated(
        id: &TenantId,
        result: std::result::Result<PgQueryResult, sqlx::Error>,
    ) -> Result<()> {
        let result =
            result.map_err(|e| Error::Database(format!("Failed to update tenant {}: {}", id, e)))?;
        if result.rows_affected() == 0 {
            return Err(Error::TenantNotFound(id.to_string()));
        }
        Ok(())
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| Error::Database(format!("Failed to read column '{}': {}", column, e)))
}

const TENANT_COLUMNS: &str =
    "id, name, subdomain, connection_url, state, active, created_at";

const PROVISIONING_COLUMNS: &str =
    "tenant_id, company_name, subdomain, store_name, connection_url, state, last_error, updated_at";

#[async_trait]
impl TenantRegistry for PostgresTenantRegistry {
    async fn fetch(&self, id: &TenantId) -> Result<Option<TenantConfig>> {
        let row = sqlx::query(&format!("SELECT {} FROM tenants WHERE id = $1", TENANT_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to query tenant: {}", e)))?;

        row.as_ref().map(Self::config_from_row).transpose()
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tenants WHERE subdomain = $1",
            TENANT_COLUMNS
        ))
        .bind(subdomain)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to query tenant by subdomain: {}", e)))?;

        row.as_ref().map(Self::config_from_row).transpose()
    }

    async fn upsert(&self, config: &TenantConfig) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO tenants (id, name, subdomain, connection_url, state, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                subdomain = EXCLUDED.subdomain,
                connection_url = EXCLUDED.connection_url,
                state = EXCLUDED.state,
                active = EXCLUDED.active,
                updated_at = NOW()
            "#,
        )
        .bind(config.id.as_str())
        .bind(&config.name)
        .bind(&config.subdomain)
        .bind(config.descriptor.expose())
        .bind(config.state.as_str())
        .bind(config.active)
        .bind(config.created_at)
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(tenant_id = %config.id, state = %config.state, "Tenant upserted");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                Error::InvalidTenant(format!(
                    "Subdomain '{}' is already registered",
                    config.subdomain
                )),
            ),
            Err(e) => Err(Error::Database(format!("Failed to upsert tenant: {}", e))),
        }
    }

    async fn set_state(&self, id: &TenantId, state: ProvisioningState) -> Result<()> {
        let result = sqlx::query("UPDATE tenants SET state = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(state.as_str())
            .execute(&*self.pool)
            .await;
        Self::ensure_updated(id, result)
    }

    async fn set_active(&self, id: &TenantId, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE tenants SET active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(active)
            .execute(&*self.pool)
            .await;
        Self::ensure_updated(id, result)
    }

    async fn rotate_descriptor(
        &self,
        id: &TenantId,
        descriptor: &ConnectionDescriptor,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE tenants SET connection_url = $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_str())
                .bind(descriptor.expose())
                .execute(&*self.pool)
                .await;
        Self::ensure_updated(id, result)
    }

    async fn list(&self) -> Result<Vec<TenantConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tenants ORDER BY created_at, id",
            TENANT_COLUMNS
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list tenants: {}", e)))?;

        rows.iter().map(Self::config_from_row).collect()
    }

    async fn record_provisioning(&self, record: &ProvisioningRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenant_provisioning
                (tenant_id, company_name, subdomain, store_name, connection_url, state, last_error, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tenant_id) DO UPDATE
            SET state = EXCLUDED.state,
                last_error = EXCLUDED.last_error,
                connection_url = EXCLUDED.connection_url,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.tenant_id.as_str())
        .bind(&record.company_name)
        .bind(&record.subdomain)
        .bind(&record.store_name)
        .bind(record.descriptor.expose())
        .bind(record.state.as_str())
        .bind(&record.last_error)
        .bind(record.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to journal provisioning: {}", e)))?;

        Ok(())
    }

    async fn provisioning(&self, id: &TenantId) -> Result<Option<ProvisioningRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tenant_provisioning WHERE tenant_id = $1",
            PROVISIONING_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to query provisioning journal: {}", e)))?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn stalled_provisioning(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<ProvisioningRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tenant_provisioning \
             WHERE state = ANY($1) AND updated_at < $2 \
             ORDER BY updated_at",
            PROVISIONING_COLUMNS
        ))
        .bind(vec![
            ProvisioningState::Requested.as_str().to_string(),
            ProvisioningState::StoreCreated.as_str().to_string(),
        ])
        .bind(before)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to query stalled provisioning: {}", e)))?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Registry ping failed: {}", e)))?;
        Ok(())
    }
}
