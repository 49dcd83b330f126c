//! Per-tenant connection pools

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use honeycertify_core::{Connector, Error, Result, TenantConfig};

use crate::config::PostgresPoolConfig;

/// Opens one `PgPool` per tenant store
#[derive(Debug, Clone, Default)]
pub struct PostgresConnector {
    config: PostgresPoolConfig,
}

impl PostgresConnector {
    pub fn new(config: PostgresPoolConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    type Handle = PgPool;

    async fn connect(&self, config: &TenantConfig) -> Result<PgPool> {
        self.config
            .pool_options()
            .connect(config.descriptor.expose())
            .await
            .map_err(|e| {
                Error::Connection(format!(
                    "Failed to connect to store for tenant {} ({}): {}",
                    config.id,
                    config.descriptor.redacted(),
                    e
                ))
            })
    }

    async fn close(&self, handle: &PgPool) {
        debug!(size = handle.size(), "Closing tenant pool");
        handle.close().await;
    }

    async fn ping(&self, handle: &PgPool) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(handle)
            .await
            .map_err(|e| Error::Connection(format!("Tenant store ping failed: {}", e)))?;
        Ok(())
    }
}
