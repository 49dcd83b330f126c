//! Wiring from `ServerConfig` to live services

use honeycertify_core::{Authenticator, Error, MigrationRunner, Result, TenantRegistry};
use honeycertify_observability::Metrics;
use honeycertify_registry_postgres::{
    PostgresConnector, PostgresMigrationRunner, PostgresPoolConfig, PostgresStoreAdmin,
    PostgresTenantRegistry,
};
use honeycertify_tenancy::{
    CommandMigrationRunner, HandleCache, HandleCacheConfig, Provisioner, TenantDirectory,
    TenantResolver,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::app::AppState;
use crate::auth::{AdminToken, AnonymousAuthenticator, HmacSessionAuthenticator};
use crate::config::{MigrationMode, ServerConfig};

/// Connect to the master registry; creates its tables if missing
pub async fn connect_registry(config: &ServerConfig) -> Result<PostgresTenantRegistry> {
    let database_url = config
        .registry
        .database_url
        .as_deref()
        .ok_or_else(|| Error::Config("registry.database_url is required".to_string()))?;

    let pool_config = PostgresPoolConfig::new()
        .with_max_connections(config.registry.max_connections)
        .with_min_connections(config.registry.min_connections);
    let registry = PostgresTenantRegistry::with_config(database_url, &pool_config).await?;
    info!("Master registry ready");
    Ok(registry)
}

/// Build the application state on top of a connected registry
pub fn build_state(
    config: &ServerConfig,
    registry: PostgresTenantRegistry,
) -> Result<AppState<PostgresConnector>> {
    let template = config
        .registry
        .effective_tenant_url_template()
        .ok_or_else(|| Error::Config("registry.tenant_url_template is required".to_string()))?;
    let stores = Arc::new(PostgresStoreAdmin::new(registry.pool().clone(), template)?);

    let migrations: Arc<dyn MigrationRunner> = match config.migrations.mode {
        MigrationMode::Builtin => Arc::new(PostgresMigrationRunner::new()),
        MigrationMode::Command => {
            let program = config.migrations.command.clone().ok_or_else(|| {
                Error::Config("migrations.command is required in command mode".to_string())
            })?;
            Arc::new(
                CommandMigrationRunner::new(program, config.migrations.args.clone())
                    .with_timeout(Duration::from_secs(config.migrations.timeout_secs)),
            )
        }
    };

    let registry: Arc<dyn TenantRegistry> = Arc::new(registry);
    let directory = Arc::new(TenantDirectory::new(registry));

    let connector = Arc::new(PostgresConnector::new(
        PostgresPoolConfig::new().with_max_connections(config.registry.tenant_max_connections),
    ));
    let handles = Arc::new(HandleCache::new(
        directory.clone(),
        connector,
        HandleCacheConfig::default()
            .with_capacity(config.tenancy.cache_capacity)
            .with_acquire_timeout(config.tenancy.acquire_timeout()),
    ));

    let provisioner = Arc::new(
        Provisioner::new(directory.clone(), stores, migrations)
            .with_reserved_subdomains(config.tenancy.resolver.reserved_labels.clone()),
    );

    let authenticator: Arc<dyn Authenticator> = match &config.auth.session_secret {
        Some(secret) => Arc::new(HmacSessionAuthenticator::new(secret)),
        None => {
            info!("No session secret configured; session claims are ignored");
            Arc::new(AnonymousAuthenticator)
        }
    };

    let metrics = Metrics::new()
        .map_err(|e| Error::Internal(format!("Failed to register metrics: {}", e)))?;

    Ok(AppState {
        resolver: Arc::new(TenantResolver::from_config(&config.tenancy.resolver)),
        authenticator,
        directory,
        handles,
        provisioner,
        metrics: Arc::new(metrics),
        admin_token: AdminToken::new(config.auth.admin_token.as_deref()),
    })
}
