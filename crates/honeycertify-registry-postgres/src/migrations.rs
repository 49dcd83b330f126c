//! Schema migrations for tenant stores
//!
//! Provides versioned schema migrations with tracking to ensure migrations
//! are applied exactly once and in the correct order.

use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

use honeycertify_core::{ConnectionDescriptor, Error, MigrationRunner, Result};

/// Represents a single database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique version number (must be sequential)
    pub version: i32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to execute for this migration
    pub up_sql: &'static str,
}

/// All migrations in order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Create apiaries table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS apiaries (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                location TEXT,
                latitude DOUBLE PRECISION,
                longitude DOUBLE PRECISION,
                hive_count INTEGER NOT NULL DEFAULT 0,
                created_by TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
    },
    Migration {
        version: 2,
        description: "Create honey_batches table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS honey_batches (
                id BIGSERIAL PRIMARY KEY,
                batch_number TEXT NOT NULL UNIQUE,
                apiary_id BIGINT REFERENCES apiaries(id) ON DELETE SET NULL,
                honey_type TEXT NOT NULL,
                weight_kg NUMERIC(12, 3),
                harvested_at DATE,
                status TEXT NOT NULL DEFAULT 'pending',
                created_by TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
    },
    Migration {
        version: 3,
        description: "Create certifications table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS certifications (
                id BIGSERIAL PRIMARY KEY,
                batch_id BIGINT NOT NULL REFERENCES honey_batches(id) ON DELETE CASCADE,
                certificate_type TEXT NOT NULL,
                issued_by TEXT NOT NULL,
                issued_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                expires_at TIMESTAMPTZ,
                on_chain_tx TEXT,
                status TEXT NOT NULL DEFAULT 'issued'
            )
        "#,
    },
    Migration {
        version: 4,
        description: "Create documents table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS documents (
                id BIGSERIAL PRIMARY KEY,
                batch_id BIGINT REFERENCES honey_batches(id) ON DELETE CASCADE,
                certification_id BIGINT REFERENCES certifications(id) ON DELETE SET NULL,
                file_name TEXT NOT NULL,
                mime_type TEXT,
                ipfs_cid TEXT NOT NULL,
                uploaded_by TEXT NOT NULL,
                uploaded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
    },
    Migration {
        version: 5,
        description: "Create lookup indexes",
        up_sql: r#"
            CREATE INDEX IF NOT EXISTS idx_honey_batches_apiary
            ON honey_batches(apiary_id);

            CREATE INDEX IF NOT EXISTS idx_honey_batches_status
            ON honey_batches(status, created_at DESC);

            CREATE INDEX IF NOT EXISTS idx_certifications_batch
            ON certifications(batch_id);

            CREATE INDEX IF NOT EXISTS idx_documents_batch
            ON documents(batch_id);

            CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_cid
            ON documents(ipfs_cid)
        "#,
    },
];

/// Run all pending migrations
///
/// Creates a `schema_migrations` table to track which migrations have been applied,
/// then runs any migrations that haven't been applied yet.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Database(format!("Failed to create schema_migrations table: {}", e)))?;

    let applied_versions: Vec<i32> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to fetch applied migrations: {}", e)))?;

    debug!(
        "Found {} applied migrations: {:?}",
        applied_versions.len(),
        applied_versions
    );

    for migration in MIGRATIONS {
        if applied_versions.contains(&migration.version) {
            debug!(
                "Skipping migration {}: {} (already applied)",
                migration.version, migration.description
            );
            continue;
        }

        info!(
            "Applying migration {}: {}",
            migration.version, migration.description
        );

        // Migration and its bookkeeping row commit together
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to start transaction: {}", e)))?;

        sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(migration.up_sql))
            .await
            .map_err(|e| {
                Error::Database(format!(
                    "Failed to apply migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query(
            "INSERT INTO schema_migrations (version, description) VALUES ($1, $2)
                ON CONFLICT (version) DO NOTHING",
        )
        .bind(migration.version)
        .bind(migration.description)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(format!(
                "Failed to record migration {}: {}",
                migration.version, e
            ))
        })?;

        tx.commit().await.map_err(|e| {
            Error::Database(format!(
                "Failed to commit migration {}: {}",
                migration.version, e
            ))
        })?;
    }

    Ok(())
}

/// Get the current schema version (highest applied migration)
pub async fn current_version(pool: &PgPool) -> Result<Option<i32>> {
    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get current version: {}", e)))?;

    Ok(version)
}

/// Applies `MIGRATIONS` to a tenant store over a short-lived connection
#[derive(Debug, Clone)]
pub struct PostgresMigrationRunner {
    connect_timeout: Duration,
}

impl Default for PostgresMigrationRunner {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl PostgresMigrationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl MigrationRunner for PostgresMigrationRunner {
    async fn apply(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.connect_timeout)
            .connect(descriptor.expose())
            .await
            .map_err(|e| {
                Error::Database(format!(
                    "Failed to connect to {} for migrations: {}",
                    descriptor.redacted(),
                    e
                ))
            })?;

        let result = run_migrations(&pool).await;
        pool.close().await;
        result?;

        info!(descriptor = %descriptor, "Tenant store migrated");
        Ok(())
    }
}
