//! Tenant provisioning state machine
//!
//! A tenant moves through
//! `Requested → StoreCreated → Registered → MigrationsApplied → Ready`.
//! Every transition is written to the provisioning journal before the next
//! step starts, so a crashed or failed run can be resumed from where it
//! stopped. Each step is idempotent: creating an existing store, upserting
//! the same config and re-running migrations are all no-ops.
//!
//! Runs that never reach `Registered` hold a physical store nobody can route
//! to. `cleanup_stalled` drops those stores and marks the runs `Abandoned`.

use chrono::{DateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use honeycertify_core::{
    Error, MigrationRunner, ProvisioningRecord, ProvisioningState, ProvisioningStep, Result,
    StoreAdmin, TenantConfig, TenantId,
};

use crate::directory::TenantDirectory;

/// Length of a derived tenant identifier, in hex characters
pub const TENANT_ID_LEN: usize = 12;

static SUBDOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("subdomain regex is valid")
});

/// Derive a tenant identifier from the company name and a timestamp
///
/// `sha256(company_name || unix_millis)`, hex encoded, first 12 characters.
pub fn derive_tenant_id(company_name: &str, at: DateTime<Utc>) -> Result<TenantId> {
    let mut hasher = Sha256::new();
    hasher.update(company_name.as_bytes());
    hasher.update(at.timestamp_millis().to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    TenantId::new(&digest[..TENANT_ID_LEN])
}

/// Name of the physical store backing a tenant
pub fn store_name_for(id: &TenantId) -> String {
    format!("tenant_{}", id)
}

pub struct Provisioner {
    directory: Arc<TenantDirectory>,
    stores: Arc<dyn StoreAdmin>,
    migrations: Arc<dyn MigrationRunner>,
    reserved_subdomains: Vec<String>,
}

impl Provisioner {
    pub fn new(
        directory: Arc<TenantDirectory>,
        stores: Arc<dyn StoreAdmin>,
        migrations: Arc<dyn MigrationRunner>,
    ) -> Self {
        Self {
            directory,
            stores,
            migrations,
            reserved_subdomains: vec!["www".to_string(), "localhost".to_string()],
        }
    }

    /// Subdomain labels that can never be assigned to a tenant
    pub fn with_reserved_subdomains(mut self, reserved: Vec<String>) -> Self {
        self.reserved_subdomains = reserved
            .into_iter()
            .map(|label| label.to_ascii_lowercase())
            .collect();
        self
    }

    /// Provision a new tenant and return its `Ready` config
    ///
    /// # Errors
    /// - `Error::Provisioning { step: Validate }` for an empty name or an
    ///   invalid, reserved or already registered subdomain
    /// - `Error::Provisioning { step }` naming the step that failed; the
    ///   journal keeps the failure and the run can be resumed
    pub async fn create_tenant(&self, company_name: &str, subdomain: &str) -> Result<TenantConfig> {
        let company_name = company_name.trim();
        let subdomain = subdomain.trim().to_ascii_lowercase();
        self.validate(company_name, &subdomain).await?;

        let id = derive_tenant_id(company_name, Utc::now())
            .map_err(|e| Error::provisioning(ProvisioningStep::Validate, e.to_string()))?;
        let registry = self.directory.registry();
        if registry.provisioning(&id).await?.is_some() || registry.fetch(&id).await?.is_some() {
            return Err(Error::provisioning(
                ProvisioningStep::Validate,
                format!("derived identifier {} is already in use", id),
            ));
        }

        let store_name = store_name_for(&id);
        let record = ProvisioningRecord {
            tenant_id: id.clone(),
            company_name: company_name.to_string(),
            subdomain,
            descriptor: self.stores.descriptor_for(&store_name),
            store_name,
            state: ProvisioningState::Requested,
            last_error: None,
            updated_at: Utc::now(),
        };
        registry.record_provisioning(&record).await.map_err(|e| {
            Error::provisioning(ProvisioningStep::Validate, format!("journal: {}", e))
        })?;
        info!(
            tenant_id = %id,
            subdomain = %record.subdomain,
            store = %record.store_name,
            "Provisioning requested"
        );

        self.advance(record).await
    }

    /// Continue a failed or interrupted provisioning run
    ///
    /// # Errors
    /// - `Error::TenantNotFound` if no run was journaled for `id`
    /// - `Error::InvalidTenant` if the run was abandoned
    /// - `Error::Provisioning { step }` if a remaining step fails again
    pub async fn resume(&self, id: &TenantId) -> Result<TenantConfig> {
        let record = self
            .directory
            .registry()
            .provisioning(id)
            .await?
            .ok_or_else(|| Error::TenantNotFound(id.to_string()))?;

        if record.state == ProvisioningState::Abandoned {
            return Err(Error::InvalidTenant(format!(
                "provisioning of {} was abandoned",
                id
            )));
        }

        info!(tenant_id = %id, state = %record.state, "Resuming provisioning");
        self.advance(record).await
    }

    /// Drop stores of runs stuck before `Registered` for longer than `older_than`
    ///
    /// Returns the identifiers that were cleaned up. A run whose store cannot
    /// be dropped keeps its state and is retried on the next call.
    pub async fn cleanup_stalled(&self, older_than: Duration) -> Result<Vec<TenantId>> {
        let threshold = TimeDelta::from_std(older_than)
            .map_err(|e| Error::Config(format!("Invalid cleanup threshold: {}", e)))?;
        let registry = self.directory.registry();
        let stalled = registry.stalled_provisioning(Utc::now() - threshold).await?;

        let mut cleaned = Vec::with_capacity(stalled.len());
        for mut record in stalled {
            let dropped = match self.stores.store_exists(&record.store_name).await {
                Ok(true) => self.stores.drop_store(&record.store_name).await,
                Ok(false) => Ok(()),
                Err(e) => Err(e),
            };

            match dropped {
                Ok(()) => {
                    record.state = ProvisioningState::Abandoned;
                    record.updated_at = Utc::now();
                    registry.record_provisioning(&record).await?;
                    info!(
                        tenant_id = %record.tenant_id,
                        store = %record.store_name,
                        "Stalled provisioning abandoned"
                    );
                    cleaned.push(record.tenant_id);
                }
                Err(e) => {
                    warn!(
                        tenant_id = %record.tenant_id,
                        store = %record.store_name,
                        error = %e,
                        "Failed to drop stalled store"
                    );
                    record.last_error = Some(format!("{}: {}", ProvisioningStep::Cleanup, e));
                    registry.record_provisioning(&record).await?;
                }
            }
        }

        Ok(cleaned)
    }

    async fn validate(&self, company_name: &str, subdomain: &str) -> Result<()> {
        let invalid = |msg: String| Error::provisioning(ProvisioningStep::Validate, msg);

        if company_name.is_empty() {
            return Err(invalid("company name cannot be empty".to_string()));
        }
        if !SUBDOMAIN_RE.is_match(subdomain) {
            return Err(invalid(format!("'{}' is not a valid subdomain label", subdomain)));
        }
        if self.reserved_subdomains.iter().any(|r| r == subdomain) {
            return Err(invalid(format!("subdomain '{}' is reserved", subdomain)));
        }
        if self
            .directory
            .registry()
            .find_by_subdomain(subdomain)
            .await?
            .is_some()
        {
            return Err(invalid(format!("subdomain '{}' is already registered", subdomain)));
        }
        Ok(())
    }

    async fn advance(&self, mut record: ProvisioningRecord) -> Result<TenantConfig> {
        let registry = self.directory.registry();

        while let Some(step) = record.state.next_step() {
            let outcome = match self.run_step(step, &record).await {
                Ok(state) => {
                    record.state = state;
                    record.last_error = None;
                    record.updated_at = Utc::now();
                    registry.record_provisioning(&record).await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = outcome {
                warn!(
                    tenant_id = %record.tenant_id,
                    step = %step,
                    error = %e,
                    "Provisioning step failed"
                );
                record.last_error = Some(format!("{}: {}", step, e));
                record.updated_at = Utc::now();
                if let Err(journal_err) = registry.record_provisioning(&record).await {
                    warn!(
                        tenant_id = %record.tenant_id,
                        error = %journal_err,
                        "Failed to journal provisioning failure"
                    );
                }
                return Err(Error::provisioning(step, e.to_string()));
            }

            debug!(
                tenant_id = %record.tenant_id,
                state = %record.state,
                "Provisioning step completed"
            );
        }

        info!(tenant_id = %record.tenant_id, "Tenant ready");
        self.directory
            .resolve_config(&record.tenant_id)
            .await
            .map_err(|e| Error::provisioning(ProvisioningStep::Activate, e.to_string()))
    }

    async fn run_step(
        &self,
        step: ProvisioningStep,
        record: &ProvisioningRecord,
    ) -> Result<ProvisioningState> {
        let registry = self.directory.registry();
        match step {
            ProvisioningStep::CreateStore => {
                if !self.stores.store_exists(&record.store_name).await? {
                    self.stores.create_store(&record.store_name).await?;
                }
                Ok(ProvisioningState::StoreCreated)
            }
            ProvisioningStep::Register => {
                let existing = registry.fetch(&record.tenant_id).await?;
                let mut config = record.to_config(ProvisioningState::Registered);
                if let Some(existing) = existing {
                    config.created_at = existing.created_at;
                    config.active = existing.active;
                }
                registry.upsert(&config).await?;
                Ok(ProvisioningState::Registered)
            }
            ProvisioningStep::ApplyMigrations => {
                self.migrations.apply(&record.descriptor).await?;
                registry
                    .set_state(&record.tenant_id, ProvisioningState::MigrationsApplied)
                    .await?;
                Ok(ProvisioningState::MigrationsApplied)
            }
            ProvisioningStep::Activate => {
                registry
                    .set_state(&record.tenant_id, ProvisioningState::Ready)
                    .await?;
                self.directory.invalidate(&record.tenant_id);
                Ok(ProvisioningState::Ready)
            }
            ProvisioningStep::Validate | ProvisioningStep::Cleanup => Err(Error::Internal(
                format!("step '{}' is not part of the provisioning sequence", step),
            )),
        }
    }
}
