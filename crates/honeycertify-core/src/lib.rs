//! HoneyCertify Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout HoneyCertify:
//! - Tenant identifiers, configurations and provisioning states
//! - Registry, connector, store administration and migration abstractions
//! - Session claims consumed from the authentication collaborator
//! - Core error types

pub mod auth;
pub mod connector;
pub mod error;
pub mod registry;
pub mod tenant;

pub use auth::{Authenticator, SessionClaims};
pub use connector::{Connector, MigrationRunner, StoreAdmin};
pub use error::{Error, ProvisioningStep, Result};
pub use registry::TenantRegistry;
pub use tenant::{
    ConnectionDescriptor, ProvisioningRecord, ProvisioningState, TenantConfig, TenantId,
};
