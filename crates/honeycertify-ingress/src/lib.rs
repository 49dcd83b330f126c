//! HTTP ingress for HoneyCertify
//!
//! Middleware that turns a request into a tenant, extractors that hand the
//! tenant to handlers, and the JSON error mapping shared by every route.

pub mod error;
pub mod extract;
pub mod middleware;

pub use error::ApiError;
pub use extract::{RequireSession, RequireTenant};
pub use middleware::{
    TenantResolutionState, request_parts, session_auth_middleware, tenant_resolution_middleware,
};
