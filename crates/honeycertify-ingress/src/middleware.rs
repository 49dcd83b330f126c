//! Session and tenant middleware
//!
//! Layer order matters: `session_auth_middleware` must run before
//! `tenant_resolution_middleware` so session claims can take part in
//! resolution.

use axum::{
    extract::{Query, Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use honeycertify_core::{Authenticator, SessionClaims};
use honeycertify_observability::Metrics;
use honeycertify_tenancy::{RequestParts, TENANT_HEADER, TenantResolver};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attach `SessionClaims` to the request when the session is valid
///
/// Anonymous requests pass through untouched.
pub async fn session_auth_middleware(
    State(authenticator): State<Arc<dyn Authenticator>>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(claims) = authenticator.authenticate(req.headers()).await {
        debug!(user_id = %claims.user_id, "Session authenticated");
        req.extensions_mut().insert(claims);
    }
    next.run(req).await
}

/// State for `tenant_resolution_middleware`
#[derive(Clone)]
pub struct TenantResolutionState {
    pub resolver: Arc<TenantResolver>,
    pub metrics: Option<Arc<Metrics>>,
}

impl TenantResolutionState {
    pub fn new(resolver: Arc<TenantResolver>) -> Self {
        Self {
            resolver,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Resolve the request's tenant and publish it in `x-company-id`
///
/// Any client-supplied `x-company-id` is removed first, so downstream
/// handlers only ever see the resolver's answer. The `ResolvedTenant` is
/// also inserted as a request extension.
pub async fn tenant_resolution_middleware(
    State(state): State<TenantResolutionState>,
    mut req: Request,
    next: Next,
) -> Response {
    let parts = request_parts(&req);

    if req.headers_mut().remove(TENANT_HEADER).is_some() {
        warn!(path = %parts.path, "Dropped client-supplied tenant header");
    }

    let resolved = state.resolver.resolve(&parts);
    if let Some(metrics) = &state.metrics {
        metrics.record_resolution(resolved.as_ref().map(|r| r.source.as_str()));
    }

    if let Some(resolved) = resolved {
        match HeaderValue::from_str(resolved.id.as_str()) {
            Ok(value) => {
                debug!(
                    tenant_id = %resolved.id,
                    source = %resolved.source,
                    "Tenant resolved"
                );
                req.headers_mut().insert(TENANT_HEADER, value);
                req.extensions_mut().insert(resolved);
            }
            Err(e) => warn!(tenant_id = %resolved.id, error = %e, "Unrepresentable tenant id"),
        }
    }

    next.run(req).await
}

/// Collect the resolver inputs from an HTTP request
pub fn request_parts(req: &Request) -> RequestParts {
    let mut parts = RequestParts::new(req.uri().path());

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()));
    if let Some(host) = host {
        parts = parts.with_host(host);
    }

    if let Ok(Query(query)) = Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
        parts = parts.with_query(query);
    }

    if let Some(claims) = req.extensions().get::<SessionClaims>() {
        parts = parts.with_claims(claims.clone());
    }

    parts
}
