//! End-to-end integration tests for HoneyCertify tenant routing
//!
//! These tests wire the ingress middleware, the tenant directory and the
//! handle cache together behind a real axum router, using the in-memory
//! registry and mock connector in place of PostgreSQL.

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    routing::get,
};
use honeycertify_core::{TenantConfig, TenantRegistry};
use honeycertify_ingress::{ApiError, RequireTenant, TenantResolutionState, tenant_resolution_middleware};
use honeycertify_observability::Metrics;
use honeycertify_tenancy::testing::MockConnector;
use honeycertify_tenancy::{
    HandleCache, HandleCacheConfig, InMemoryTenantRegistry, ResolverConfig, TenantDirectory,
    TenantResolver,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

pub const BASE_DOMAIN: &str = "honeycertify.com";

/// Router plus handles on every collaborator behind it
pub struct TestApp {
    pub router: Router,
    pub registry: Arc<InMemoryTenantRegistry>,
    pub directory: Arc<TenantDirectory>,
    pub connector: Arc<MockConnector>,
    pub handles: Arc<HandleCache<MockConnector>>,
    pub metrics: Arc<Metrics>,
}

impl TestApp {
    pub fn new(tenants: Vec<TenantConfig>) -> Self {
        Self::with_config(tenants, HandleCacheConfig::default(), MockConnector::new())
    }

    pub fn with_config(
        tenants: Vec<TenantConfig>,
        cache: HandleCacheConfig,
        connector: MockConnector,
    ) -> Self {
        let registry = Arc::new(InMemoryTenantRegistry::with_tenants(tenants));
        let directory = Arc::new(TenantDirectory::new(registry.clone()));
        let connector = Arc::new(connector);
        let handles = Arc::new(HandleCache::new(directory.clone(), connector.clone(), cache));
        let metrics = Arc::new(Metrics::new().unwrap_or_else(|e| panic!("metrics: {}", e)));

        let resolver = Arc::new(TenantResolver::from_config(&ResolverConfig {
            base_domain: Some(BASE_DOMAIN.to_string()),
            ..Default::default()
        }));

        let router = Router::new()
            .route("/whoami", get(whoami))
            .route("/company/{id}/whoami", get(whoami))
            .with_state(handles.clone())
            .layer(middleware::from_fn_with_state(
                TenantResolutionState::new(resolver).with_metrics(metrics.clone()),
                tenant_resolution_middleware,
            ));

        Self {
            router,
            registry,
            directory,
            connector,
            handles,
            metrics,
        }
    }

    /// Register a tenant after the app was built
    pub async fn register(&self, config: TenantConfig) {
        self.registry
            .upsert(&config)
            .await
            .unwrap_or_else(|e| panic!("upsert {}: {}", config.id, e));
    }

    /// Send a GET and decode the JSON body
    pub async fn get(&self, host: Option<&str>, uri: &str) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header("host", host);
        }
        let request = builder
            .body(Body::empty())
            .unwrap_or_else(|e| panic!("request: {}", e));
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|e| match e {});
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .unwrap_or_default();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }
}

/// Host header for a tenant subdomain
pub fn host(subdomain: &str) -> String {
    format!("{}.{}", subdomain, BASE_DOMAIN)
}

/// Reports which handle served the request
async fn whoami(
    State(handles): State<Arc<HandleCache<MockConnector>>>,
    RequireTenant(id): RequireTenant,
) -> Result<Json<Value>, ApiError> {
    let handle = handles.get_handle(&id).await?;
    Ok(Json(json!({
        "requested": id,
        "tenant": handle.tenant_id,
        "serial": handle.serial,
        "descriptor": handle.descriptor.to_string(),
    })))
}
