//! Application state and HTTP routes
//!
//! The state is generic over the tenant `Connector`, so the same routes run
//! against PostgreSQL pools in production and mock handles in tests.

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
};
use honeycertify_core::{
    Authenticator, ConnectionDescriptor, Connector, Error, TenantConfig, TenantId, TenantRegistry,
};
use honeycertify_ingress::{
    ApiError, RequireTenant, TenantResolutionState, session_auth_middleware,
    tenant_resolution_middleware,
};
use honeycertify_observability::{
    ComponentStatus, HealthState, Metrics, ReadinessChecker, StatsProvider, health_router,
};
use honeycertify_tenancy::{HandleCache, Provisioner, TenantDirectory, TenantResolver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::auth::{AdminToken, require_admin_token};

/// Shared state behind every route
pub struct AppState<C: Connector> {
    pub resolver: Arc<TenantResolver>,
    pub authenticator: Arc<dyn Authenticator>,
    pub directory: Arc<TenantDirectory>,
    pub handles: Arc<HandleCache<C>>,
    pub provisioner: Arc<Provisioner>,
    pub metrics: Arc<Metrics>,
    pub admin_token: AdminToken,
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            authenticator: self.authenticator.clone(),
            directory: self.directory.clone(),
            handles: self.handles.clone(),
            provisioner: self.provisioner.clone(),
            metrics: self.metrics.clone(),
            admin_token: self.admin_token.clone(),
        }
    }
}

/// Build the full router: tenant routes, admin routes and health endpoints
pub fn router<C: Connector>(state: AppState<C>, request_timeout: Duration) -> Router {
    let resolution = TenantResolutionState::new(state.resolver.clone())
        .with_metrics(state.metrics.clone());

    let tenant_routes = Router::new()
        .route("/api/tenant", get(current_tenant::<C>))
        .route("/company/{id}/tenant", get(current_tenant::<C>))
        .layer(middleware::from_fn_with_state(
            resolution,
            tenant_resolution_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            session_auth_middleware,
        ));

    let admin_routes = Router::new()
        .route(
            "/admin/tenants",
            post(create_tenant::<C>).get(list_tenants::<C>),
        )
        .route("/admin/tenants/{id}/resume", post(resume_tenant::<C>))
        .route("/admin/tenants/{id}/activate", post(activate_tenant::<C>))
        .route("/admin/tenants/{id}/deactivate", post(deactivate_tenant::<C>))
        .route("/admin/tenants/{id}/descriptor", put(rotate_descriptor::<C>))
        .route("/admin/provisioning/cleanup", post(cleanup_stalled::<C>))
        .layer(middleware::from_fn_with_state(
            state.admin_token.clone(),
            require_admin_token,
        ));

    let health_state = HealthState::with_readiness_checker(
        state.metrics.clone(),
        Arc::new(RegistryReadiness {
            registry: state.directory.registry().clone(),
        }),
    )
    .with_stats_provider(Arc::new(HandleCacheStatsProvider {
        handles: state.handles.clone(),
    }));

    tenant_routes
        .merge(admin_routes)
        .with_state(state)
        .merge(health_router(health_state))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Tenant of the current request, after acquiring and pinging its handle
async fn current_tenant<C: Connector>(
    State(state): State<AppState<C>>,
    RequireTenant(id): RequireTenant,
) -> Result<Json<TenantConfig>, ApiError> {
    let started = Instant::now();
    let acquired = state.handles.get_handle(&id).await;
    let outcome = match &acquired {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    state
        .metrics
        .record_handle_acquisition(outcome, started.elapsed().as_secs_f64());

    let handle = acquired?;
    state.handles.connector().ping(&handle).await?;

    let config = state.directory.resolve_config(&id).await?;
    Ok(Json(config))
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub company_name: String,
    pub subdomain: String,
}

async fn create_tenant<C: Connector>(
    State(state): State<AppState<C>>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantConfig>), ApiError> {
    let result = state
        .provisioner
        .create_tenant(&request.company_name, &request.subdomain)
        .await;
    let config = record_provisioning(&state.metrics, result)?;
    Ok((StatusCode::CREATED, Json(config)))
}

async fn resume_tenant<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<TenantConfig>, ApiError> {
    let id = TenantId::new(id)?;
    let result = state.provisioner.resume(&id).await;
    Ok(Json(record_provisioning(&state.metrics, result)?))
}

fn record_provisioning(
    metrics: &Metrics,
    result: honeycertify_core::Result<TenantConfig>,
) -> honeycertify_core::Result<TenantConfig> {
    match &result {
        Ok(_) => metrics.record_provisioning_success(),
        Err(Error::Provisioning { step, .. }) => metrics.record_provisioning_failure(step.as_str()),
        Err(_) => {}
    }
    result
}

async fn list_tenants<C: Connector>(
    State(state): State<AppState<C>>,
) -> Result<Json<Vec<TenantConfig>>, ApiError> {
    Ok(Json(state.directory.list().await?))
}

#[derive(Debug, Serialize)]
pub struct ActivationResponse {
    pub id: TenantId,
    pub active: bool,
}

async fn activate_tenant<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<ActivationResponse>, ApiError> {
    let id = TenantId::new(id)?;
    state.directory.set_active(&id, true).await?;
    Ok(Json(ActivationResponse { id, active: true }))
}

async fn deactivate_tenant<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<ActivationResponse>, ApiError> {
    let id = TenantId::new(id)?;
    state.directory.set_active(&id, false).await?;
    state.handles.evict(&id).await;
    Ok(Json(ActivationResponse { id, active: false }))
}

#[derive(Debug, Deserialize)]
pub struct RotateDescriptorRequest {
    pub connection_url: String,
}

async fn rotate_descriptor<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
    Json(request): Json<RotateDescriptorRequest>,
) -> Result<StatusCode, ApiError> {
    let id = TenantId::new(id)?;
    let descriptor = ConnectionDescriptor::new(request.connection_url);
    state.directory.rotate_descriptor(&id, &descriptor).await?;
    let evicted = state.handles.evict(&id).await;
    info!(tenant_id = %id, evicted, "Descriptor rotated");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    #[serde(default = "default_older_than_secs")]
    pub older_than_secs: u64,
}

fn default_older_than_secs() -> u64 {
    3600
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub abandoned: Vec<TenantId>,
}

async fn cleanup_stalled<C: Connector>(
    State(state): State<AppState<C>>,
    Json(request): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let abandoned = state
        .provisioner
        .cleanup_stalled(Duration::from_secs(request.older_than_secs))
        .await?;
    Ok(Json(CleanupResponse { abandoned }))
}

/// `/readyz` component backed by the master registry
pub struct RegistryReadiness {
    pub registry: Arc<dyn TenantRegistry>,
}

#[async_trait]
impl ReadinessChecker for RegistryReadiness {
    async fn check(&self) -> Vec<ComponentStatus> {
        match self.registry.ping().await {
            Ok(()) => vec![ComponentStatus::healthy("registry")],
            Err(e) => vec![ComponentStatus::unhealthy("registry", e.to_string())],
        }
    }
}

/// Mirrors handle cache counters into the metrics gauges
pub struct HandleCacheStatsProvider<C: Connector> {
    pub handles: Arc<HandleCache<C>>,
}

impl<C: Connector> StatsProvider for HandleCacheStatsProvider<C> {
    fn refresh(&self, metrics: &Metrics) {
        let stats = self.handles.stats();
        metrics.update_handle_cache(
            stats.hits,
            stats.misses,
            stats.connects,
            stats.evictions,
            stats.size,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use honeycertify_core::{ProvisioningState, SessionClaims};
    use honeycertify_tenancy::testing::{
        MockConnector, MockMigrationRunner, MockStoreAdmin, ready_config,
    };
    use honeycertify_tenancy::{HandleCacheConfig, InMemoryTenantRegistry, ResolverConfig};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::auth::HmacSessionAuthenticator;

    const ADMIN: &str = "admin-token";

    struct Harness {
        app: Router,
        connector: Arc<MockConnector>,
        migrations: Arc<MockMigrationRunner>,
        stores: Arc<MockStoreAdmin>,
        directory: Arc<TenantDirectory>,
    }

    fn harness() -> Harness {
        let registry = Arc::new(InMemoryTenantRegistry::with_tenants(vec![
            ready_config("acme", "acme"),
            ready_config("globex", "globex"),
        ]));
        let directory = Arc::new(TenantDirectory::new(registry));
        let connector = Arc::new(MockConnector::new());
        let stores = Arc::new(MockStoreAdmin::new());
        let migrations = Arc::new(MockMigrationRunner::new());
        let handles = Arc::new(HandleCache::new(
            directory.clone(),
            connector.clone(),
            HandleCacheConfig::default(),
        ));
        let provisioner = Arc::new(Provisioner::new(
            directory.clone(),
            stores.clone(),
            migrations.clone(),
        ));

        let state = AppState {
            resolver: Arc::new(TenantResolver::from_config(&ResolverConfig {
                base_domain: Some("honeycertify.com".to_string()),
                ..Default::default()
            })),
            authenticator: Arc::new(HmacSessionAuthenticator::new("secret")),
            directory: directory.clone(),
            handles,
            provisioner,
            metrics: Arc::new(Metrics::new().unwrap()),
            admin_token: AdminToken::new(Some(ADMIN)),
        };

        Harness {
            app: router(state, Duration::from_secs(5)),
            connector,
            migrations,
            stores,
            directory,
        }
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn admin(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", ADMIN))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_current_tenant_by_subdomain() {
        let h = harness();
        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/tenant")
                    .header("host", "acme.honeycertify.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["id"], "acme");
        assert_eq!(body["state"], "ready");
        assert!(body.get("descriptor").is_none());
        assert_eq!(h.connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_current_tenant_by_path() {
        let h = harness();
        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/company/globex/tenant")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["id"], "globex");
    }

    #[tokio::test]
    async fn test_session_claim_selects_tenant() {
        let h = harness();
        let token = HmacSessionAuthenticator::new("secret")
            .issue(&SessionClaims::new("user-1").with_company("globex"))
            .unwrap();

        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/tenant")
                    .header("host", "acme.honeycertify.com")
                    .header("cookie", format!("hc_session={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(json(response).await["id"], "globex");
    }

    #[tokio::test]
    async fn test_missing_tenant_is_unauthorized() {
        let h = harness();
        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/tenant")
                    .header("host", "www.honeycertify.com")
                    .header("x-company-id", "acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["error"]["type"], "tenant_not_resolved");
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found() {
        let h = harness();
        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/tenant?company=initech")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(h.connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unavailable() {
        let h = harness();
        h.connector.set_failing(true);
        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/tenant?company=acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_admin_requires_token() {
        let h = harness();
        let response = h
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/tenants/acme/deactivate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_provision_then_route() {
        let h = harness();
        let response = h
            .app
            .clone()
            .oneshot(admin(
                "POST",
                "/admin/tenants",
                serde_json::json!({"company_name": "Busy Bees", "subdomain": "busybees"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json(response).await;
        assert_eq!(body["state"], "ready");
        assert_eq!(body["subdomain"], "busybees");
        assert_eq!(h.stores.create_count(), 1);
        assert_eq!(h.migrations.applied().len(), 1);

        let response = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/api/tenant")
                    .header("host", "busybees.honeycertify.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["subdomain"], "busybees");
    }

    #[tokio::test]
    async fn test_provision_validation_error() {
        let h = harness();
        let response = h
            .app
            .oneshot(admin(
                "POST",
                "/admin/tenants",
                serde_json::json!({"company_name": "Acme Again", "subdomain": "acme"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"]["type"], "provisioning_failure");
    }

    #[tokio::test]
    async fn test_failed_provisioning_can_be_resumed() {
        let h = harness();
        h.migrations.set_failing(true);
        let response = h
            .app
            .clone()
            .oneshot(admin(
                "POST",
                "/admin/tenants",
                serde_json::json!({"company_name": "Hive Co", "subdomain": "hiveco"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let records = h.directory.list().await.unwrap();
        let stalled = records.iter().find(|c| c.subdomain == "hiveco").unwrap();
        assert_eq!(stalled.state, ProvisioningState::Registered);

        h.migrations.set_failing(false);
        let response = h
            .app
            .oneshot(admin(
                "POST",
                &format!("/admin/tenants/{}/resume", stalled.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["state"], "ready");
    }

    #[tokio::test]
    async fn test_deactivate_closes_handle() {
        let h = harness();
        let tenant = || {
            Request::builder()
                .uri("/api/tenant?company=acme")
                .body(Body::empty())
                .unwrap()
        };

        let response = h.app.clone().oneshot(tenant()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = h
            .app
            .clone()
            .oneshot(admin(
                "POST",
                "/admin/tenants/acme/deactivate",
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.connector.closed().len(), 1);

        let response = h.app.oneshot(tenant()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rotate_descriptor_reconnects() {
        let h = harness();
        let tenant = || {
            Request::builder()
                .uri("/api/tenant?company=acme")
                .body(Body::empty())
                .unwrap()
        };

        h.app.clone().oneshot(tenant()).await.unwrap();
        let response = h
            .app
            .clone()
            .oneshot(admin(
                "PUT",
                "/admin/tenants/acme/descriptor",
                serde_json::json!({"connection_url": "mock://acme-v2"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        h.app.oneshot(tenant()).await.unwrap();
        assert_eq!(h.connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_reports_cache() {
        let h = harness();
        h.app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/tenant?company=acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = h
            .app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("honeycertify_handle_cache_connects 1"));
        assert!(text.contains("honeycertify_tenant_resolutions_total{source=\"query\"} 1"));
        assert!(text.contains("honeycertify_handle_acquisitions_total{outcome=\"ok\"} 1"));
    }

    #[tokio::test]
    async fn test_readyz_pings_registry() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["components"][0]["name"], "registry");
    }
}
