//! Extractors for tenant-scoped handlers

use axum::{extract::FromRequestParts, http::request::Parts};
use honeycertify_core::{Error, SessionClaims, TenantId};
use honeycertify_tenancy::TENANT_HEADER;

use crate::error::ApiError;

/// The tenant this request was resolved to
///
/// Reads the `x-company-id` header written by `tenant_resolution_middleware`.
/// Rejects with 401 when no tenant was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireTenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for RequireTenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError(Error::TenantNotResolved))?;

        let id = TenantId::new(value).map_err(|_| ApiError(Error::TenantNotResolved))?;
        Ok(Self(id))
    }
}

/// An authenticated session, required
#[derive(Debug, Clone)]
pub struct RequireSession(pub SessionClaims);

impl<S: Send + Sync> FromRequestParts<S> for RequireSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .map(Self)
            .ok_or_else(|| ApiError(Error::Unauthorized("session required".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn tenant_from(req: Request<()>) -> Result<RequireTenant, ApiError> {
        let (mut parts, _) = req.into_parts();
        RequireTenant::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_require_tenant_present() {
        let req = Request::builder()
            .header(TENANT_HEADER, "acme")
            .body(())
            .unwrap();
        let RequireTenant(id) = tenant_from(req).await.unwrap();
        assert_eq!(id.as_str(), "acme");
    }

    #[tokio::test]
    async fn test_require_tenant_missing() {
        let err = tenant_from(Request::builder().body(()).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(matches!(err.0, Error::TenantNotResolved));
    }

    #[tokio::test]
    async fn test_require_tenant_invalid() {
        let req = Request::builder()
            .header(TENANT_HEADER, "a/b")
            .body(())
            .unwrap();
        assert!(tenant_from(req).await.is_err());
    }

    #[tokio::test]
    async fn test_require_session() {
        let mut req = Request::builder().body(()).unwrap();
        req.extensions_mut().insert(SessionClaims::new("user-7"));
        let (mut parts, _) = req.into_parts();

        let RequireSession(claims) = RequireSession::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(claims.user_id, "user-7");

        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let err = RequireSession::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
