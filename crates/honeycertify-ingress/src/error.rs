//! HTTP mapping for core errors

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use honeycertify_core::{Error, ProvisioningStep};
use tracing::error;

/// A core `Error` rendered as a JSON error response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::TenantNotResolved | Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::TenantNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTenant(_) => StatusCode::BAD_REQUEST,
            Error::Provisioning {
                step: ProvisioningStep::Validate,
                ..
            } => StatusCode::BAD_REQUEST,
            Error::Connection(_) | Error::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Provisioning { .. }
            | Error::Database(_)
            | Error::Config(_)
            | Error::Internal(_)
            | Error::Serialization(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
        }

        let body = serde_json::json!({
            "error": {
                "type": self.0.kind(),
                "message": self.0.to_string(),
                "code": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::TenantNotResolved, StatusCode::UNAUTHORIZED),
            (Error::TenantNotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::InvalidTenant("x".into()), StatusCode::BAD_REQUEST),
            (
                Error::provisioning(ProvisioningStep::Validate, "bad subdomain"),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::provisioning(ProvisioningStep::ApplyMigrations, "boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (Error::Connection("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Timeout("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (Error::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }

    #[tokio::test]
    async fn test_json_body() {
        let response = ApiError(Error::TenantNotFound("acme".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "tenant_not_found");
        assert_eq!(json["error"]["message"], "Tenant not found: acme");
        assert_eq!(json["error"]["code"], 404);
    }
}
