//! Session and admin authentication
//!
//! Session tokens are `<payload>.<signature>` where the payload is the
//! base64url (unpadded) JSON of `SessionClaims` and the signature is
//! hex(HMAC-SHA256(secret, payload)). Tokens arrive as
//! `Authorization: Bearer <token>` or in the `hc_session` cookie.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use honeycertify_core::{Authenticator, Error, SessionClaims};
use honeycertify_ingress::ApiError;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "hc_session";

/// Verifies HMAC-signed session tokens
pub struct HmacSessionAuthenticator {
    secret: Vec<u8>,
}

impl HmacSessionAuthenticator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Sign `claims` into a token
    pub fn issue(&self, claims: &SessionClaims) -> honeycertify_core::Result<String> {
        let json = serde_json::to_vec(claims)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Claims carried by `token`, if its signature is valid
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        let (payload, signature) = token.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    fn mac(&self) -> honeycertify_core::Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Config(format!("Invalid session secret: {}", e)))
    }
}

#[async_trait]
impl Authenticator for HmacSessionAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<SessionClaims> {
        let token = bearer_token(headers).or_else(|| session_cookie(headers))?;
        let claims = self.verify(token);
        if claims.is_none() {
            debug!("Rejected session token with an invalid signature");
        }
        claims
    }
}

/// Used when no session secret is configured
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(&self, _headers: &HeaderMap) -> Option<SessionClaims> {
        None
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then_some(value)
        })
}

/// Admin bearer token; `None` closes the admin routes
#[derive(Clone)]
pub struct AdminToken(Option<Arc<[u8]>>);

impl AdminToken {
    pub fn new(token: Option<&str>) -> Self {
        Self(token.map(|t| Arc::<[u8]>::from(Sha256::digest(t.as_bytes()).as_slice())))
    }

    fn accepts(&self, candidate: &str) -> bool {
        match &self.0 {
            Some(expected) => Sha256::digest(candidate.as_bytes()).as_slice() == &expected[..],
            None => false,
        }
    }
}

/// Reject requests without the admin bearer token
pub async fn require_admin_token(
    State(token): State<AdminToken>,
    req: Request,
    next: Next,
) -> Response {
    match bearer_token(req.headers()) {
        Some(candidate) if token.accepts(candidate) => next.run(req).await,
        _ => {
            warn!(path = %req.uri().path(), "Rejected admin request");
            ApiError(Error::Unauthorized("admin token required".to_string())).into_response()
        }
    }
}
