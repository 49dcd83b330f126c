//! Tenant identifier resolution
//!
//! A request can name its tenant in four places. Sources are evaluated in a
//! fixed order and the last one that yields a valid identifier wins:
//!
//! 1. `Host` subdomain (`acme.example.com` → `acme`)
//! 2. Path segment after `company` (`/company/acme/...`)
//! 3. Company claim of the authenticated session
//! 4. `company` query parameter
//!
//! Resolution is pure: no I/O, no caching across requests.

use honeycertify_core::{SessionClaims, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

/// Header carrying the resolved tenant to downstream handlers
pub const TENANT_HEADER: &str = "x-company-id";

/// Where a tenant identifier was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    Subdomain,
    Path,
    SessionClaim,
    Query,
}

impl TenantSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantSource::Subdomain => "subdomain",
            TenantSource::Path => "path",
            TenantSource::SessionClaim => "session_claim",
            TenantSource::Query => "query",
        }
    }
}

impl fmt::Display for TenantSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a request the resolver looks at
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    pub host: Option<String>,
    pub path: String,
    pub query: HashMap<String, String>,
    pub claims: Option<SessionClaims>,
}

impl RequestParts {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_claims(mut self, claims: SessionClaims) -> Self {
        self.claims = Some(claims);
        self
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTenant {
    pub id: TenantId,
    pub source: TenantSource,
}

/// One place a tenant identifier can come from
pub trait TenantSourceResolver: Send + Sync {
    fn source(&self) -> TenantSource;

    /// Raw candidate, not yet validated
    fn extract(&self, parts: &RequestParts) -> Option<String>;
}

/// First label of the `Host` header
#[derive(Debug, Clone)]
pub struct SubdomainSource {
    base_domain: Option<String>,
    reserved: Vec<String>,
}

impl SubdomainSource {
    pub fn new(base_domain: Option<String>, reserved: Vec<String>) -> Self {
        Self {
            base_domain: base_domain.map(|d| d.trim_matches('.').to_ascii_lowercase()),
            reserved: reserved.into_iter().map(|r| r.to_ascii_lowercase()).collect(),
        }
    }
}

impl TenantSourceResolver for SubdomainSource {
    fn source(&self) -> TenantSource {
        TenantSource::Subdomain
    }

    fn extract(&self, parts: &RequestParts) -> Option<String> {
        let host = parts.host.as_deref()?.trim().to_ascii_lowercase();
        let hostname = strip_port(&host);

        if hostname.is_empty() || hostname.parse::<IpAddr>().is_ok() {
            return None;
        }
        if let Some(base) = &self.base_domain
            && hostname == base
        {
            return None;
        }

        let label = hostname.split('.').next()?;
        if label.is_empty() || self.reserved.iter().any(|r| r == label) {
            return None;
        }
        if let Some(base) = &self.base_domain
            && label.contains(base.as_str())
        {
            return None;
        }

        Some(label.to_string())
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// `/<segment>/<id>/...`
#[derive(Debug, Clone)]
pub struct PathSegmentSource {
    segment: String,
}

impl PathSegmentSource {
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
        }
    }
}

impl TenantSourceResolver for PathSegmentSource {
    fn source(&self) -> TenantSource {
        TenantSource::Path
    }

    fn extract(&self, parts: &RequestParts) -> Option<String> {
        let mut segments = parts.path.split('/').filter(|s| !s.is_empty());
        if segments.next()? != self.segment {
            return None;
        }
        segments.next().map(str::to_string)
    }
}

/// Company claim of the authenticated session
#[derive(Debug, Clone, Default)]
pub struct SessionClaimSource;

impl TenantSourceResolver for SessionClaimSource {
    fn source(&self) -> TenantSource {
        TenantSource::SessionClaim
    }

    fn extract(&self, parts: &RequestParts) -> Option<String> {
        parts.claims.as_ref()?.company_id.clone()
    }
}

/// Explicit query parameter
#[derive(Debug, Clone)]
pub struct QueryParamSource {
    param: String,
}

impl QueryParamSource {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl TenantSourceResolver for QueryParamSource {
    fn source(&self) -> TenantSource {
        TenantSource::Query
    }

    fn extract(&self, parts: &RequestParts) -> Option<String> {
        parts.query.get(&self.param).cloned()
    }
}

/// Resolver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Base domain the app is served under (e.g. `honeycertify.com`)
    #[serde(default)]
    pub base_domain: Option<String>,

    /// Labels that never name a tenant
    #[serde(default = "default_reserved_labels")]
    pub reserved_labels: Vec<String>,

    /// Literal path segment preceding a tenant id
    #[serde(default = "default_path_segment")]
    pub path_segment: String,

    /// Query parameter overriding every other source
    #[serde(default = "default_query_param")]
    pub query_param: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_domain: None,
            reserved_labels: default_reserved_labels(),
            path_segment: default_path_segment(),
            query_param: default_query_param(),
        }
    }
}

fn default_reserved_labels() -> Vec<String> {
    vec!["www".to_string(), "localhost".to_string()]
}

fn default_path_segment() -> String {
    "company".to_string()
}

fn default_query_param() -> String {
    "company".to_string()
}

/// Ordered list of sources; the last non-empty valid result wins
pub struct TenantResolver {
    sources: Vec<Box<dyn TenantSourceResolver>>,
}

impl TenantResolver {
    /// Build a resolver from explicit sources, lowest precedence first
    pub fn new(sources: Vec<Box<dyn TenantSourceResolver>>) -> Self {
        Self { sources }
    }

    /// Standard precedence: subdomain, path, session claim, query
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(vec![
            Box::new(SubdomainSource::new(
                config.base_domain.clone(),
                config.reserved_labels.clone(),
            )),
            Box::new(PathSegmentSource::new(config.path_segment.clone())),
            Box::new(SessionClaimSource),
            Box::new(QueryParamSource::new(config.query_param.clone())),
        ])
    }

    pub fn resolve(&self, parts: &RequestParts) -> Option<ResolvedTenant> {
        let mut resolved = None;

        for source in &self.sources {
            let Some(candidate) = source.extract(parts) else {
                continue;
            };
            match TenantId::new(&candidate) {
                Ok(id) => {
                    resolved = Some(ResolvedTenant {
                        id,
                        source: source.source(),
                    });
                }
                Err(e) => {
                    debug!(source = %source.source(), error = %e, "Ignoring invalid tenant candidate");
                }
            }
        }

        resolved
    }
}

impl Default for TenantResolver {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}
