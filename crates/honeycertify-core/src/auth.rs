//! Session claims consumed from the authentication collaborator

use async_trait::async_trait;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Claims carried by an authenticated session.
///
/// Only `company_id` matters for tenant routing; `user_id` is passed through
/// for handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "companyId")]
    pub company_id: Option<String>,
}

impl SessionClaims {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            company_id: None,
        }
    }

    pub fn with_company(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }
}

/// Authentication collaborator
///
/// Returns `None` for anonymous or invalid sessions; never fails the request
/// by itself. Endpoints decide whether a session is required.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<SessionClaims>;
}
