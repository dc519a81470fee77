//! Static bearer-token authentication.
//!
//! Each configured user gets one token. Browsers cannot set headers on a
//! WebSocket handshake, so a `token` query parameter is accepted as well.

use std::collections::HashMap;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use courier_core::Principal;
use courier_settings::AuthSettings;
use tracing::warn;

/// Resolves request credentials to a [`Principal`].
#[derive(Clone, Debug, Default)]
pub struct TokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl TokenAuthenticator {
    /// Build from the `auth` settings section. Blank tokens are skipped.
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let mut tokens = HashMap::new();
        for user in &settings.users {
            if user.token.trim().is_empty() {
                warn!(username = %user.username, "ignoring user with blank token");
                continue;
            }
            if tokens.insert(user.token.clone(), user.principal()).is_some() {
                warn!(username = %user.username, "duplicate token, last user wins");
            }
        }
        Self { tokens }
    }

    /// Builder: add one token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        let _ = self.tokens.insert(token.into(), principal);
        self
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are configured.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Look up a raw token.
    pub fn principal_for(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).cloned()
    }

    /// Resolve from the `Authorization` header, falling back to `query_token`.
    pub fn authenticate(&self, headers: &HeaderMap, query_token: Option<&str>) -> Option<Principal> {
        bearer_token(headers)
            .or(query_token)
            .and_then(|t| self.principal_for(t))
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
