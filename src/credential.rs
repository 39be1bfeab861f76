//! Mapping bearer tokens to rate-limit principals.
//!
//! The binding layer owns credentials; this crate only needs to know which principal a bearer
//! token belongs to. Tokens the resolver does not know are not throttled.

use crate::rate_limit::RateLimitKey;
use dashmap::DashMap;

/// Resolves the rate-limit principal behind a bearer token.
pub trait CredentialResolver: Send + Sync + std::fmt::Debug {
    /// `None` when the token is unknown; the call then proceeds unthrottled.
    fn resolve(&self, access_token: &str) -> Option<RateLimitKey>;
}

/// An OAuth credential as far as rate limiting is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), client_id: None, user_id: None }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// `client_id:user_id` for user tokens, the client id alone for app tokens, the user id
    /// alone when the client is unknown.
    pub fn rate_limit_key(&self) -> Option<RateLimitKey> {
        let client = self.client_id.as_deref().filter(|s| !s.is_empty());
        let user = self.user_id.as_deref().filter(|s| !s.is_empty());
        let id = match (client, user) {
            (Some(c), Some(u)) => format!("{c}:{u}"),
            (Some(c), None) => c.to_string(),
            (None, Some(u)) => u.to_string(),
            (None, None) => return None,
        };
        Some(RateLimitKey::principal(id))
    }
}

/// In-memory token cache the binding layer fills as it validates credentials.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: DashMap<String, Credential>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `credential`, replacing any previous entry for its token.
    pub fn insert(&self, credential: Credential) {
        self.entries.insert(credential.access_token.clone(), credential);
    }

    pub fn remove(&self, access_token: &str) -> Option<Credential> {
        self.entries.remove(access_token).map(|(_, c)| c)
    }

    pub fn get(&self, access_token: &str) -> Option<Credential> {
        self.entries.get(access_token).map(|c| c.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CredentialResolver for TokenCache {
    fn resolve(&self, access_token: &str) -> Option<RateLimitKey> {
        self.entries.get(access_token).and_then(|c| c.rate_limit_key())
    }
}
