//! API-key session resolution.
//!
//! A caller is identified by a key in either:
//! - `X-Api-Key: <key>` header
//! - `Authorization: Bearer <key>` header
//!
//! Keys are matched against the configured `[[users]]`. Requests without a
//! key, or with an unknown one, run as the anonymous identity.

use apigate_kernel::config::{GatewaySettings, UserSettings};
use apigate_kernel::gateway::CallerIdentity;
use axum::http::HeaderMap;
use std::collections::HashMap;
use tracing::warn;

/// Maps API keys to caller identities.
#[derive(Debug, Clone, Default)]
pub struct SessionResolver {
    users: HashMap<String, CallerIdentity>,
    anonymous_rights: Vec<String>,
}

impl SessionResolver {
    pub fn new(
        users: &[UserSettings],
        anonymous_rights: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let users = users
            .iter()
            .map(|user| (user.api_key.clone(), identity_for(user)))
            .collect();
        Self {
            users,
            anonymous_rights: anonymous_rights.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self::new(&settings.users, settings.anonymous_rights.iter().cloned())
    }

    pub fn anonymous(&self) -> CallerIdentity {
        CallerIdentity::anonymous(self.anonymous_rights.iter().cloned())
    }

    pub fn resolve(&self, headers: &HeaderMap) -> CallerIdentity {
        let Some(key) = extract_key(headers) else {
            return self.anonymous();
        };
        match self.users.get(key) {
            Some(identity) => identity.clone(),
            None => {
                warn!("unknown API key; continuing as anonymous");
                self.anonymous()
            }
        }
    }
}

fn extract_key(headers: &HeaderMap) -> Option<&str> {
    // `X-Api-Key` wins over `Authorization`.
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
}

fn identity_for(user: &UserSettings) -> CallerIdentity {
    let mut identity = CallerIdentity::authenticated(user.name.clone(), user.rights.iter().cloned());
    if let Some(language) = &user.language {
        identity = identity.with_language(language.clone());
    }
    for (kind, token) in &user.tokens {
        identity = identity.with_token(kind.clone(), token.clone());
    }
    identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver() -> SessionResolver {
        let alice = UserSettings {
            name: "Alice".into(),
            api_key: "sk-alice".into(),
            rights: vec!["read".into(), "writeapi".into(), "bot".into()],
            language: Some("fr".into()),
            tokens: HashMap::from([("csrf".to_string(), "abc+\\".to_string())]),
        };
        SessionResolver::new(&[alice], ["read"])
    }

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn x_api_key_resolves_user() {
        let caller = resolver().resolve(&headers("x-api-key", "sk-alice"));
        assert_eq!(caller.name(), Some("Alice"));
        assert!(caller.has_right("bot"));
        assert_eq!(caller.language(), Some("fr"));
        assert_eq!(caller.token("csrf"), Some("abc+\\"));
    }

    #[test]
    fn bearer_token_resolves_user() {
        let caller = resolver().resolve(&headers("authorization", "Bearer sk-alice"));
        assert_eq!(caller.name(), Some("Alice"));
    }

    #[test]
    fn missing_or_unknown_key_is_anonymous() {
        let r = resolver();
        let anon = r.resolve(&HeaderMap::new());
        assert!(anon.is_anonymous());
        assert!(anon.has_right("read"));
        assert!(!anon.has_right("writeapi"));

        assert!(r.resolve(&headers("x-api-key", "sk-nobody")).is_anonymous());
        assert!(r.resolve(&headers("authorization", "Basic sk-alice")).is_anonymous());
    }
}
