//! Core data types for the gateway kernel contract.
//!
//! These types are shared across all gateway traits
//! ([`ApiModule`](super::module::ApiModule),
//! [`LagProbe`](super::store::LagProbe),
//! [`OriginPolicy`](super::hooks::OriginPolicy))
//! and carry no runtime dependencies beyond `serde`, `chrono` and `std`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// ─────────────────────────────────────────────────────────────────────────────
// HTTP primitives
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP method, covering the verbs an API client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    /// Case-insensitive parse from a string slice.
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "HEAD" => Some(HttpMethod::Head),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    /// Return the standard uppercase string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// `GET` and `HEAD` are the only methods conditional caching applies to.
    pub fn is_safe_read(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameters
// ─────────────────────────────────────────────────────────────────────────────

/// A single request parameter value.
///
/// Array-style encodings (`name[]=a&name[]=b`) are not supported by the API;
/// the transport layer maps them to [`ParamValue::MalformedArray`] so the
/// gateway can warn and treat the parameter as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Scalar(String),
    MalformedArray,
}

impl ParamValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ParamValue::Scalar(v) => Some(v),
            ParamValue::MalformedArray => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Caller identity
// ─────────────────────────────────────────────────────────────────────────────

/// Session token value every anonymous caller holds, for every token kind.
pub const ANONYMOUS_TOKEN: &str = "+\\";

/// The identity a request executes as.
///
/// Immutable for the lifetime of the request. When the gateway decides the
/// request lacks same-origin guarantees it swaps in a fresh anonymous
/// identity rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    name: Option<String>,
    rights: BTreeSet<String>,
    language: Option<String>,
    tokens: HashMap<String, String>,
}

impl CallerIdentity {
    /// An anonymous caller holding the given rights.
    pub fn anonymous(rights: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: None,
            rights: rights.into_iter().map(Into::into).collect(),
            language: None,
            tokens: HashMap::new(),
        }
    }

    /// An authenticated caller.
    pub fn authenticated(
        name: impl Into<String>,
        rights: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            rights: rights.into_iter().map(Into::into).collect(),
            language: None,
            tokens: HashMap::new(),
        }
    }

    /// Builder: set the caller's preferred interface language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Builder: attach a session token of the given kind (e.g. `csrf`).
    pub fn with_token(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.tokens.insert(kind.into(), value.into());
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn has_right(&self, right: &str) -> bool {
        self.rights.contains(right)
    }

    pub fn rights(&self) -> impl Iterator<Item = &str> {
        self.rights.iter().map(String::as_str)
    }

    /// The session token of `kind`, if the caller has one.
    ///
    /// Anonymous callers have no session, so every kind resolves to
    /// [`ANONYMOUS_TOKEN`].
    pub fn token(&self, kind: &str) -> Option<&str> {
        if self.is_anonymous() {
            return Some(ANONYMOUS_TOKEN);
        }
        self.tokens.get(kind).map(String::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound API request.
///
/// Read-only for the whole pipeline. Parameter order is preserved because
/// the unrecognized-parameter warning lists keys in the order they arrived.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Unique identifier for correlating this request across logs and errors.
    pub id: String,
    pub method: HttpMethod,
    params: Vec<(String, ParamValue)>,
    /// Header names are lowercased on insertion.
    headers: HashMap<String, String>,
    pub caller: CallerIdentity,
}

impl ApiRequest {
    /// Construct a request with no parameters or headers.
    pub fn new(id: impl Into<String>, method: HttpMethod, caller: CallerIdentity) -> Self {
        Self {
            id: id.into(),
            method,
            params: Vec::new(),
            headers: HashMap::new(),
            caller,
        }
    }

    /// Builder helper: add a scalar parameter. A repeated name replaces the
    /// earlier value but keeps its original position.
    pub fn with_param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_param_value(name, ParamValue::Scalar(value.into()))
    }

    /// Builder helper: add a parameter that arrived in array syntax.
    pub fn with_array_param(self, name: impl Into<String>) -> Self {
        self.with_param_value(name, ParamValue::MalformedArray)
    }

    pub fn with_param_value(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        let name = name.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Builder helper: attach a header. Repeated lines of the same header
    /// are joined with `", "`, which HTTP treats as one list.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        self.headers
            .entry(key.into().to_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.clone());
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Scalar value of a parameter without recording it as used.
    pub fn scalar(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(ParamValue::as_scalar)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(n, _)| n.as_str())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_lowercase())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache mode
// ─────────────────────────────────────────────────────────────────────────────

/// Who may cache a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheMode {
    #[default]
    Private,
    Public,
    AnonPublicUserPrivate,
}

impl CacheMode {
    /// Parse a mode name. Unrecognized names become [`CacheMode::Private`].
    pub fn parse(s: &str) -> Self {
        match s {
            "public" => CacheMode::Public,
            "anon-public-user-private" => CacheMode::AnonPublicUserPrivate,
            _ => CacheMode::Private,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Private => "private",
            CacheMode::Public => "public",
            CacheMode::AnonPublicUserPrivate => "anon-public-user-private",
        }
    }

    /// Downgrade to [`CacheMode::Private`] unless the content is publicly
    /// readable.
    pub fn restrict(self, publicly_readable: bool) -> Self {
        if publicly_readable { self } else { CacheMode::Private }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered response headers with case-insensitive replacement semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The gateway's answer to one request.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    pub headers: ResponseHeaders,
    /// The serialized result tree; `None` for `304 Not Modified`.
    pub body: Option<serde_json::Value>,
    /// Error codes of an aborted request; empty when the request completed.
    pub error_codes: Vec<String>,
}

impl ApiResponse {
    pub fn is_error(&self) -> bool {
        !self.error_codes.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Source of the current time, injectable so timestamps are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let req = ApiRequest::new("r1", HttpMethod::Get, CallerIdentity::anonymous(["read"]))
            .with_header("TrEaT-As-UnTrUsTeD", "");
        assert!(req.has_header("treat-as-untrusted"));
        assert_eq!(req.header("Treat-as-Untrusted"), Some(""));
    }

    #[test]
    fn repeated_header_lines_are_joined() {
        let req = ApiRequest::new("r1", HttpMethod::Get, CallerIdentity::anonymous(["read"]))
            .with_header("If-None-Match", "W/\"a\"")
            .with_header("if-none-match", "\"b\"");
        assert_eq!(req.header("If-None-Match"), Some("W/\"a\", \"b\""));
    }

    #[test]
    fn repeated_param_keeps_first_position() {
        let req = ApiRequest::new("r1", HttpMethod::Get, CallerIdentity::anonymous(["read"]))
            .with_param("a", "1")
            .with_param("b", "2")
            .with_param("a", "3");
        assert_eq!(req.param_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(req.scalar("a"), Some("3"));
    }

    #[test]
    fn array_param_has_no_scalar_value() {
        let req = ApiRequest::new("r1", HttpMethod::Get, CallerIdentity::anonymous(["read"]))
            .with_array_param("siprop");
        assert!(req.has_param("siprop"));
        assert_eq!(req.scalar("siprop"), None);
    }

    #[test]
    fn unrecognized_cache_mode_is_private() {
        assert_eq!(CacheMode::parse("unrecognized"), CacheMode::Private);
        assert_eq!(CacheMode::parse("public"), CacheMode::Public);
        assert_eq!(
            CacheMode::parse("anon-public-user-private"),
            CacheMode::AnonPublicUserPrivate
        );
    }

    #[test]
    fn cache_mode_restrict_downgrades_without_read() {
        assert_eq!(CacheMode::Public.restrict(false), CacheMode::Private);
        assert_eq!(
            CacheMode::AnonPublicUserPrivate.restrict(false),
            CacheMode::Private
        );
        assert_eq!(CacheMode::Public.restrict(true), CacheMode::Public);
    }

    #[test]
    fn anonymous_token_is_fixed() {
        let anon = CallerIdentity::anonymous(["read"]);
        assert_eq!(anon.token("csrf"), Some(ANONYMOUS_TOKEN));

        let user = CallerIdentity::authenticated("Alice", ["read"]).with_token("csrf", "abc+\\");
        assert_eq!(user.token("csrf"), Some("abc+\\"));
        assert_eq!(user.token("rollback"), None);
    }

    #[test]
    fn response_headers_replace_ignoring_case() {
        let mut headers = ResponseHeaders::new();
        headers.set("Cache-Control", "private");
        headers.set("cache-control", "public");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("CACHE-CONTROL"), Some("public"));
    }
}
