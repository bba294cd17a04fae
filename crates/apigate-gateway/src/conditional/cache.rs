//! `Cache-Control`, `Vary` and freshness headers.

use super::ConditionalMetadata;
use super::http_date::format_http_date;
use apigate_kernel::gateway::{CacheMode, HttpMethod, ResponseHeaders};

pub const PRIVATE_CACHE_CONTROL: &str = "private, must-revalidate, max-age=0";
pub const VARY: &str = "Accept-Encoding, Treat-as-Untrusted, Cookie";

/// Inputs for header emission, gathered over the request's lifetime.
#[derive(Debug, Clone, Default)]
pub struct CacheHeaders {
    pub mode: CacheMode,
    /// Client-requested `max-age` in seconds.
    pub max_age: u64,
    /// Client-requested `s-maxage` in seconds.
    pub s_max_age: u64,
    /// Whether the caller has a persistent (authenticated) session.
    pub authenticated: bool,
}

impl CacheHeaders {
    /// Write cache headers for the finished response.
    ///
    /// Errors are always private and never carry `ETag` or `Last-Modified`.
    /// Freshness headers are only sent for `GET` and `HEAD`.
    pub fn apply(
        &self,
        headers: &mut ResponseHeaders,
        is_error: bool,
        method: HttpMethod,
        metadata: &ConditionalMetadata,
    ) {
        if !is_error && method.is_safe_read() {
            if let Some(etag) = &metadata.etag {
                headers.set("ETag", etag.clone());
            }
            if let Some(last_modified) = metadata.last_modified {
                headers.set("Last-Modified", format_http_date(last_modified));
            }
        }

        let mode = if is_error { CacheMode::Private } else { self.mode };
        match mode {
            CacheMode::Private => {
                headers.set("Cache-Control", PRIVATE_CACHE_CONTROL);
            }
            CacheMode::AnonPublicUserPrivate if self.authenticated => {
                headers.set("Vary", VARY);
                headers.set("Cache-Control", PRIVATE_CACHE_CONTROL);
            }
            CacheMode::Public | CacheMode::AnonPublicUserPrivate => {
                headers.set("Vary", VARY);
                headers.set("Cache-Control", self.public_cache_control());
            }
        }
    }

    fn public_cache_control(&self) -> String {
        if self.s_max_age > 0 {
            format!(
                "s-maxage={}, max-age={}, public",
                self.s_max_age, self.max_age
            )
        } else {
            PRIVATE_CACHE_CONTROL.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn metadata() -> ConditionalMetadata {
        ConditionalMetadata {
            etag: Some("\"abc\"".into()),
            last_modified: Some(Utc.with_ymd_and_hms(2019, 1, 2, 3, 4, 5).unwrap()),
        }
    }

    fn apply(cache: &CacheHeaders, is_error: bool, method: HttpMethod) -> ResponseHeaders {
        let mut headers = ResponseHeaders::new();
        cache.apply(&mut headers, is_error, method, &metadata());
        headers
    }

    #[test]
    fn private_has_no_vary() {
        let headers = apply(&CacheHeaders::default(), false, HttpMethod::Get);
        assert_eq!(headers.get("Cache-Control"), Some(PRIVATE_CACHE_CONTROL));
        assert_eq!(headers.get("Vary"), None);
        assert_eq!(headers.get("ETag"), Some("\"abc\""));
        assert_eq!(
            headers.get("Last-Modified"),
            Some("Wed, 02 Jan 2019 03:04:05 GMT")
        );
    }

    #[test]
    fn public_with_smaxage() {
        let cache = CacheHeaders {
            mode: CacheMode::Public,
            max_age: 60,
            s_max_age: 300,
            authenticated: false,
        };
        let headers = apply(&cache, false, HttpMethod::Get);
        assert_eq!(headers.get("Vary"), Some(VARY));
        assert_eq!(
            headers.get("Cache-Control"),
            Some("s-maxage=300, max-age=60, public")
        );
    }

    #[test]
    fn public_without_smaxage_is_not_cached() {
        let cache = CacheHeaders {
            mode: CacheMode::Public,
            ..Default::default()
        };
        let headers = apply(&cache, false, HttpMethod::Get);
        assert_eq!(headers.get("Vary"), Some(VARY));
        assert_eq!(headers.get("Cache-Control"), Some(PRIVATE_CACHE_CONTROL));
    }

    #[test]
    fn anon_public_user_private_for_logged_in_caller() {
        let cache = CacheHeaders {
            mode: CacheMode::AnonPublicUserPrivate,
            max_age: 60,
            s_max_age: 300,
            authenticated: true,
        };
        let headers = apply(&cache, false, HttpMethod::Get);
        assert_eq!(headers.get("Vary"), Some(VARY));
        assert_eq!(headers.get("Cache-Control"), Some(PRIVATE_CACHE_CONTROL));
    }

    #[test]
    fn errors_are_private_without_freshness_headers() {
        let cache = CacheHeaders {
            mode: CacheMode::Public,
            s_max_age: 300,
            ..Default::default()
        };
        let headers = apply(&cache, true, HttpMethod::Get);
        assert_eq!(headers.get("Cache-Control"), Some(PRIVATE_CACHE_CONTROL));
        assert_eq!(headers.get("Vary"), None);
        assert_eq!(headers.get("ETag"), None);
        assert_eq!(headers.get("Last-Modified"), None);
    }

    #[test]
    fn post_gets_no_freshness_headers() {
        let headers = apply(&CacheHeaders::default(), false, HttpMethod::Post);
        assert_eq!(headers.get("ETag"), None);
        assert_eq!(headers.get("Last-Modified"), None);
    }
}
