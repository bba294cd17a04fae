//! HTTP conditional requests and cache headers.
//!
//! [`ConditionalNegotiator::evaluate`] decides whether a read can be
//! answered with `304 Not Modified` before the module executes.
//! [`cache::CacheHeaders`] writes `Cache-Control`, `Vary`, `ETag` and
//! `Last-Modified` once the outcome is known.

pub mod cache;
pub mod http_date;

pub use cache::CacheHeaders;
pub use http_date::{format_http_date, parse_http_date};

use apigate_kernel::gateway::{ApiModule, ApiRequest, ConditionalKind, ConditionalValue};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::LazyLock;

static ENTITY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:W/)?"[^"]*""#).expect("entity tag pattern is valid"));

/// Freshness metadata supplied by a module for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalMetadata {
    /// Entity tag in header form.
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ConditionalMetadata {
    /// Ask the module for both kinds of metadata.
    pub fn collect(module: &dyn ApiModule, request: &ApiRequest) -> Self {
        let etag = match module.conditional_request_data(ConditionalKind::ETag, request) {
            Some(ConditionalValue::ETag(tag)) => Some(normalize_etag(&tag)),
            _ => None,
        };
        let last_modified =
            match module.conditional_request_data(ConditionalKind::LastModified, request) {
                Some(ConditionalValue::LastModified(at)) => Some(at),
                _ => None,
            };
        Self {
            etag,
            last_modified,
        }
    }
}

/// Result of conditional evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOutcome {
    /// Run the module and answer `200`.
    Modified,
    /// Answer `304` without running the module.
    NotModified,
}

impl ConditionalOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            ConditionalOutcome::Modified => 200,
            ConditionalOutcome::NotModified => 304,
        }
    }
}

/// Evaluates `If-None-Match` and `If-Modified-Since`.
#[derive(Debug, Clone, Default)]
pub struct ConditionalNegotiator {
    /// Content is never reported as modified before this instant.
    cache_epoch: Option<DateTime<Utc>>,
    /// Cached copies may be at most this many seconds old.
    cdn_max_age: Option<u64>,
}

impl ConditionalNegotiator {
    pub fn new(cache_epoch: Option<DateTime<Utc>>, cdn_max_age: Option<u64>) -> Self {
        Self {
            cache_epoch,
            cdn_max_age,
        }
    }

    pub fn evaluate(
        &self,
        request: &ApiRequest,
        metadata: &ConditionalMetadata,
        now: DateTime<Utc>,
    ) -> ConditionalOutcome {
        if !request.method.is_safe_read() {
            return ConditionalOutcome::Modified;
        }

        if let Some(if_none_match) = request.header("If-None-Match") {
            if if_none_match.trim() == "*" {
                return ConditionalOutcome::NotModified;
            }
            // Without an etag there is nothing to compare; fall through to
            // If-Modified-Since.
            if let Some(etag) = &metadata.etag {
                return if etag_list_matches(if_none_match, etag) {
                    ConditionalOutcome::NotModified
                } else {
                    ConditionalOutcome::Modified
                };
            }
        }

        let Some(if_modified_since) = request.header("If-Modified-Since") else {
            return ConditionalOutcome::Modified;
        };
        let Some(since) = parse_http_date(if_modified_since) else {
            return ConditionalOutcome::Modified;
        };
        let Some(last_modified) = metadata.last_modified else {
            return ConditionalOutcome::Modified;
        };

        if self.effective_last_modified(last_modified, now).timestamp() <= since.timestamp() {
            ConditionalOutcome::NotModified
        } else {
            ConditionalOutcome::Modified
        }
    }

    /// Raise `last_modified` to the cache epoch and the CDN freshness floor.
    fn effective_last_modified(
        &self,
        last_modified: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let mut effective = last_modified;
        if let Some(epoch) = self.cache_epoch {
            effective = effective.max(epoch);
        }
        if let Some(max_age) = self.cdn_max_age {
            let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
            if let Some(floor) = Duration::try_seconds(max_age).and_then(|d| now.checked_sub_signed(d)) {
                effective = effective.max(floor);
            }
        }
        effective
    }
}

/// Quote a bare etag so every tag is in header form.
pub fn normalize_etag(tag: &str) -> String {
    let tag = tag.trim();
    let (weak, opaque) = match tag.strip_prefix("W/") {
        Some(rest) => ("W/", rest),
        None => ("", tag),
    };
    if opaque.len() >= 2 && opaque.starts_with('"') && opaque.ends_with('"') {
        format!("{weak}{opaque}")
    } else {
        format!("{weak}\"{opaque}\"")
    }
}

/// Weak comparison: the `W/` prefix is ignored on both sides.
pub fn weak_etag_eq(a: &str, b: &str) -> bool {
    let opaque = |t: &str| -> String {
        let t = t.trim();
        normalize_etag(t.strip_prefix("W/").unwrap_or(t))
    };
    opaque(a) == opaque(b)
}

fn etag_list_matches(header: &str, etag: &str) -> bool {
    ENTITY_TAG
        .find_iter(header)
        .any(|m| weak_etag_eq(m.as_str(), etag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apigate_kernel::gateway::{CallerIdentity, HttpMethod};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 1, 2, 3, 4, 5).unwrap()
    }

    fn get() -> ApiRequest {
        ApiRequest::new("r1", HttpMethod::Get, CallerIdentity::anonymous(["read"]))
    }

    fn meta(etag: Option<&str>, last_modified: Option<DateTime<Utc>>) -> ConditionalMetadata {
        ConditionalMetadata {
            etag: etag.map(normalize_etag),
            last_modified,
        }
    }

    fn lm() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 12, 31, 23, 0, 0).unwrap()
    }

    #[test]
    fn weak_and_strong_tags_compare_equal() {
        assert!(weak_etag_eq("W/\"x\"", "\"x\""));
        assert!(weak_etag_eq("\"x\"", "W/\"x\""));
        assert!(!weak_etag_eq("\"x\"", "\"y\""));
        assert_eq!(normalize_etag("abc"), "\"abc\"");
        assert_eq!(normalize_etag("W/abc"), "W/\"abc\"");
    }

    #[test]
    fn if_none_match_list() {
        let neg = ConditionalNegotiator::default();
        let req = get().with_header("If-None-Match", "\"a\", W/\"x\", \"b\"");
        assert_eq!(
            neg.evaluate(&req, &meta(Some("\"x\""), None), now()),
            ConditionalOutcome::NotModified
        );
        assert_eq!(
            neg.evaluate(&req, &meta(Some("\"z\""), None), now()),
            ConditionalOutcome::Modified
        );
    }

    #[test]
    fn star_matches_without_metadata() {
        let neg = ConditionalNegotiator::default();
        let req = get().with_header("If-None-Match", "*");
        assert_eq!(
            neg.evaluate(&req, &ConditionalMetadata::default(), now()),
            ConditionalOutcome::NotModified
        );
    }

    #[test]
    fn non_matching_etag_ignores_if_modified_since() {
        let neg = ConditionalNegotiator::default();
        let req = get()
            .with_header("If-None-Match", "\"y\"")
            .with_header("If-Modified-Since", format_http_date(lm()));
        assert_eq!(
            neg.evaluate(&req, &meta(Some("\"x\""), Some(lm())), now()),
            ConditionalOutcome::Modified
        );
    }

    #[test]
    fn if_none_match_without_etag_falls_through() {
        let neg = ConditionalNegotiator::default();
        let req = get()
            .with_header("If-None-Match", "\"y\"")
            .with_header("If-Modified-Since", format_http_date(lm()));
        assert_eq!(
            neg.evaluate(&req, &meta(None, Some(lm())), now()),
            ConditionalOutcome::NotModified
        );
    }

    #[test]
    fn if_modified_since_second_precision() {
        let neg = ConditionalNegotiator::default();
        let precise = lm() + Duration::milliseconds(900);
        let at = |t: DateTime<Utc>| get().with_header("If-Modified-Since", format_http_date(t));

        assert_eq!(
            neg.evaluate(&at(lm()), &meta(None, Some(precise)), now()),
            ConditionalOutcome::NotModified
        );
        assert_eq!(
            neg.evaluate(&at(lm() + Duration::seconds(1)), &meta(None, Some(lm())), now()),
            ConditionalOutcome::NotModified
        );
        assert_eq!(
            neg.evaluate(&at(lm() - Duration::seconds(1)), &meta(None, Some(lm())), now()),
            ConditionalOutcome::Modified
        );
    }

    #[test]
    fn invalid_date_is_ignored() {
        let neg = ConditionalNegotiator::default();
        let req = get().with_header("If-Modified-Since", "foo");
        assert_eq!(
            neg.evaluate(&req, &meta(None, Some(lm())), now()),
            ConditionalOutcome::Modified
        );
    }

    #[test]
    fn post_never_not_modified() {
        let neg = ConditionalNegotiator::default();
        let req = ApiRequest::new("r1", HttpMethod::Post, CallerIdentity::anonymous(["read"]))
            .with_header("If-None-Match", "*");
        assert_eq!(
            neg.evaluate(&req, &meta(Some("\"x\""), None), now()),
            ConditionalOutcome::Modified
        );
    }

    #[test]
    fn cache_epoch_raises_last_modified() {
        let epoch = lm() + Duration::hours(1);
        let neg = ConditionalNegotiator::new(Some(epoch), None);
        let req = get().with_header("If-Modified-Since", format_http_date(lm()));
        assert_eq!(
            neg.evaluate(&req, &meta(None, Some(lm())), now()),
            ConditionalOutcome::Modified
        );
    }

    #[test]
    fn cdn_max_age_raises_last_modified() {
        // now - 60s is later than lm(), so the floor wins
        let neg = ConditionalNegotiator::new(None, Some(60));
        let req = get().with_header("If-Modified-Since", format_http_date(lm()));
        assert_eq!(
            neg.evaluate(&req, &meta(None, Some(lm())), now()),
            ConditionalOutcome::Modified
        );

        let req = get().with_header("If-Modified-Since", format_http_date(now()));
        assert_eq!(
            neg.evaluate(&req, &meta(None, Some(lm())), now()),
            ConditionalOutcome::NotModified
        );
    }

    #[test]
    fn no_headers_is_modified() {
        let neg = ConditionalNegotiator::default();
        assert_eq!(
            neg.evaluate(&get(), &meta(Some("\"x\""), Some(lm())), now()),
            ConditionalOutcome::Modified
        );
    }
}
