//! Same-origin trust and CORS.
//!
//! A request "lacks same-origin security" when a third-party page could
//! have caused it with the user's cookies attached: JSONP callbacks,
//! anonymous CORS (`origin=*`), an explicit `Treat-as-Untrusted` header, or
//! a registered [`OriginPolicy`] saying so. Such requests run as the
//! anonymous identity.

use apigate_kernel::gateway::{
    ApiFailure, ApiMessage, ApiRequest, FailureKind, OriginPolicy, ResponseHeaders,
};
use regex::Regex;
use std::sync::{Arc, LazyLock};

pub const UNTRUSTED_HEADER: &str = "Treat-as-Untrusted";

static CALLBACK_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[\[\]\.'"_A-Za-z0-9]+$"#).expect("callback name pattern is valid")
});

/// Whether `name` is safe to use as a JSONP callback.
pub fn is_valid_callback(name: &str) -> bool {
    CALLBACK_NAME.is_match(name)
}

/// CORS decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOutcome {
    /// No `origin` parameter, or an origin not on the allow list.
    None,
    /// `origin=*`: anonymous cross-origin access.
    Anonymous,
    /// A listed origin, allowed with credentials.
    Credentialed(String),
}

impl CorsOutcome {
    pub fn apply_headers(&self, headers: &mut ResponseHeaders) {
        match self {
            CorsOutcome::None => {}
            CorsOutcome::Anonymous => {
                headers.set("Access-Control-Allow-Origin", "*");
            }
            CorsOutcome::Credentialed(origin) => {
                headers.set("Access-Control-Allow-Origin", origin.clone());
                headers.set("Access-Control-Allow-Credentials", "true");
            }
        }
    }
}

/// Decides whether a request can be trusted as same-origin.
#[derive(Default)]
pub struct OriginTrustEvaluator {
    policies: Vec<Arc<dyn OriginPolicy>>,
    allowed_origins: Vec<String>,
}

impl OriginTrustEvaluator {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self {
            policies: Vec::new(),
            allowed_origins,
        }
    }

    /// Builder: consult `policy` after the built-in checks.
    pub fn with_policy(mut self, policy: Arc<dyn OriginPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn lacks_same_origin_security(&self, request: &ApiRequest) -> bool {
        request.scalar("callback").is_some()
            || request.scalar("origin") == Some("*")
            || request.has_header(UNTRUSTED_HEADER)
            || self
                .policies
                .iter()
                .any(|policy| !policy.has_same_origin_security(request))
    }

    /// Validate the `origin` parameter against the `Origin` header.
    pub fn cors(&self, origin_param: Option<&str>, request: &ApiRequest) -> Result<CorsOutcome, ApiFailure> {
        let Some(origin) = origin_param else {
            return Ok(CorsOutcome::None);
        };
        if origin == "*" {
            return Ok(CorsOutcome::Anonymous);
        }

        let header = request.header("Origin").unwrap_or_default();
        let matches = header.split_whitespace().any(|h| h == origin);
        if !matches {
            return Err(ApiFailure::usage(
                FailureKind::OriginMismatch,
                ApiMessage::new(
                    FailureKind::OriginMismatch.code(),
                    "apierror-mismatchedorigin",
                    [origin],
                ),
            ));
        }

        if self.allowed_origins.iter().any(|allowed| allowed == origin) {
            Ok(CorsOutcome::Credentialed(origin.to_string()))
        } else {
            Ok(CorsOutcome::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apigate_kernel::gateway::{CallerIdentity, HttpMethod};

    fn get() -> ApiRequest {
        ApiRequest::new("r1", HttpMethod::Get, CallerIdentity::anonymous(["read"]))
    }

    struct Distrust;

    impl OriginPolicy for Distrust {
        fn has_same_origin_security(&self, _request: &ApiRequest) -> bool {
            false
        }
    }

    #[test]
    fn plain_request_is_trusted() {
        assert!(!OriginTrustEvaluator::default().lacks_same_origin_security(&get()));
    }

    #[test]
    fn callback_makes_request_untrusted() {
        let req = get().with_param("callback", "foo");
        assert!(OriginTrustEvaluator::default().lacks_same_origin_security(&req));
    }

    #[test]
    fn untrusted_header_presence_alone_matters() {
        for value in ["", "false", "0"] {
            let req = get().with_header("treat-as-untrusted", value);
            assert!(OriginTrustEvaluator::default().lacks_same_origin_security(&req));
        }
    }

    #[test]
    fn anonymous_origin_is_untrusted() {
        let req = get().with_param("origin", "*");
        assert!(OriginTrustEvaluator::default().lacks_same_origin_security(&req));
    }

    #[test]
    fn policy_can_distrust() {
        let eval = OriginTrustEvaluator::default().with_policy(Arc::new(Distrust));
        assert!(eval.lacks_same_origin_security(&get()));
    }

    #[test]
    fn cors_anonymous_origin() {
        let eval = OriginTrustEvaluator::default();
        let outcome = eval.cors(Some("*"), &get()).unwrap();
        let mut headers = ResponseHeaders::new();
        outcome.apply_headers(&mut headers);
        assert_eq!(headers.get("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(headers.get("Access-Control-Allow-Credentials"), None);
    }

    #[test]
    fn cors_listed_origin_gets_credentials() {
        let eval = OriginTrustEvaluator::new(vec!["https://app.example.org".into()]);
        let req = get().with_header("Origin", "https://app.example.org");
        let outcome = eval.cors(Some("https://app.example.org"), &req).unwrap();
        assert_eq!(
            outcome,
            CorsOutcome::Credentialed("https://app.example.org".into())
        );
    }

    #[test]
    fn cors_unlisted_origin_gets_nothing() {
        let eval = OriginTrustEvaluator::default();
        let req = get().with_header("Origin", "https://other.example.org");
        assert_eq!(
            eval.cors(Some("https://other.example.org"), &req).unwrap(),
            CorsOutcome::None
        );
    }

    #[test]
    fn cors_mismatch_fails() {
        let eval = OriginTrustEvaluator::default();
        let req = get().with_header("Origin", "https://evil.example.org");
        let failure = eval.cors(Some("https://app.example.org"), &req).unwrap_err();
        assert_eq!(failure.kind(), Some(FailureKind::OriginMismatch));
        assert_eq!(failure.status_code(), 403);
    }

    #[test]
    fn callback_names() {
        assert!(is_valid_callback("jQuery123_456"));
        assert!(is_valid_callback("cb.fn[0]"));
        assert!(!is_valid_callback("alert(1)"));
        assert!(!is_valid_callback(""));
    }
}
