//! Error format negotiation and message rendering.

use apigate_kernel::config::GatewaySettings;
use apigate_kernel::gateway::{
    ApiMessage, ApiRequest, ErrorFormat, ErrorFormatSpec, MAIN_MODULE, MessageEntry,
    MessageLocalizer, MessageLog, MessageText, ParamReader, substitute_params,
};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};

/// Language used whenever a requested one cannot be honoured.
pub const DEFAULT_LANGUAGE: &str = "en";

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));
static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[(?:[^|\]]*\|)?([^\]]*)\]\]").expect("link pattern is valid")
});
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'{2,}").expect("emphasis pattern is valid"));

// ─────────────────────────────────────────────────────────────────────────────
// Negotiation
// ─────────────────────────────────────────────────────────────────────────────

/// Languages and error format chosen for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Language of the response as a whole (`uselang`).
    pub response_language: String,
    pub error: ErrorFormatSpec,
}

/// Derive the response language and error format from the request.
///
/// `uselang` defaults to the caller's language, then the content language;
/// `content` means the content language. Any format other than an explicit
/// non-`bc` one selects the backward-compatible spec, which ignores
/// `errorlang` and `errorsuselocal`.
pub fn negotiate(
    request: &ApiRequest,
    params: &mut ParamReader,
    log: &mut MessageLog,
    settings: &GatewaySettings,
    localizer: &dyn MessageLocalizer,
) -> Negotiated {
    let content = settings.content_language.as_str();

    let response_language = match params.get(request, "uselang", log, MAIN_MODULE) {
        None | Some("user") => request.caller.language().unwrap_or(content).to_lowercase(),
        Some("content") => content.to_string(),
        Some(code) => sanitize_language(code, content, localizer),
    };

    let format = params
        .get(request, "errorformat", log, MAIN_MODULE)
        .and_then(ErrorFormat::parse)
        .unwrap_or(ErrorFormat::Bc);
    let error_lang = params.get(request, "errorlang", log, MAIN_MODULE);
    let uses_local = params.flag(request, "errorsuselocal", log, MAIN_MODULE);

    if format == ErrorFormat::Bc {
        return Negotiated {
            response_language,
            error: ErrorFormatSpec::bc(),
        };
    }

    let language = match error_lang {
        None | Some("uselang") => response_language.clone(),
        Some("content") => content.to_string(),
        Some(code) => sanitize_language(code, content, localizer),
    };

    Negotiated {
        response_language,
        error: ErrorFormatSpec {
            format,
            language,
            use_database: uses_local,
        },
    }
}

/// Lower-case `code`; fall back to the content language when invalid.
fn sanitize_language(code: &str, content: &str, localizer: &dyn MessageLocalizer) -> String {
    let code = code.trim().to_lowercase();
    if localizer.is_valid_language(&code) {
        code
    } else {
        content.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Renders messages according to a negotiated [`ErrorFormatSpec`].
#[derive(Clone)]
pub struct ErrorFormatter {
    spec: ErrorFormatSpec,
    localizer: Arc<dyn MessageLocalizer>,
}

impl ErrorFormatter {
    pub fn new(spec: ErrorFormatSpec, localizer: Arc<dyn MessageLocalizer>) -> Self {
        Self { spec, localizer }
    }

    pub fn spec(&self) -> &ErrorFormatSpec {
        &self.spec
    }

    /// Resolve a message to text in the negotiated language.
    ///
    /// Missing keys fall back to the default language, then to `⧼key⧽`.
    pub fn text(&self, message: &ApiMessage) -> String {
        match &message.text {
            MessageText::Raw(text) => text.clone(),
            MessageText::Key { key, params } => {
                let template = self
                    .localizer
                    .lookup(key, &self.spec.language, self.spec.use_database)
                    .or_else(|| self.localizer.lookup(key, DEFAULT_LANGUAGE, false))
                    .unwrap_or_else(|| format!("⧼{key}⧽"));
                substitute_params(&template, params)
            }
        }
    }

    /// Text transformed for the output format.
    pub fn render(&self, message: &ApiMessage) -> String {
        let text = self.text(message);
        match self.spec.format {
            ErrorFormat::Plaintext | ErrorFormat::Bc => strip_markup(&text),
            ErrorFormat::Html => escape_html(&text),
            ErrorFormat::Wikitext | ErrorFormat::None | ErrorFormat::Raw => text,
        }
    }

    /// One `warnings`/`errors` entry.
    pub fn format_entry(&self, entry: &MessageEntry) -> Value {
        let message = &entry.message;
        let mut out = Map::new();
        out.insert("code".into(), Value::String(message.code.clone()));

        match self.spec.format {
            ErrorFormat::None => {}
            ErrorFormat::Raw => {
                let (key, params) = match &message.text {
                    MessageText::Key { key, params } => (key.clone(), params.clone()),
                    MessageText::Raw(text) => ("rawmessage".to_string(), vec![text.clone()]),
                };
                out.insert("key".into(), Value::String(key));
                out.insert("params".into(), json!(params));
            }
            _ => {
                out.insert("text".into(), Value::String(self.render(message)));
            }
        }

        if let Some(module) = &entry.module {
            out.insert("module".into(), Value::String(module.clone()));
        }
        if let Some(data) = &message.data {
            out.insert("data".into(), Value::Object(data.clone()));
        }
        Value::Object(out)
    }
}

fn strip_markup(text: &str) -> String {
    let text = TAG.replace_all(text, "");
    let text = LINK.replace_all(&text, "$1");
    EMPHASIS.replace_all(&text, "").into_owned()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use apigate_kernel::gateway::{CallerIdentity, HttpMethod};

    fn negotiate_params(pairs: &[(&str, &str)]) -> Negotiated {
        let mut req = ApiRequest::new("r1", HttpMethod::Get, CallerIdentity::anonymous(["read"]));
        for (k, v) in pairs {
            req = req.with_param(*k, *v);
        }
        let catalog = StaticCatalog::new();
        negotiate(
            &req,
            &mut ParamReader::new(),
            &mut MessageLog::new(),
            &GatewaySettings::default(),
            &catalog,
        )
    }

    fn spec(format: ErrorFormat, language: &str, use_database: bool) -> ErrorFormatSpec {
        ErrorFormatSpec {
            format,
            language: language.to_string(),
            use_database,
        }
    }

    #[test]
    fn default_is_bc() {
        let n = negotiate_params(&[]);
        assert_eq!(n.error, ErrorFormatSpec::bc());
        assert_eq!(n.response_language, "en");
    }

    #[test]
    fn bc_ignores_requested_languages() {
        let n = negotiate_params(&[
            ("uselang", "fr"),
            ("errorlang", "de"),
            ("errorsuselocal", ""),
        ]);
        assert_eq!(n.error, ErrorFormatSpec::bc());
        assert_eq!(n.response_language, "fr");
    }

    #[test]
    fn unrecognized_format_is_bc() {
        let n = negotiate_params(&[("errorformat", "bogus"), ("uselang", "fr")]);
        assert_eq!(n.error, ErrorFormatSpec::bc());
    }

    #[test]
    fn error_language_follows_uselang() {
        let n = negotiate_params(&[("errorformat", "wikitext"), ("uselang", "fr")]);
        assert_eq!(n.error, spec(ErrorFormat::Wikitext, "fr", false));

        let n = negotiate_params(&[
            ("errorformat", "plaintext"),
            ("uselang", "fr"),
            ("errorlang", "uselang"),
        ]);
        assert_eq!(n.error, spec(ErrorFormat::Plaintext, "fr", false));
    }

    #[test]
    fn content_maps_to_content_language() {
        let n = negotiate_params(&[("errorformat", "html"), ("uselang", "content")]);
        assert_eq!(n.response_language, "en");
        assert_eq!(n.error.language, "en");

        let n = negotiate_params(&[
            ("errorformat", "html"),
            ("uselang", "fr"),
            ("errorlang", "content"),
        ]);
        assert_eq!(n.error.language, "en");
    }

    #[test]
    fn explicit_errorlang_with_local_messages() {
        let n = negotiate_params(&[
            ("errorformat", "raw"),
            ("errorlang", "de"),
            ("errorsuselocal", ""),
        ]);
        assert_eq!(n.error, spec(ErrorFormat::Raw, "de", true));
    }

    #[test]
    fn bogus_language_falls_back() {
        let n = negotiate_params(&[("errorformat", "none"), ("uselang", "not a language")]);
        assert_eq!(n.response_language, "en");
        assert_eq!(n.error.language, "en");
    }

    #[test]
    fn language_codes_lowercased() {
        let n = negotiate_params(&[("uselang", "FR")]);
        assert_eq!(n.response_language, "fr");
    }

    fn formatter(format: ErrorFormat, language: &str) -> ErrorFormatter {
        ErrorFormatter::new(spec(format, language, false), Arc::new(StaticCatalog::new()))
    }

    fn entry(message: ApiMessage) -> MessageEntry {
        MessageEntry {
            message,
            module: Some("main".into()),
        }
    }

    #[test]
    fn entry_shapes() {
        let msg = ApiMessage::new("missingparam", "apierror-missingparam", ["action"])
            .with_data("extra", 1);

        let none = formatter(ErrorFormat::None, "en").format_entry(&entry(msg.clone()));
        assert_eq!(none, json!({"code": "missingparam", "module": "main", "data": {"extra": 1}}));

        let raw = formatter(ErrorFormat::Raw, "en").format_entry(&entry(msg.clone()));
        assert_eq!(raw["key"], "apierror-missingparam");
        assert_eq!(raw["params"], json!(["action"]));
        assert!(raw.get("text").is_none());

        let text = formatter(ErrorFormat::Plaintext, "en").format_entry(&entry(msg));
        assert_eq!(text["text"], "The \"action\" parameter must be set.");
    }

    #[test]
    fn raw_text_under_raw_format() {
        let out = formatter(ErrorFormat::Raw, "en")
            .format_entry(&entry(ApiMessage::raw("existing-error", "existing error")));
        assert_eq!(out["key"], "rawmessage");
        assert_eq!(out["params"], json!(["existing error"]));
    }

    #[test]
    fn markup_handling_per_format() {
        let msg = ApiMessage::raw("x", "See [[Special:ApiHelp|the help]] for '''more''' <b>info</b>");
        assert_eq!(
            formatter(ErrorFormat::Plaintext, "en").render(&msg),
            "See the help for more info"
        );
        assert_eq!(
            formatter(ErrorFormat::Html, "en").render(&msg),
            "See [[Special:ApiHelp|the help]] for '''more''' &lt;b&gt;info&lt;/b&gt;"
        );
        assert_eq!(
            formatter(ErrorFormat::Wikitext, "en").render(&msg),
            "See [[Special:ApiHelp|the help]] for '''more''' <b>info</b>"
        );
    }

    #[test]
    fn localized_text_with_fallback() {
        let msg = ApiMessage::new("badtoken", "apierror-badtoken", ["csrf"]);
        assert_eq!(
            formatter(ErrorFormat::Plaintext, "fr").text(&msg),
            "Jeton CSRF non valide."
        );
        assert_eq!(
            formatter(ErrorFormat::Plaintext, "de").text(&msg),
            "Invalid CSRF token."
        );
        let unknown = ApiMessage::new("x", "no-such-key", None::<&str>);
        assert_eq!(formatter(ErrorFormat::Plaintext, "en").text(&unknown), "⧼no-such-key⧽");
    }
}
