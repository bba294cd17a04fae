//! Error format selection.

use serde::{Deserialize, Serialize};

/// How warnings and errors are rendered in the result document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFormat {
    /// Codes only, no text.
    None,
    /// Backward-compatible shape: fixed language, no site-local messages.
    Bc,
    Plaintext,
    Wikitext,
    Html,
    /// Catalog key and parameters instead of rendered text.
    Raw,
}

impl ErrorFormat {
    /// Parse the `errorformat` parameter. Unrecognized values yield `None`
    /// so the caller can fall back to [`ErrorFormat::Bc`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ErrorFormat::None),
            "bc" => Some(ErrorFormat::Bc),
            "plaintext" => Some(ErrorFormat::Plaintext),
            "wikitext" => Some(ErrorFormat::Wikitext),
            "html" => Some(ErrorFormat::Html),
            "raw" => Some(ErrorFormat::Raw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorFormat::None => "none",
            ErrorFormat::Bc => "bc",
            ErrorFormat::Plaintext => "plaintext",
            ErrorFormat::Wikitext => "wikitext",
            ErrorFormat::Html => "html",
            ErrorFormat::Raw => "raw",
        }
    }
}

/// Negotiated once per request and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFormatSpec {
    pub format: ErrorFormat,
    /// Language messages are rendered in.
    pub language: String,
    /// Consult site-local message overrides first.
    pub use_database: bool,
}

impl ErrorFormatSpec {
    /// The backward-compatible spec: `en`, shipped messages only.
    ///
    /// Only the language and the message source are fixed. Entries keep the
    /// `{code, text, module?, data?}` shape of `plaintext`; there is no
    /// separate legacy `{code, info}` error object.
    pub fn bc() -> Self {
        Self {
            format: ErrorFormat::Bc,
            language: "en".to_string(),
            use_database: false,
        }
    }
}
