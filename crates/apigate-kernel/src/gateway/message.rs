//! Warning and error messages, and the localization contract.
//!
//! The gateway never renders text itself at the point a problem is
//! detected. It records an [`ApiMessage`] (a machine-readable code plus a
//! catalog key and parameters, or raw text) and leaves rendering to the
//! error formatter, which resolves keys through a [`MessageLocalizer`] in the
//! negotiated language.

use serde_json::{Map, Value};

/// Human-readable part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageText {
    /// Catalog key with positional parameters (`$1`, `$2`, …).
    Key { key: String, params: Vec<String> },
    /// Pre-rendered text that bypasses the catalog.
    Raw(String),
}

/// A single warning or error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiMessage {
    /// Machine-readable code, e.g. `maxlag` or `badtoken`.
    pub code: String,
    pub text: MessageText,
    /// Optional structured payload surfaced to the client verbatim.
    pub data: Option<Map<String, Value>>,
}

impl ApiMessage {
    /// A catalog-backed message.
    pub fn new(
        code: impl Into<String>,
        key: impl Into<String>,
        params: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            code: code.into(),
            text: MessageText::Key {
                key: key.into(),
                params: params.into_iter().map(Into::into).collect(),
            },
            data: None,
        }
    }

    /// A message with literal text.
    pub fn raw(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            text: MessageText::Raw(text.into()),
            data: None,
        }
    }

    /// Builder: attach one structured data field.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Codes must not carry control characters. Invalid codes are still
    /// reported as-is; callers only use this to flag them.
    pub fn has_valid_code(&self) -> bool {
        !self.code.is_empty() && !self.code.chars().any(char::is_control)
    }
}

/// Kernel contract for message-catalog lookup.
///
/// Returns the template for `key` in `language`, or `None` if the catalog
/// has no entry. `use_database` asks for site-local overrides to be
/// consulted before the shipped messages.
pub trait MessageLocalizer: Send + Sync {
    fn lookup(&self, key: &str, language: &str, use_database: bool) -> Option<String>;

    /// Whether `language` is a code the catalog accepts.
    fn is_valid_language(&self, language: &str) -> bool;
}

/// Replace `$1`…`$n` in `template` with the positional `params`.
///
/// Placeholders without a matching parameter are left untouched.
pub fn substitute_params(template: &str, params: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(&(_, d)) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else {
                break;
            }
        }
        let param = digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| params.get(i));
        match param {
            Some(p) => out.push_str(p),
            None => {
                out.push('$');
                out.push_str(&digits);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_positional_params() {
        let params = vec!["db1".to_string(), "4".to_string()];
        assert_eq!(
            substitute_params("Waiting for $1: $2 seconds lagged.", &params),
            "Waiting for db1: 4 seconds lagged."
        );
    }

    #[test]
    fn missing_params_left_in_place() {
        assert_eq!(substitute_params("costs $5 or $", &[]), "costs $5 or $");
    }

    #[test]
    fn control_characters_make_code_invalid() {
        assert!(ApiMessage::raw("badtoken", "x").has_valid_code());
        assert!(!ApiMessage::raw("bad\nvalue", "x").has_valid_code());
    }

    #[test]
    fn data_fields_accumulate() {
        let msg = ApiMessage::raw("maxlag", "lagged")
            .with_data("lag", 4)
            .with_data("type", "db");
        let data = msg.data.unwrap();
        assert_eq!(data["lag"], 4);
        assert_eq!(data["type"], "db");
    }
}
