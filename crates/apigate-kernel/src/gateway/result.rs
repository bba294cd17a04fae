//! The result tree and its append-only message log.
//!
//! The gateway exclusively owns the [`ResultTree`]. Handlers never see it;
//! they write through a [`ModuleContext`](super::module::ModuleContext)
//! whose sections are merged in after the handler returns, while warnings
//! and errors go straight into the shared [`MessageLog`] so their order
//! always matches the order operations were attempted.

use super::error::ResultError;
use super::message::ApiMessage;
use serde_json::{Map, Value};

/// Module label attached to gateway-level warnings and errors.
pub const MAIN_MODULE: &str = "main";

/// Top-level names that only the gateway may write.
pub const RESERVED_NAMES: &[&str] = &[
    "warnings",
    "errors",
    "requestid",
    "curtimestamp",
    "uselang",
    "errorlang",
    "servedby",
    "docref",
    "trace",
];

/// A message plus the module that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntry {
    pub message: ApiMessage,
    /// `None` for failures that cannot be attributed (internal errors).
    pub module: Option<String>,
}

/// Append-only sequence of warnings and errors for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    warnings: Vec<MessageEntry>,
    errors: Vec<MessageEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, message: ApiMessage, module: Option<&str>) {
        self.warnings.push(MessageEntry {
            message,
            module: module.map(str::to_string),
        });
    }

    pub fn add_error(&mut self, message: ApiMessage, module: Option<&str>) {
        self.errors.push(MessageEntry {
            message,
            module: module.map(str::to_string),
        });
    }

    pub fn warnings(&self) -> &[MessageEntry] {
        &self.warnings
    }

    pub fn errors(&self) -> &[MessageEntry] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Ordered mapping of named sections plus the message log.
#[derive(Debug, Clone, Default)]
pub struct ResultTree {
    /// Fields the client explicitly asked for (`requestid`, …).
    fields: Map<String, Value>,
    /// Handler output.
    sections: Map<String, Value>,
    log: MessageLog,
    /// Abort-only fields (`docref`, `trace`, `servedby`).
    trailer: Map<String, Value>,
}

impl ResultTree {
    pub fn new(log: MessageLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Set a gateway-owned top-level field.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Add a handler section. Reserved names are refused.
    pub fn add_section(&mut self, name: impl Into<String>, value: Value) -> Result<(), ResultError> {
        let name = name.into();
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(ResultError::ReservedName(name));
        }
        self.sections.insert(name, value);
        Ok(())
    }

    /// Set a field that only appears on aborted requests.
    pub fn set_trailer(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.trailer.insert(name.into(), value.into());
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn sections(&self) -> &Map<String, Value> {
        &self.sections
    }

    pub fn trailer(&self) -> &Map<String, Value> {
        &self.trailer
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut MessageLog {
        &mut self.log
    }

    /// Drop handler output, keeping messages and requested fields.
    pub fn discard_sections(&mut self) {
        self.sections.clear();
    }

    /// Drop everything but the message log.
    pub fn into_log(self) -> MessageLog {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_preserves_append_order() {
        let mut log = MessageLog::new();
        log.add_warning(ApiMessage::raw("w1", "first"), Some(MAIN_MODULE));
        log.add_error(ApiMessage::raw("e1", "boom"), Some("query"));
        log.add_warning(ApiMessage::raw("w2", "second"), Some("query"));

        let codes: Vec<_> = log.warnings().iter().map(|e| e.message.code.as_str()).collect();
        assert_eq!(codes, vec!["w1", "w2"]);
        assert_eq!(log.errors()[0].module.as_deref(), Some("query"));
    }

    #[test]
    fn reserved_section_names_rejected() {
        let mut tree = ResultTree::default();
        let err = tree.add_section("errors", Value::Null).unwrap_err();
        assert!(matches!(err, ResultError::ReservedName(ref n) if n == "errors"));
        tree.add_section("query", serde_json::json!({"pages": []})).unwrap();
        assert!(tree.sections().contains_key("query"));
    }

    #[test]
    fn discard_keeps_messages() {
        let mut log = MessageLog::new();
        log.add_error(ApiMessage::raw("existing-error", "existing error"), Some(MAIN_MODULE));
        let mut tree = ResultTree::new(log);
        tree.add_section("query", Value::Bool(true)).unwrap();
        tree.set_field("requestid", "42");

        tree.discard_sections();

        assert!(tree.sections().is_empty());
        assert_eq!(tree.fields()["requestid"], "42");
        assert_eq!(tree.log().errors().len(), 1);
    }
}
