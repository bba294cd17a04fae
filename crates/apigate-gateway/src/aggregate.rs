//! Result document assembly and abort handling.

use crate::errorformat::ErrorFormatter;
use apigate_kernel::config::GatewaySettings;
use apigate_kernel::gateway::{
    ApiFailure, ApiMessage, MAIN_MODULE, MessageLog, ResultTree, UsageError,
};
use serde_json::{Map, Value};

/// Stand-in for codes that contain control characters.
pub const INVALID_CODE: &str = "<invalid-code>";

/// Builds the final document from a [`ResultTree`].
pub struct ResultAggregator<'a> {
    formatter: &'a ErrorFormatter,
    settings: &'a GatewaySettings,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(formatter: &'a ErrorFormatter, settings: &'a GatewaySettings) -> Self {
        Self {
            formatter,
            settings,
        }
    }

    /// Turn an aborted request's tree into an error document.
    ///
    /// Handler sections are dropped; warnings and errors logged before the
    /// abort stay in place and the failure's own messages are appended.
    /// Returns every error code now in the log.
    pub fn substitute_with_error(
        &self,
        tree: &mut ResultTree,
        fault: &ApiFailure,
        request_id: &str,
    ) -> Vec<String> {
        tree.discard_sections();

        match fault {
            ApiFailure::Usage { error, .. } => {
                append_usage(tree.log_mut(), error);
                let docref = ApiMessage::new("docref", "api-usage-docref", [&self.settings.doc_url]);
                tree.set_trailer("docref", self.formatter.render(&docref));
            }
            ApiFailure::Internal {
                kind,
                message,
                trace,
            } => {
                let text = if self.settings.show_exception_details {
                    ApiMessage::new(
                        format!("internal_api_error_{kind}"),
                        "apierror-internal-detailed",
                        [request_id, message.as_str()],
                    )
                } else {
                    ApiMessage::new(
                        format!("internal_api_error_{kind}"),
                        "apierror-internal-generic",
                        [request_id, kind.as_str()],
                    )
                };
                tree.log_mut()
                    .add_error(text.with_data("errorclass", kind.as_str()), None);
                tree.set_trailer("trace", self.redacted_trace(kind, trace));
            }
        }

        if self.settings.show_hostnames {
            tree.set_trailer("servedby", self.settings.served_by.as_str());
        }

        error_codes(tree.log())
    }

    /// `<kind>` alone, plus the cause chain when exception details are shown.
    fn redacted_trace(&self, kind: &str, trace: &[String]) -> String {
        let mut lines = vec![format!("[{kind}]")];
        if self.settings.show_exception_details {
            lines.extend(trace.iter().map(|cause| format!("Caused by: {cause}")));
        }
        lines.join("\n")
    }

    /// Serialize the tree: fields, sections, `warnings`, `errors`, trailer.
    pub fn render(&self, tree: &ResultTree) -> Value {
        let mut doc = Map::new();
        for (name, value) in tree.fields().iter().chain(tree.sections()) {
            doc.insert(name.clone(), value.clone());
        }

        let log = tree.log();
        doc.insert(
            "warnings".into(),
            Value::Array(log.warnings().iter().map(|e| self.formatter.format_entry(e)).collect()),
        );
        doc.insert(
            "errors".into(),
            Value::Array(log.errors().iter().map(|e| self.formatter.format_entry(e)).collect()),
        );

        for (name, value) in tree.trailer() {
            doc.insert(name.clone(), value.clone());
        }
        Value::Object(doc)
    }
}

fn append_usage(log: &mut MessageLog, error: &UsageError) {
    let module = error.module_path.as_deref().unwrap_or(MAIN_MODULE);
    for warning in &error.warnings {
        log.add_warning(warning.clone(), Some(module));
    }
    for err in &error.errors {
        log.add_error(err.clone(), Some(module));
    }
}

/// Codes of every logged error, with invalid codes replaced.
pub fn error_codes(log: &MessageLog) -> Vec<String> {
    log.errors()
        .iter()
        .map(|entry| {
            if entry.message.has_valid_code() {
                entry.message.code.clone()
            } else {
                INVALID_CODE.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use apigate_kernel::gateway::{ErrorFormat, ErrorFormatSpec, FailureKind};
    use serde_json::json;
    use std::sync::Arc;

    fn formatter() -> ErrorFormatter {
        ErrorFormatter::new(
            ErrorFormatSpec {
                format: ErrorFormat::Plaintext,
                language: "en".into(),
                use_database: false,
            },
            Arc::new(StaticCatalog::new()),
        )
    }

    fn settings(show_hostnames: bool, show_exception_details: bool) -> GatewaySettings {
        GatewaySettings {
            show_hostnames,
            show_exception_details,
            served_by: "mw1".into(),
            doc_url: "https://example.org/api".into(),
            ..Default::default()
        }
    }

    fn existing_tree() -> ResultTree {
        let mut log = MessageLog::new();
        log.add_warning(ApiMessage::raw("existing-warning", "existing warning"), Some(MAIN_MODULE));
        log.add_error(ApiMessage::raw("existing-error", "existing error"), Some(MAIN_MODULE));
        let mut tree = ResultTree::new(log);
        tree.add_section("query", json!({"pages": []})).unwrap();
        tree
    }

    #[test]
    fn usage_failure_keeps_existing_messages() {
        let f = formatter();
        let s = settings(true, false);
        let agg = ResultAggregator::new(&f, &s);
        let mut tree = existing_tree();

        let fault = ApiFailure::Usage {
            kind: FailureKind::Module,
            error: UsageError::new(ApiMessage::raw("sv-error1", "An error"))
                .with_error(ApiMessage::raw("bad\nvalue", "Another error"))
                .with_warning(ApiMessage::raw("sv-warning1", "A warning"))
                .with_module_path("foo+bar"),
        };
        let codes = agg.substitute_with_error(&mut tree, &fault, "reqid");

        assert_eq!(codes, vec!["existing-error", "sv-error1", INVALID_CODE]);
        let doc = agg.render(&tree);
        assert_eq!(
            doc,
            json!({
                "warnings": [
                    {"code": "existing-warning", "text": "existing warning", "module": "main"},
                    {"code": "sv-warning1", "text": "A warning", "module": "foo+bar"},
                ],
                "errors": [
                    {"code": "existing-error", "text": "existing error", "module": "main"},
                    {"code": "sv-error1", "text": "An error", "module": "foo+bar"},
                    {"code": "bad\nvalue", "text": "Another error", "module": "foo+bar"},
                ],
                "docref": "See https://example.org/api for API usage.",
                "servedby": "mw1",
            })
        );
    }

    #[test]
    fn internal_failure_with_details() {
        let f = formatter();
        let s = settings(true, true);
        let agg = ResultAggregator::new(&f, &s);
        let mut tree = existing_tree();

        let fault = ApiFailure::Internal {
            kind: "InvalidArgumentException".into(),
            message: "Random exception".into(),
            trace: vec!["Random exception".into()],
        };
        let codes = agg.substitute_with_error(&mut tree, &fault, "reqid");

        assert_eq!(
            codes,
            vec!["existing-error", "internal_api_error_InvalidArgumentException"]
        );
        let doc = agg.render(&tree);
        assert_eq!(
            doc["errors"][1],
            json!({
                "code": "internal_api_error_InvalidArgumentException",
                "text": "[reqid] Exception caught: Random exception",
                "data": {"errorclass": "InvalidArgumentException"},
            })
        );
        assert_eq!(
            doc["trace"],
            "[InvalidArgumentException]\nCaused by: Random exception"
        );
        assert_eq!(doc["servedby"], "mw1");
        assert!(doc.get("docref").is_none());
        assert!(doc.get("query").is_none());
    }

    #[test]
    fn internal_failure_redacted() {
        let f = formatter();
        let s = settings(false, false);
        let agg = ResultAggregator::new(&f, &s);
        let mut tree = ResultTree::default();

        let fault = ApiFailure::Internal {
            kind: "panic".into(),
            message: "secret path /srv/x".into(),
            trace: vec!["secret path /srv/x".into()],
        };
        agg.substitute_with_error(&mut tree, &fault, "abc");
        let doc = agg.render(&tree);

        assert_eq!(doc["errors"][0]["text"], "[abc] Caught exception of type panic");
        assert_eq!(doc["trace"], "[panic]");
        assert!(doc.get("servedby").is_none());
    }

    #[test]
    fn render_orders_top_level_fields() {
        let f = formatter();
        let s = settings(false, false);
        let agg = ResultAggregator::new(&f, &s);
        let mut tree = ResultTree::default();
        tree.add_section("ping", json!({"pong": true})).unwrap();
        tree.set_field("requestid", "42");

        let doc = agg.render(&tree);
        let keys: Vec<_> = doc.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["requestid", "ping", "warnings", "errors"]);
    }
}
