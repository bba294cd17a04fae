//! Parameter access with usage tracking.
//!
//! Every read goes through a [`ParamReader`] so the gateway can report
//! parameters nobody looked at. A read of a parameter that arrived in array
//! syntax records an `unsupportedarray` warning and yields `None`; because
//! the read also marks the key as used, such a key never shows up again in
//! the unrecognized-parameters warning.

use super::message::ApiMessage;
use super::result::MessageLog;
use super::types::{ApiRequest, ParamValue};
use std::collections::HashSet;

/// Tracks which request parameters have been read.
#[derive(Debug, Default, Clone)]
pub struct ParamReader {
    used: HashSet<String>,
    warned: HashSet<String>,
}

impl ParamReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a scalar parameter, marking it as used.
    ///
    /// `module` attributes the array-syntax warning, if one is raised.
    pub fn get<'r>(
        &mut self,
        request: &'r ApiRequest,
        name: &str,
        log: &mut MessageLog,
        module: &str,
    ) -> Option<&'r str> {
        self.used.insert(name.to_string());
        match request.param(name)? {
            ParamValue::Scalar(value) => Some(value.as_str()),
            ParamValue::MalformedArray => {
                if self.warned.insert(name.to_string()) {
                    log.add_warning(
                        ApiMessage::new("unsupportedarray", "apiwarn-unsupportedarray", [name]),
                        Some(module),
                    );
                }
                None
            }
        }
    }

    /// Presence check; a malformed array counts as absent.
    pub fn flag(
        &mut self,
        request: &ApiRequest,
        name: &str,
        log: &mut MessageLog,
        module: &str,
    ) -> bool {
        self.get(request, name, log, module).is_some()
    }

    /// Mark a parameter as used without reading it.
    pub fn mark_used(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Parameters present on the request that were never read, in arrival
    /// order.
    pub fn unused<'r>(&self, request: &'r ApiRequest) -> Vec<&'r str> {
        request
            .param_names()
            .filter(|name| !self.used.contains(*name))
            .collect()
    }
}
