//! Handler ("module") contract.
//!
//! A module is one action the API can perform. The gateway resolves an
//! action name to a fresh module instance, checks the preconditions the
//! module declares, and then calls [`ApiModule::execute`] with a
//! [`ModuleContext`]: an append-only writer over a private result document.

use super::error::{ModuleError, ResultError};
use super::message::ApiMessage;
use super::params::ParamReader;
use super::result::{MessageLog, RESERVED_NAMES};
use super::types::{ApiRequest, CacheMode, CallerIdentity};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Declarations
// ─────────────────────────────────────────────────────────────────────────────

/// Token a module requires before it may execute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TokenRequirement {
    #[default]
    None,
    /// A bare "needs a token" flag with no kind. Always a registration
    /// error: modules must name the kind they check.
    Legacy,
    /// A session token of the named kind, e.g. `csrf`.
    Kind(String),
}

impl TokenRequirement {
    pub fn kind(kind: impl Into<String>) -> Self {
        TokenRequirement::Kind(kind.into())
    }

    pub fn is_required(&self) -> bool {
        !matches!(self, TokenRequirement::None)
    }
}

/// Freshness metadata a module can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalKind {
    ETag,
    LastModified,
}

/// Freshness value supplied by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalValue {
    /// Entity tag in header form, e.g. `"abc"` or `W/"abc"`.
    ETag(String),
    LastModified(DateTime<Utc>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Module trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for an API action.
///
/// Only [`module_name`](ApiModule::module_name) and
/// [`execute`](ApiModule::execute) are mandatory; every other method has
/// the conservative default.
pub trait ApiModule: Send + Sync {
    /// Action name, also used as the module label on messages.
    fn module_name(&self) -> &str;

    fn needs_token(&self) -> TokenRequirement {
        TokenRequirement::None
    }

    /// Modules that need a token must be posted by default.
    fn must_be_posted(&self) -> bool {
        self.needs_token().is_required()
    }

    fn is_write_mode(&self) -> bool {
        false
    }

    /// Read-mode modules require the caller to hold `read`.
    fn is_read_mode(&self) -> bool {
        true
    }

    fn should_check_max_lag(&self) -> bool {
        true
    }

    /// Freshness metadata for conditional requests. `None` means the module
    /// has no conditional support for `kind`.
    fn conditional_request_data(
        &self,
        _kind: ConditionalKind,
        _request: &ApiRequest,
    ) -> Option<ConditionalValue> {
        None
    }

    fn execute(&self, ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Writer handle
// ─────────────────────────────────────────────────────────────────────────────

/// What a module produced, handed back to the gateway for merging.
#[derive(Debug, Default)]
pub struct ModuleOutput {
    pub sections: Map<String, Value>,
    pub cache_mode: Option<CacheMode>,
}

/// Restricted view a module executes against.
///
/// Sections go into a private document merged after a successful return.
/// Warnings and errors are appended to the request's shared log right away.
pub struct ModuleContext<'a> {
    module: &'a str,
    request: &'a ApiRequest,
    caller: &'a CallerIdentity,
    params: &'a mut ParamReader,
    log: &'a mut MessageLog,
    output: ModuleOutput,
}

impl<'a> ModuleContext<'a> {
    pub fn new(
        module: &'a str,
        request: &'a ApiRequest,
        caller: &'a CallerIdentity,
        params: &'a mut ParamReader,
        log: &'a mut MessageLog,
    ) -> Self {
        Self {
            module,
            request,
            caller,
            params,
            log,
            output: ModuleOutput::default(),
        }
    }

    pub fn module_name(&self) -> &str {
        self.module
    }

    /// The identity the module executes as. This may be the anonymous
    /// identity even when the request was authenticated.
    pub fn caller(&self) -> &CallerIdentity {
        self.caller
    }

    pub fn request(&self) -> &ApiRequest {
        self.request
    }

    /// Read a parameter, marking it as used.
    pub fn param(&mut self, name: &str) -> Option<&'a str> {
        self.params.get(self.request, name, self.log, self.module)
    }

    pub fn flag(&mut self, name: &str) -> bool {
        self.params.flag(self.request, name, self.log, self.module)
    }

    /// Add a top-level section. Names the gateway owns are refused.
    pub fn add_value(&mut self, name: impl Into<String>, value: Value) -> Result<(), ResultError> {
        let name = name.into();
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(ResultError::ReservedName(name));
        }
        self.output.sections.insert(name, value);
        Ok(())
    }

    pub fn add_warning(&mut self, message: ApiMessage) {
        self.log.add_warning(message, Some(self.module));
    }

    /// Record a non-fatal error; the request still completes.
    pub fn add_error(&mut self, message: ApiMessage) {
        self.log.add_error(message, Some(self.module));
    }

    pub fn set_cache_mode(&mut self, mode: CacheMode) {
        self.output.cache_mode = Some(mode);
    }

    pub fn into_output(self) -> ModuleOutput {
        self.output
    }
}
