//! Gateway error taxonomy.
//!
//! Three tiers, kept deliberately apart:
//!
//! - [`ApiFailure`] aborts the *current* request. It is always turned into a
//!   well-formed error document, never surfaced raw.
//! - [`ModuleError`] is what a handler returns; the gateway classifies it
//!   into an [`ApiFailure`].
//! - [`ModuleContractError`] means a handler was registered with an
//!   impossible declaration. It is a programming error, so it escapes the
//!   request pipeline entirely instead of being reported as an API error.

use super::message::{ApiMessage, MessageText};
use super::result::MessageLog;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Failure classification
// ─────────────────────────────────────────────────────────────────────────────

/// Classification of a recoverable request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FailureKind {
    /// Replication lag exceeded the client's `maxlag`.
    AdmissionRejected,
    UnknownAction,
    BadValue,
    MissingParam,
    BadToken,
    MustBePosted,
    WriteDisabled,
    WriteApiDenied,
    PromisedNonWriteApi,
    ReadApiDenied,
    AssertUserFailed,
    AssertAnonFailed,
    AssertBotFailed,
    AssertNamedUserFailed,
    /// `origin` parameter disagrees with the `Origin` header.
    OriginMismatch,
    /// An execute policy hook refused the request.
    PolicyDenied,
    /// A structured failure raised by the handler itself.
    Module,
}

impl FailureKind {
    /// Wire code used when the gateway raises this kind itself.
    ///
    /// Policy hooks and handlers supply their own codes; the values for
    /// those two kinds are only fallbacks.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AdmissionRejected => "maxlag",
            Self::UnknownAction | Self::BadValue => "badvalue",
            Self::MissingParam => "missingparam",
            Self::BadToken => "badtoken",
            Self::MustBePosted => "mustbeposted",
            Self::WriteDisabled => "noapiwrite",
            Self::WriteApiDenied => "writeapidenied",
            Self::PromisedNonWriteApi => "promised-nonwrite-api",
            Self::ReadApiDenied => "readapidenied",
            Self::AssertUserFailed => "assertuserfailed",
            Self::AssertAnonFailed => "assertanonfailed",
            Self::AssertBotFailed => "assertbotfailed",
            Self::AssertNamedUserFailed => "assertnameduserfailed",
            Self::OriginMismatch => "mismatchedorigin",
            Self::PolicyDenied => "hookaborted",
            Self::Module => "apierror",
        }
    }

    /// Snake-case label for logs.
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::AdmissionRejected => "admission_rejected",
            Self::UnknownAction => "unknown_action",
            Self::BadValue => "bad_value",
            Self::MissingParam => "missing_param",
            Self::BadToken => "bad_token",
            Self::MustBePosted => "must_be_posted",
            Self::WriteDisabled => "write_disabled",
            Self::WriteApiDenied => "write_api_denied",
            Self::PromisedNonWriteApi => "promised_non_write_api",
            Self::ReadApiDenied => "read_api_denied",
            Self::AssertUserFailed => "assert_user_failed",
            Self::AssertAnonFailed => "assert_anon_failed",
            Self::AssertBotFailed => "assert_bot_failed",
            Self::AssertNamedUserFailed => "assert_named_user_failed",
            Self::OriginMismatch => "origin_mismatch",
            Self::PolicyDenied => "policy_denied",
            Self::Module => "module",
        }
    }

    /// HTTP status for a response aborted with this kind.
    ///
    /// API errors are reported in the body with `200` unless the transport
    /// status carries real meaning for the client.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::AdmissionRejected => 503,
            Self::OriginMismatch => 403,
            _ => 200,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Structured usage failure
// ─────────────────────────────────────────────────────────────────────────────

/// A structured failure carrying its own messages.
///
/// Handlers raise this for bad input; the gateway raises it for its own
/// checks. All messages are surfaced verbatim, attributed to `module_path`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", summarize(.errors))]
pub struct UsageError {
    pub errors: Vec<ApiMessage>,
    pub warnings: Vec<ApiMessage>,
    pub module_path: Option<String>,
}

impl UsageError {
    pub fn new(error: ApiMessage) -> Self {
        Self {
            errors: vec![error],
            warnings: Vec::new(),
            module_path: None,
        }
    }

    /// Builder: add a further error.
    pub fn with_error(mut self, error: ApiMessage) -> Self {
        self.errors.push(error);
        self
    }

    /// Builder: add a warning that travels with the failure.
    pub fn with_warning(mut self, warning: ApiMessage) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn with_module_path(mut self, path: impl Into<String>) -> Self {
        self.module_path = Some(path.into());
        self
    }

    pub fn primary_code(&self) -> Option<&str> {
        self.errors.first().map(|e| e.code.as_str())
    }
}

fn summarize(errors: &[ApiMessage]) -> String {
    match errors.first() {
        Some(ApiMessage {
            code,
            text: MessageText::Raw(text),
            ..
        }) => format!("{code}: {text}"),
        Some(ApiMessage {
            code,
            text: MessageText::Key { key, .. },
            ..
        }) => format!("{code} ({key})"),
        None => "usage error".to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler-side error
// ─────────────────────────────────────────────────────────────────────────────

/// Error returned from [`ApiModule::execute`](super::module::ApiModule::execute).
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("{0}")]
    Usage(UsageError),

    /// Anything the handler did not anticipate. `kind` names the failure
    /// class and ends up in the `internal_api_error_<kind>` code.
    #[error("{kind}: {source}")]
    Internal {
        kind: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ModuleError {
    /// Shorthand for a single-message usage failure.
    pub fn usage(message: ApiMessage) -> Self {
        ModuleError::Usage(UsageError::new(message))
    }

    pub fn internal(kind: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ModuleError::Internal {
            kind: kind.into(),
            source: source.into(),
        }
    }
}

impl From<UsageError> for ModuleError {
    fn from(err: UsageError) -> Self {
        ModuleError::Usage(err)
    }
}

impl From<ResultError> for ModuleError {
    fn from(err: ResultError) -> Self {
        ModuleError::internal("ResultError", err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request-level failure
// ─────────────────────────────────────────────────────────────────────────────

/// The fault that aborted a request.
#[derive(Debug, Clone, Error)]
pub enum ApiFailure {
    #[error("{} failure: {error}", .kind.error_type())]
    Usage { kind: FailureKind, error: UsageError },

    #[error("internal failure ({kind}): {message}")]
    Internal {
        kind: String,
        message: String,
        /// Cause chain, outermost first, already free of request data.
        trace: Vec<String>,
    },
}

impl ApiFailure {
    /// A gateway-level usage failure with a single message.
    pub fn usage(kind: FailureKind, message: ApiMessage) -> Self {
        ApiFailure::Usage {
            kind,
            error: UsageError::new(message),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiFailure::Usage { kind, .. } => kind.status_code(),
            ApiFailure::Internal { .. } => 500,
        }
    }

    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            ApiFailure::Usage { kind, .. } => Some(*kind),
            ApiFailure::Internal { .. } => None,
        }
    }
}

/// An aborted request: the fault plus everything logged before it.
#[derive(Debug, Clone)]
pub struct GatewayFailure {
    pub log: MessageLog,
    pub fault: ApiFailure,
}

// ─────────────────────────────────────────────────────────────────────────────
// Programming errors
// ─────────────────────────────────────────────────────────────────────────────

/// A handler declared an impossible token/POST combination.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModuleContractError {
    #[error(
        "module '{0}' must be updated for the new token handling: \
         declare the token kind it needs instead of a bare flag"
    )]
    LegacyTokenDeclaration(String),

    #[error("module '{0}' must require POST to use tokens")]
    TokenWithoutPost(String),
}

/// Registry-time configuration error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("module name cannot be empty")]
    EmptyName,

    #[error("module '{0}' is already registered")]
    DuplicateModule(String),
}

/// Misuse of the result tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResultError {
    #[error("'{0}' is reserved for the gateway")]
    ReservedName(String),
}
