//! Module resolution, precondition checks and invocation.

pub mod registry;

pub use registry::{ModuleFactory, ModuleRegistry};

use apigate_kernel::gateway::{
    ApiFailure, ApiMessage, ApiModule, ApiRequest, CallerIdentity, ExecutePolicy, FailureKind,
    HttpMethod, MAIN_MODULE, MessageLog, ModuleContext, ModuleContractError, ModuleError,
    ParamReader, TokenRequirement,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{error, warn};

/// Right required by read-mode modules.
pub const READ_RIGHT: &str = "read";
/// Right required by write-mode modules.
pub const WRITE_API_RIGHT: &str = "writeapi";
/// Request header promising the client only calls read modules.
pub const PROMISE_NON_WRITE_HEADER: &str = "Promise-Non-Write-API-Action";

/// Resolves actions and enforces module preconditions.
pub struct Dispatcher {
    registry: ModuleRegistry,
    enable_write: bool,
    policies: Vec<Arc<dyn ExecutePolicy>>,
}

impl Dispatcher {
    pub fn new(registry: ModuleRegistry, enable_write: bool) -> Self {
        Self {
            registry,
            enable_write,
            policies: Vec::new(),
        }
    }

    /// Builder: run `policy` as the last permission check.
    pub fn with_policy(mut self, policy: Arc<dyn ExecutePolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Map the `action` parameter to a fresh module instance.
    pub fn resolve(&self, action: Option<&str>) -> Result<Box<dyn ApiModule>, ApiFailure> {
        let Some(action) = action else {
            return Err(ApiFailure::usage(
                FailureKind::MissingParam,
                ApiMessage::new(
                    FailureKind::MissingParam.code(),
                    "apierror-missingparam",
                    ["action"],
                ),
            ));
        };
        self.registry.resolve(action).ok_or_else(|| {
            ApiFailure::usage(
                FailureKind::UnknownAction,
                ApiMessage::new(
                    FailureKind::UnknownAction.code(),
                    "apierror-unrecognizedvalue",
                    ["action", action],
                ),
            )
        })
    }

    /// Check the token and method the module requires. A missing or bad
    /// token is reported before a wrong method.
    pub fn check_setup(
        &self,
        module: &dyn ApiModule,
        request: &ApiRequest,
        caller: &CallerIdentity,
        params: &mut ParamReader,
        log: &mut MessageLog,
    ) -> Result<(), ApiFailure> {
        if let TokenRequirement::Kind(kind) = module.needs_token() {
            let Some(token) = params.get(request, "token", log, MAIN_MODULE) else {
                return Err(ApiFailure::usage(
                    FailureKind::MissingParam,
                    ApiMessage::new(
                        FailureKind::MissingParam.code(),
                        "apierror-missingparam",
                        ["token"],
                    ),
                ));
            };
            if caller.token(&kind) != Some(token) {
                warn!(module = module.module_name(), token_kind = %kind, "invalid token");
                return Err(ApiFailure::usage(
                    FailureKind::BadToken,
                    ApiMessage::new(FailureKind::BadToken.code(), "apierror-badtoken", [kind]),
                ));
            }
        }

        if module.must_be_posted() && request.method != HttpMethod::Post {
            return Err(ApiFailure::usage(
                FailureKind::MustBePosted,
                ApiMessage::new(
                    FailureKind::MustBePosted.code(),
                    "apierror-mustbeposted",
                    [module.module_name()],
                ),
            ));
        }
        Ok(())
    }

    /// Permission checks, in order: read, write switch, write right,
    /// non-write promise, policy hooks.
    pub fn check_permissions(
        &self,
        module: &dyn ApiModule,
        caller: &CallerIdentity,
        request: &ApiRequest,
    ) -> Result<(), ApiFailure> {
        if module.is_read_mode() && !caller.has_right(READ_RIGHT) {
            return Err(denied(FailureKind::ReadApiDenied, "apierror-readapidenied"));
        }

        if module.is_write_mode() {
            if !self.enable_write {
                return Err(denied(FailureKind::WriteDisabled, "apierror-noapiwrite"));
            }
            if !caller.has_right(WRITE_API_RIGHT) {
                return Err(denied(FailureKind::WriteApiDenied, "apierror-writeapidenied"));
            }
            if request.has_header(PROMISE_NON_WRITE_HEADER) {
                return Err(denied(
                    FailureKind::PromisedNonWriteApi,
                    "apierror-promised-nonwrite-api",
                ));
            }
        }

        for policy in &self.policies {
            if let Err(message) = policy.check(module, caller, request) {
                warn!(
                    module = module.module_name(),
                    code = %message.code,
                    "execute policy refused request"
                );
                return Err(ApiFailure::usage(FailureKind::PolicyDenied, message));
            }
        }
        Ok(())
    }
}

/// Registration-time declarations that can never work.
pub fn check_contract(module: &dyn ApiModule) -> Result<(), ModuleContractError> {
    let name = module.module_name().to_string();
    match module.needs_token() {
        TokenRequirement::Legacy => Err(ModuleContractError::LegacyTokenDeclaration(name)),
        TokenRequirement::Kind(_) if !module.must_be_posted() => {
            Err(ModuleContractError::TokenWithoutPost(name))
        }
        _ => Ok(()),
    }
}

/// Run the module, classifying whatever it returns or panics with.
pub fn invoke(module: &dyn ApiModule, ctx: &mut ModuleContext<'_>) -> Result<(), ApiFailure> {
    let name = module.module_name().to_string();
    match catch_unwind(AssertUnwindSafe(|| module.execute(ctx))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(ModuleError::Usage(mut usage))) => {
            if usage.module_path.is_none() {
                usage.module_path = Some(name);
            }
            Err(ApiFailure::Usage {
                kind: FailureKind::Module,
                error: usage,
            })
        }
        Ok(Err(ModuleError::Internal { kind, source })) => {
            error!(module = %name, kind = %kind, error = %source, "module failed");
            Err(ApiFailure::Internal {
                kind,
                message: source.to_string(),
                trace: source.chain().map(ToString::to_string).collect(),
            })
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "module panicked".to_string());
            error!(module = %name, panic = %message, "module panicked");
            Err(ApiFailure::Internal {
                kind: "panic".to_string(),
                message: message.clone(),
                trace: vec![message],
            })
        }
    }
}

fn denied(kind: FailureKind, key: &str) -> ApiFailure {
    warn!(denial = kind.error_type(), "permission denied");
    ApiFailure::usage(kind, ApiMessage::new(kind.code(), key, None::<&str>))
}
