//! The request orchestrator.
//!
//! [`Gateway::execute`] runs one request through a fixed sequence of
//! stages:
//!
//! ```text
//! negotiate ─► origin trust ─► reserved params ─► resolve ─► setup
//!     ─► permissions ─► maxlag ─► assertions ─► conditional ─► execute
//!     ─► merge + unused params ─► requested fields ─► cache headers
//! ```
//!
//! Any stage may abort with an [`ApiFailure`]; the messages logged up to
//! that point are kept and the failure is appended to them. A module with an
//! impossible token declaration is not a request failure at all and is
//! returned as `Err`.

use crate::admission::AdmissionController;
use crate::aggregate::ResultAggregator;
use crate::assertion::check_assertions;
use crate::catalog::StaticCatalog;
use crate::conditional::{
    CacheHeaders, ConditionalMetadata, ConditionalNegotiator, ConditionalOutcome,
};
use crate::dispatch::{self, Dispatcher, ModuleRegistry, READ_RIGHT};
use crate::errorformat::{ErrorFormatter, Negotiated, negotiate};
use crate::origin::{OriginTrustEvaluator, is_valid_callback};
use crate::probe::StaticLagProbe;
use apigate_kernel::config::GatewaySettings;
use apigate_kernel::gateway::{
    ApiFailure, ApiMessage, ApiModule, ApiRequest, ApiResponse, CallerIdentity, Clock,
    ExecutePolicy, FailureKind, GatewayFailure, LagProbe, MAIN_MODULE, MessageLocalizer,
    MessageLog, ModuleContext, ModuleContractError, OriginPolicy, ParamReader, RegistryError,
    ResponseHeaders, ResultTree, SystemClock,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, field, info, info_span};

/// Set on responses whose authenticated caller was demoted to anonymous.
pub const LOGIN_SUPPRESSED_HEADER: &str = "X-Login-Suppressed";
/// First error code of an aborted request.
pub const API_ERROR_HEADER: &str = "X-Api-Error";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Assembles a [`Gateway`] from settings and optional collaborators.
///
/// Anything not supplied falls back to the in-process implementation:
/// [`StaticLagProbe`] from `[replication]`, [`StaticCatalog`] and the wall
/// clock.
pub struct GatewayBuilder {
    settings: GatewaySettings,
    registry: ModuleRegistry,
    probe: Option<Arc<dyn LagProbe>>,
    clock: Arc<dyn Clock>,
    localizer: Arc<dyn MessageLocalizer>,
    origin_policies: Vec<Arc<dyn OriginPolicy>>,
    execute_policies: Vec<Arc<dyn ExecutePolicy>>,
}

impl GatewayBuilder {
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            settings,
            registry: ModuleRegistry::new(),
            probe: None,
            clock: Arc::new(SystemClock),
            localizer: Arc::new(StaticCatalog::new()),
            origin_policies: Vec::new(),
            execute_policies: Vec::new(),
        }
    }

    /// Replace the module registry wholesale.
    pub fn with_registry(mut self, registry: ModuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register one module.
    pub fn with_module<F>(mut self, name: impl Into<String>, factory: F) -> Result<Self, RegistryError>
    where
        F: Fn() -> Box<dyn ApiModule> + Send + Sync + 'static,
    {
        self.registry.register(name, factory)?;
        Ok(self)
    }

    pub fn with_probe(mut self, probe: Arc<dyn LagProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn MessageLocalizer>) -> Self {
        self.localizer = localizer;
        self
    }

    pub fn with_origin_policy(mut self, policy: Arc<dyn OriginPolicy>) -> Self {
        self.origin_policies.push(policy);
        self
    }

    pub fn with_execute_policy(mut self, policy: Arc<dyn ExecutePolicy>) -> Self {
        self.execute_policies.push(policy);
        self
    }

    pub fn build(self) -> Gateway {
        let probe: Arc<dyn LagProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(StaticLagProbe::from_settings(&self.settings.replication)),
        };

        let dispatcher = self
            .execute_policies
            .into_iter()
            .fold(Dispatcher::new(self.registry, self.settings.enable_write), |d, p| {
                d.with_policy(p)
            });
        let origin = self
            .origin_policies
            .into_iter()
            .fold(
                OriginTrustEvaluator::new(self.settings.cors_allowed_origins.clone()),
                |o, p| o.with_policy(p),
            );

        Gateway {
            admission: AdmissionController::new(probe, self.settings.show_hostnames),
            conditional: ConditionalNegotiator::new(
                self.settings.cache_epoch,
                self.settings.cdn_max_age,
            ),
            dispatcher,
            origin,
            localizer: self.localizer,
            clock: self.clock,
            settings: self.settings,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-request state
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level fields the client asked for.
#[derive(Debug, Default)]
struct RequestedFields {
    request_id: Option<String>,
    cur_timestamp: bool,
    lang_info: bool,
    served_by: bool,
}

/// Everything the stages accumulate for one request.
struct Exchange {
    caller: CallerIdentity,
    params: ParamReader,
    tree: ResultTree,
    headers: ResponseHeaders,
    negotiated: Negotiated,
    requested: Option<RequestedFields>,
    cache: CacheHeaders,
    metadata: ConditionalMetadata,
}

enum Outcome {
    Completed,
    NotModified,
}

enum Abort {
    Failure(ApiFailure),
    Contract(ModuleContractError),
}

impl From<ApiFailure> for Abort {
    fn from(failure: ApiFailure) -> Self {
        Abort::Failure(failure)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Runs API requests through the full pipeline. Holds no per-request state,
/// so one instance serves all requests concurrently.
pub struct Gateway {
    settings: GatewaySettings,
    dispatcher: Dispatcher,
    admission: AdmissionController,
    origin: OriginTrustEvaluator,
    conditional: ConditionalNegotiator,
    localizer: Arc<dyn MessageLocalizer>,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    pub fn builder(settings: GatewaySettings) -> GatewayBuilder {
        GatewayBuilder::new(settings)
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn registry(&self) -> &ModuleRegistry {
        self.dispatcher.registry()
    }

    /// Process one request.
    ///
    /// Every recoverable failure becomes a well-formed error response; only a
    /// module contract violation is returned as `Err`.
    pub fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ModuleContractError> {
        let started = Instant::now();
        let span = info_span!("api_request", request_id = %request.id, action = field::Empty);
        let _guard = span.enter();

        let mut params = ParamReader::new();
        let mut log = MessageLog::new();
        let negotiated = negotiate(
            request,
            &mut params,
            &mut log,
            &self.settings,
            self.localizer.as_ref(),
        );

        let mut exchange = Exchange {
            caller: request.caller.clone(),
            params,
            tree: ResultTree::new(log),
            headers: ResponseHeaders::new(),
            negotiated,
            requested: None,
            cache: CacheHeaders::default(),
            metadata: ConditionalMetadata::default(),
        };

        let response = match self.run(request, &mut exchange, &span) {
            Ok(Outcome::Completed) => self.complete(request, exchange),
            Ok(Outcome::NotModified) => self.not_modified(request, exchange),
            Err(Abort::Failure(fault)) => {
                let tree = std::mem::take(&mut exchange.tree);
                let failure = GatewayFailure {
                    log: tree.into_log(),
                    fault,
                };
                self.fail(request, exchange, failure)
            }
            Err(Abort::Contract(err)) => return Err(err),
        };

        info!(
            status = response.status,
            duration_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        Ok(response)
    }

    fn run(
        &self,
        request: &ApiRequest,
        ex: &mut Exchange,
        span: &tracing::Span,
    ) -> Result<Outcome, Abort> {
        // Origin trust.
        let log = ex.tree.log_mut();
        if let Some(callback) = ex.params.get(request, "callback", log, MAIN_MODULE)
            && !is_valid_callback(callback)
        {
            return Err(ApiFailure::usage(
                FailureKind::BadValue,
                ApiMessage::new("badcallback", "apierror-badcallback", [callback]),
            )
            .into());
        }
        let origin_param = ex.params.get(request, "origin", log, MAIN_MODULE);
        if self.origin.lacks_same_origin_security(request) && !ex.caller.is_anonymous() {
            ex.caller = CallerIdentity::anonymous(self.settings.anonymous_rights.iter().cloned());
            ex.headers.set(LOGIN_SUPPRESSED_HEADER, "true");
        }
        self.origin
            .cors(origin_param, request)?
            .apply_headers(&mut ex.headers);

        // Reserved parameters.
        let log = ex.tree.log_mut();
        if let Some(format) = ex.params.get(request, "format", log, MAIN_MODULE)
            && format != "json"
        {
            return Err(bad_value("format", format).into());
        }
        let max_lag = integer_param(request, &mut ex.params, log, "maxlag")?;
        let assert = ex.params.get(request, "assert", log, MAIN_MODULE);
        let assert_user = ex.params.get(request, "assertuser", log, MAIN_MODULE);
        ex.cache.max_age = integer_param(request, &mut ex.params, log, "maxage")?.unwrap_or(0);
        ex.cache.s_max_age = integer_param(request, &mut ex.params, log, "smaxage")?.unwrap_or(0);
        ex.requested = Some(read_requested(request, &mut ex.params, log));

        // Resolution.
        let action = ex
            .params
            .get(request, "action", log, MAIN_MODULE)
            .or(self.settings.default_action.as_deref());
        if let Some(action) = action {
            span.record("action", action);
        }
        let module = self.dispatcher.resolve(action)?;
        let module = module.as_ref();

        // Setup and permissions.
        dispatch::check_contract(module).map_err(|err| {
            error!(module = module.module_name(), error = %err, "module contract violation");
            Abort::Contract(err)
        })?;
        self.dispatcher
            .check_setup(module, request, &ex.caller, &mut ex.params, ex.tree.log_mut())?;
        self.dispatcher
            .check_permissions(module, &ex.caller, request)?;

        // Admission.
        if let Err(rejection) = self
            .admission
            .check_lag(module, max_lag.map(|secs| secs as f64))
        {
            rejection.apply_headers(&mut ex.headers);
            return Err(rejection.into_failure().into());
        }

        check_assertions(assert, assert_user, &ex.caller)?;

        // Conditional request.
        ex.metadata = ConditionalMetadata::collect(module, request);
        if self.conditional.evaluate(request, &ex.metadata, self.clock.now())
            == ConditionalOutcome::NotModified
        {
            return Ok(Outcome::NotModified);
        }

        // Execution.
        let output = {
            let mut ctx = ModuleContext::new(
                module.module_name(),
                request,
                &ex.caller,
                &mut ex.params,
                ex.tree.log_mut(),
            );
            dispatch::invoke(module, &mut ctx)?;
            ctx.into_output()
        };

        for (name, value) in output.sections {
            ex.tree.add_section(name, value).map_err(|err| ApiFailure::Internal {
                kind: "ResultError".to_string(),
                message: err.to_string(),
                trace: vec![err.to_string()],
            })?;
        }
        let publicly_readable = self.settings.anonymous_rights.iter().any(|r| r == READ_RIGHT)
            && ex.caller.has_right(READ_RIGHT);
        ex.cache.mode = output.cache_mode.unwrap_or_default().restrict(publicly_readable);

        let unused = ex.params.unused(request);
        if !unused.is_empty() {
            ex.tree.log_mut().add_warning(
                ApiMessage::new(
                    "unrecognizedparams",
                    "apiwarn-unrecognizedparams",
                    [unused.join(", ")],
                ),
                Some(MAIN_MODULE),
            );
        }

        Ok(Outcome::Completed)
    }

    fn complete(&self, request: &ApiRequest, mut ex: Exchange) -> ApiResponse {
        self.add_requested_fields(request, &mut ex);
        self.cache_headers(request, &mut ex, false);

        let formatter = self.formatter(&ex);
        let body = ResultAggregator::new(&formatter, &self.settings).render(&ex.tree);
        ApiResponse {
            status: 200,
            headers: ex.headers,
            body: Some(body),
            error_codes: Vec::new(),
        }
    }

    fn not_modified(&self, request: &ApiRequest, mut ex: Exchange) -> ApiResponse {
        self.cache_headers(request, &mut ex, false);
        ApiResponse {
            status: ConditionalOutcome::NotModified.status_code(),
            headers: ex.headers,
            body: None,
            error_codes: Vec::new(),
        }
    }

    fn fail(&self, request: &ApiRequest, mut ex: Exchange, failure: GatewayFailure) -> ApiResponse {
        ex.tree = ResultTree::new(failure.log);
        self.add_requested_fields(request, &mut ex);

        let formatter = self.formatter(&ex);
        let aggregator = ResultAggregator::new(&formatter, &self.settings);
        let previous = ex.tree.log().errors().len();
        let error_codes = aggregator.substitute_with_error(&mut ex.tree, &failure.fault, &request.id);

        if let Some(code) = error_codes.get(previous) {
            ex.headers.set(API_ERROR_HEADER, code.clone());
        }
        self.cache_headers(request, &mut ex, true);

        ApiResponse {
            status: failure.fault.status_code(),
            headers: ex.headers,
            body: Some(aggregator.render(&ex.tree)),
            error_codes,
        }
    }

    fn formatter(&self, ex: &Exchange) -> ErrorFormatter {
        ErrorFormatter::new(ex.negotiated.error.clone(), self.localizer.clone())
    }

    fn add_requested_fields(&self, request: &ApiRequest, ex: &mut Exchange) {
        // Failures raised before the reserved parameters were read still
        // honour them.
        let requested = match ex.requested.take() {
            Some(requested) => requested,
            None => read_requested(request, &mut ex.params, ex.tree.log_mut()),
        };

        if let Some(id) = requested.request_id {
            ex.tree.set_field("requestid", id);
        }
        if requested.cur_timestamp {
            ex.tree
                .set_field("curtimestamp", self.clock.now().format(TIMESTAMP_FORMAT).to_string());
        }
        if requested.lang_info {
            ex.tree
                .set_field("uselang", ex.negotiated.response_language.clone());
            ex.tree
                .set_field("errorlang", ex.negotiated.error.language.clone());
        }
        if requested.served_by {
            ex.tree.set_field("servedby", self.settings.served_by.clone());
        }
    }

    fn cache_headers(&self, request: &ApiRequest, ex: &mut Exchange, is_error: bool) {
        ex.cache.authenticated = !ex.caller.is_anonymous();
        ex.cache
            .apply(&mut ex.headers, is_error, request.method, &ex.metadata);
    }
}

fn read_requested(
    request: &ApiRequest,
    params: &mut ParamReader,
    log: &mut MessageLog,
) -> RequestedFields {
    RequestedFields {
        request_id: params
            .get(request, "requestid", log, MAIN_MODULE)
            .map(str::to_string),
        cur_timestamp: params.flag(request, "curtimestamp", log, MAIN_MODULE),
        lang_info: params.flag(request, "responselanginfo", log, MAIN_MODULE),
        served_by: params.flag(request, "servedby", log, MAIN_MODULE),
    }
}

/// A non-negative integer parameter; anything else is `badinteger`.
fn integer_param(
    request: &ApiRequest,
    params: &mut ParamReader,
    log: &mut MessageLog,
    name: &str,
) -> Result<Option<u64>, ApiFailure> {
    let Some(raw) = params.get(request, name, log, MAIN_MODULE) else {
        return Ok(None);
    };
    raw.trim().parse::<u64>().map(Some).map_err(|_| {
        ApiFailure::usage(
            FailureKind::BadValue,
            ApiMessage::new("badinteger", "apierror-badinteger", [name, raw]),
        )
    })
}

fn bad_value(name: &str, value: &str) -> ApiFailure {
    ApiFailure::usage(
        FailureKind::BadValue,
        ApiMessage::new(
            FailureKind::BadValue.code(),
            "apierror-unrecognizedvalue",
            [name, value],
        ),
    )
}
