//! API gateway kernel contract.
//!
//! This module defines the *trait interfaces and data model* for the API
//! request gateway. No pipeline logic lives here; that belongs in
//! `apigate-gateway`.
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              apigate-kernel  (this module)                  │
//! │  ApiModule trait + ModuleContext    LagProbe trait          │
//! │  OriginPolicy / ExecutePolicy       MessageLocalizer trait  │
//! │  ApiRequest / ApiResponse / ResultTree / MessageLog         │
//! │  ApiFailure / GatewayFailure / ModuleContractError          │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              apigate-gateway  (runtime crate)               │
//! │  Gateway pipeline   ModuleRegistry   AdmissionController    │
//! │  ConditionalNegotiator   OriginTrustEvaluator               │
//! │  ErrorFormatter / ResultAggregator   StaticCatalog          │
//! │  axum HTTP server                                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod format;
pub mod hooks;
pub mod message;
pub mod module;
pub mod params;
pub mod result;
pub mod store;
pub mod types;

// ── Flat re-exports ────────────────────────────────────────────────────────

pub use error::{
    ApiFailure, FailureKind, GatewayFailure, ModuleContractError, ModuleError, RegistryError,
    ResultError, UsageError,
};
pub use format::{ErrorFormat, ErrorFormatSpec};
pub use hooks::{ExecutePolicy, OriginPolicy};
pub use message::{ApiMessage, MessageLocalizer, MessageText, substitute_params};
pub use module::{
    ApiModule, ConditionalKind, ConditionalValue, ModuleContext, ModuleOutput, TokenRequirement,
};
pub use params::ParamReader;
pub use result::{MAIN_MODULE, MessageEntry, MessageLog, RESERVED_NAMES, ResultTree};
pub use store::{LagProbe, ReplicaLag};
pub use types::{
    ANONYMOUS_TOKEN, ApiRequest, ApiResponse, CacheMode, CallerIdentity, Clock, FixedClock,
    HttpMethod, ParamValue, ResponseHeaders, SystemClock,
};
