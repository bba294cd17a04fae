//! Extension points the gateway consults while processing a request.

use super::message::ApiMessage;
use super::module::ApiModule;
use super::types::{ApiRequest, CallerIdentity};

/// Decides whether a request may rely on same-origin guarantees.
pub trait OriginPolicy: Send + Sync {
    /// Return `false` to mark the request as lacking same-origin security.
    fn has_same_origin_security(&self, request: &ApiRequest) -> bool;
}

/// Last check before a module executes.
///
/// Returning `Err` aborts the request with the supplied message, whose code
/// is reported to the client unchanged.
pub trait ExecutePolicy: Send + Sync {
    fn check(
        &self,
        module: &dyn ApiModule,
        caller: &CallerIdentity,
        request: &ApiRequest,
    ) -> Result<(), ApiMessage>;
}
