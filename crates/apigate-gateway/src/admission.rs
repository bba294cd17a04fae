//! Admission control against replication lag.
//!
//! A client passes `maxlag=N` to ask the gateway to refuse work while the
//! replicas serving reads are more than `N` seconds behind. Rejection
//! happens before the module runs, so nothing is executed partially.

use apigate_kernel::gateway::{
    ApiFailure, ApiMessage, ApiModule, FailureKind, LagProbe, ReplicaLag, ResponseHeaders,
};
use std::sync::Arc;
use tracing::warn;

/// Seconds a rejected client is asked to wait before retrying.
pub const RETRY_AFTER_SECONDS: u32 = 5;

/// A request refused because replicas lag too far behind.
#[derive(Debug, Clone, PartialEq)]
pub struct LagRejection {
    pub lag: ReplicaLag,
    show_hostnames: bool,
}

impl LagRejection {
    /// `Retry-After` and `X-Database-Lag` for the rejected response.
    pub fn apply_headers(&self, headers: &mut ResponseHeaders) {
        headers.set("Retry-After", RETRY_AFTER_SECONDS.to_string());
        headers.set("X-Database-Lag", self.lag.whole_seconds().to_string());
    }

    pub fn into_failure(self) -> ApiFailure {
        let seconds = self.lag.whole_seconds();
        let message = if self.show_hostnames {
            ApiMessage::new(
                FailureKind::AdmissionRejected.code(),
                "apierror-maxlag",
                [seconds.to_string(), self.lag.host.clone()],
            )
            .with_data("host", self.lag.host)
        } else {
            ApiMessage::new(
                FailureKind::AdmissionRejected.code(),
                "apierror-maxlag-generic",
                [seconds.to_string()],
            )
        };
        ApiFailure::usage(
            FailureKind::AdmissionRejected,
            message.with_data("lag", seconds).with_data("type", "db"),
        )
    }
}

/// Decides whether a request may proceed given the current replica lag.
pub struct AdmissionController {
    probe: Arc<dyn LagProbe>,
    show_hostnames: bool,
}

impl AdmissionController {
    pub fn new(probe: Arc<dyn LagProbe>, show_hostnames: bool) -> Self {
        Self {
            probe,
            show_hostnames,
        }
    }

    /// Compare the worst replica lag with the client's `maxlag`.
    ///
    /// Skipped entirely when the client sent no `maxlag` or the module opts
    /// out of lag checking. A lag equal to the threshold is accepted.
    pub fn check_lag(
        &self,
        module: &dyn ApiModule,
        max_lag: Option<f64>,
    ) -> Result<(), LagRejection> {
        let Some(max_lag) = max_lag else {
            return Ok(());
        };
        if !module.should_check_max_lag() {
            return Ok(());
        }

        let lag = self.probe.max_lag();
        if lag.lag_seconds > max_lag {
            warn!(
                host = %lag.host,
                lag_seconds = lag.lag_seconds,
                max_lag,
                "request rejected: replication lag above maxlag"
            );
            return Err(LagRejection {
                lag,
                show_hostnames: self.show_hostnames,
            });
        }
        Ok(())
    }
}
