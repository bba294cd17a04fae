//! In-process [`LagProbe`] implementation.

use apigate_kernel::config::ReplicationSettings;
use apigate_kernel::gateway::{LagProbe, ReplicaLag};
use parking_lot::RwLock;

/// [`LagProbe`] reporting a configured value that can be updated at runtime.
///
/// Suitable for single-node deployments and tests. Probes that query real
/// replicas belong in their own crates.
pub struct StaticLagProbe {
    state: RwLock<ReplicaLag>,
}

impl StaticLagProbe {
    pub fn new(host: impl Into<String>, lag_seconds: f64) -> Self {
        Self {
            state: RwLock::new(ReplicaLag::new(host, lag_seconds)),
        }
    }

    pub fn from_settings(settings: &ReplicationSettings) -> Self {
        Self::new(settings.host.clone(), settings.lag_seconds)
    }

    pub fn set_lag(&self, lag_seconds: f64) {
        self.state.write().lag_seconds = lag_seconds;
    }
}

impl LagProbe for StaticLagProbe {
    fn max_lag(&self) -> ReplicaLag {
        self.state.read().clone()
    }
}
