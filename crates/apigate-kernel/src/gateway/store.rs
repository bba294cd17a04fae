//! Backing-store contract consumed by admission control.

/// Worst replication lag across the replicas serving reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaLag {
    /// Host label of the most lagged replica.
    pub host: String,
    pub lag_seconds: f64,
}

impl ReplicaLag {
    pub fn new(host: impl Into<String>, lag_seconds: f64) -> Self {
        Self {
            host: host.into(),
            lag_seconds,
        }
    }

    /// Lag in whole seconds, as reported to clients.
    pub fn whole_seconds(&self) -> i64 {
        self.lag_seconds.trunc() as i64
    }
}

/// Source of replication lag.
///
/// Implementations are queried concurrently from many requests and must be
/// safe for shared read-only access.
pub trait LagProbe: Send + Sync {
    fn max_lag(&self) -> ReplicaLag;
}
