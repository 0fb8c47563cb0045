//! Configuration for connection pooling and failure-reporting policy.

use std::time::Duration;

/// Default maximum number of connections in the pool.
///
/// Each transaction attempt leases one connection for its whole lifetime, so
/// this is also the number of attempts that can run concurrently. A pool of
/// 10 is sufficient for most workloads.
pub const DEFAULT_POOL_MAX_CONNECTIONS: u32 = 10;

/// Default minimum number of connections to keep alive in the pool.
///
/// Set to 25% of [`DEFAULT_POOL_MAX_CONNECTIONS`] (rounded up, minimum 1):
/// `DEFAULT_POOL_MAX_CONNECTIONS.div_ceil(4).max(1)` = 3.
///
/// Keeping a floor of ready connections avoids connection establishment
/// latency when an attempt acquires its lease, and staggers `max_lifetime`
/// expiration so the pool never recycles every connection at once.
pub const DEFAULT_POOL_MIN_CONNECTIONS: u32 = {
    let v = DEFAULT_POOL_MAX_CONNECTIONS.div_ceil(4);
    if v < 1 { 1 } else { v }
};

/// Default maximum lifetime for a pooled connection (30 minutes).
///
/// Connections are recycled before they hit server-side idle timeouts
/// (typically 1 to 8 hours on managed PostgreSQL).
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// Default idle timeout for a pooled connection (10 minutes).
///
/// Connections idle longer than this are closed and removed from the pool,
/// down to the [`DEFAULT_POOL_MIN_CONNECTIONS`] floor.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Default acquire timeout when leasing a connection (5 seconds).
///
/// Attempts that cannot acquire a connection within this window fail fast
/// with a construction error rather than queuing indefinitely.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool configuration.
///
/// Controls pool sizing and connection lifecycle for the pooled connection
/// provider. Everything beyond these knobs (host, port, credentials,
/// database) travels opaquely inside the connection URL.
///
/// # Defaults
///
/// | Field              | Default                                         |
/// |--------------------|--------------------------------------------------|
/// | `max_connections`  | [`DEFAULT_POOL_MAX_CONNECTIONS`] (10)            |
/// | `min_connections`  | [`DEFAULT_POOL_MIN_CONNECTIONS`] (3, i.e. 25%)  |
/// | `acquire_timeout`  | [`DEFAULT_ACQUIRE_TIMEOUT`] (5 s)               |
/// | `max_lifetime`     | [`DEFAULT_MAX_LIFETIME`] (30 min)               |
/// | `idle_timeout`     | [`DEFAULT_IDLE_TIMEOUT`] (10 min)               |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to keep alive in the pool.
    ///
    /// Keeping a floor of ready connections avoids connection establishment
    /// latency on the hot path and prevents all connections from expiring
    /// simultaneously.
    pub min_connections: u32,
    /// Maximum time to wait for a connection from the pool before failing.
    pub acquire_timeout: Duration,
    /// Maximum lifetime of a connection before it is recycled.
    pub max_lifetime: Duration,
    /// How long a connection may sit idle before being closed.
    pub idle_timeout: Duration,
}

impl PoolConfig {
    /// Creates a `PoolConfig` with the given pool size and default timeouts.
    ///
    /// `min_connections` is derived from `size` using the heuristic
    /// `size.div_ceil(4).max(1)` (about 25% of max, minimum 1), keeping a
    /// baseline of ready connections while staggering `max_lifetime`
    /// expiration.
    pub fn with_size(size: u32) -> Self {
        Self {
            max_connections: size,
            min_connections: size.div_ceil(4).max(1),
            ..Self::default()
        }
    }
}

impl Default for PoolConfig {
    /// Returns a `PoolConfig` using the crate-level defaults.
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_POOL_MAX_CONNECTIONS,
            min_connections: DEFAULT_POOL_MIN_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Which error `execute` reports when rollback or release fails while the
/// attempt is already failing.
///
/// Cleanup failures after a successful body are always surfaced as
/// finalization errors; this policy only selects the winner when both the
/// body and its cleanup fail. The losing error is logged at WARN either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FinalizePolicy {
    /// Report the body's failure and log the cleanup failure.
    ///
    /// The body failure usually carries the information the caller needs to
    /// decide on a retry, so it wins by default.
    #[default]
    PreferBodyError,
    /// Report the cleanup failure and log the body's failure.
    PreferFinalizeError,
}
