use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::Postgres;

mod config;
mod db;
mod error;
#[cfg(feature = "temp-db")]
pub mod temp;

pub use self::{
    config::{
        DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_LIFETIME,
        DEFAULT_POOL_MAX_CONNECTIONS, DEFAULT_POOL_MIN_CONNECTIONS, FinalizePolicy, PoolConfig,
    },
    db::{
        Conn, ConnError, ConnPool, ConnectionProvider, DirectProvider, Executor, PoolProvider,
        TxnContext,
    },
    error::{FinalizeError, TxnError},
};

/// Deferred work of one transaction attempt.
///
/// A body constructs its pipeline synchronously and returns it without
/// starting it. The executor is the only caller that awaits one, so at most
/// one pipeline per attempt is ever in flight. The pipeline borrows the
/// body's [`TxnContext`], which keeps it from outliving the attempt.
pub type Pipeline<'t, T, E> = BoxFuture<'t, Result<T, E>>;

/// Terminal result of a transaction attempt.
///
/// `Ok` carries the pipeline's value and means the transaction committed.
/// `Err` means it did not commit (or a cleanup step failed afterwards) and
/// carries the failure classified by phase.
pub type Outcome<T, E> = Result<T, TxnError<E>>;

/// Transaction boundary over a connection provider.
///
/// The executor owns the whole lifecycle of an attempt: it leases a
/// connection, opens the transaction, hands the body a [`TxnContext`], awaits
/// the pipeline the body constructed, finalizes with exactly one commit or
/// rollback, and returns the lease. Bodies never see the connection itself
/// and cannot finalize on their own.
#[derive(Debug, Clone)]
pub struct TxnExecutor<P = PoolProvider> {
    provider: P,
    finalize_policy: FinalizePolicy,
}

impl TxnExecutor<PoolProvider> {
    /// Connects a new pool and wraps it in an executor.
    #[tracing::instrument(skip_all, err)]
    pub async fn connect(url: &str, config: PoolConfig) -> Result<Self, ConnError> {
        PoolProvider::connect(url, config).await.map(Self::new)
    }

    /// Same as [`connect`](Self::connect), but retries while the database is
    /// still starting up.
    #[cfg(feature = "temp-db")]
    #[tracing::instrument(skip_all, err)]
    pub async fn connect_with_retry(url: &str, config: PoolConfig) -> Result<Self, ConnError> {
        let pool = ConnPool::connect_with_retry(url, config).await?;
        Ok(Self::new(PoolProvider::new(pool)))
    }
}

impl TxnExecutor<DirectProvider> {
    /// Executor that opens a fresh, unpooled connection per attempt.
    pub fn direct(url: impl Into<Arc<str>>) -> Self {
        Self::new(DirectProvider::new(url))
    }
}

impl<P: ConnectionProvider> TxnExecutor<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            finalize_policy: FinalizePolicy::default(),
        }
    }

    /// Picks which error to report when an attempt fails and its rollback or
    /// release then fails too. See [`FinalizePolicy`].
    pub fn with_finalize_policy(self, finalize_policy: FinalizePolicy) -> Self {
        Self {
            provider: self.provider,
            finalize_policy,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Runs one transaction attempt end to end and reports its outcome.
    ///
    /// The attempt proceeds in order:
    ///
    /// 1. lease a connection from the provider,
    /// 2. open a transaction on it,
    /// 3. run `body` to construct the attempt's pipeline,
    /// 4. await the pipeline,
    /// 5. commit on success or roll back on failure,
    /// 6. hand the connection back to the provider.
    ///
    /// Failures are classified by where they happened:
    /// [`TxnError::Construction`] before the pipeline started (steps 1-3),
    /// [`TxnError::Execution`] once it had (step 4), and
    /// [`TxnError::Finalization`] for commit, rollback, and release failures
    /// (steps 5-6). Exactly one of commit or rollback is attempted per opened
    /// transaction, and the connection goes back to the provider on every
    /// path, including cancellation. When both the attempt and its cleanup
    /// fail, the configured [`FinalizePolicy`] picks the reported error and
    /// the losing one is logged at `WARN`.
    #[tracing::instrument(skip_all, err)]
    pub async fn execute<T, E, F>(&self, body: F) -> Outcome<T, E>
    where
        F: for<'t> FnOnce(TxnContext<'t>) -> Result<Pipeline<'t, T, E>, E> + Send,
        T: Send,
        E: std::error::Error + From<sqlx::Error> + Send + 'static,
    {
        let mut conn = match self.provider.acquire().await {
            Ok(conn) => conn,
            Err(err) => return Err(TxnError::Construction(err.into())),
        };
        let attempt = run_attempt(&mut conn, self.finalize_policy, body).await;
        match (attempt, self.provider.release(conn).await) {
            (attempt, Ok(())) => attempt,
            (Ok(_), Err(err)) => {
                tracing::warn!(error = %err, "connection release failed after a committed attempt");
                Err(TxnError::Finalization(FinalizeError::Release(err)))
            }
            (Err(attempt_err), Err(release_err)) => Err(resolve_cleanup_failure(
                self.finalize_policy,
                attempt_err,
                FinalizeError::Release(release_err),
            )),
        }
    }
}

/// Everything between acquiring and releasing the lease: begin, construct,
/// run, finalize.
async fn run_attempt<T, E, F>(
    conn: &mut Conn,
    policy: FinalizePolicy,
    body: F,
) -> Result<T, TxnError<E>>
where
    F: for<'t> FnOnce(TxnContext<'t>) -> Result<Pipeline<'t, T, E>, E> + Send,
    T: Send,
    E: std::error::Error + From<sqlx::Error> + Send + 'static,
{
    let mut tx = match conn.begin().await {
        Ok(tx) => tx,
        Err(err) => return Err(TxnError::Construction(err.into())),
    };
    // The body runs synchronously and cannot reach the database before its
    // pipeline is awaited. A failure here still rolls back: BEGIN already ran.
    // The pipeline borrows `tx`, so both construction and execution resolve
    // inside this match; finalization below takes `tx` by value.
    let attempt = match body(TxnContext::new(&mut tx)) {
        Ok(pipeline) => Ok(pipeline.await),
        Err(err) => Err(err),
    };
    match attempt {
        Ok(Ok(value)) => match tx.commit().await {
            Ok(()) => Ok(value),
            // A failed COMMIT has already ended the transaction server-side,
            // so no rollback is attempted on top of it.
            Err(err) => Err(TxnError::Finalization(FinalizeError::Commit(err))),
        },
        Ok(Err(err)) => Err(rollback_after_failure(tx, TxnError::Execution(err), policy).await),
        Err(err) => Err(rollback_after_failure(tx, TxnError::Construction(err), policy).await),
    }
}

async fn rollback_after_failure<E>(
    tx: sqlx::Transaction<'_, Postgres>,
    attempt_err: TxnError<E>,
    policy: FinalizePolicy,
) -> TxnError<E>
where
    E: std::error::Error,
{
    match tx.rollback().await {
        Ok(()) => attempt_err,
        Err(err) => resolve_cleanup_failure(policy, attempt_err, FinalizeError::Rollback(err)),
    }
}

fn resolve_cleanup_failure<E>(
    policy: FinalizePolicy,
    attempt_err: TxnError<E>,
    cleanup_err: FinalizeError,
) -> TxnError<E>
where
    E: std::error::Error,
{
    // An attempt that already failed finalization keeps its first failure.
    if attempt_err.is_finalization() || matches!(policy, FinalizePolicy::PreferBodyError) {
        tracing::warn!(
            error = %cleanup_err,
            "cleanup failed after a transaction error; reporting the original error"
        );
        attempt_err
    } else {
        tracing::warn!(
            error = %attempt_err,
            "reporting cleanup failure; the transaction error it followed is suppressed by policy"
        );
        TxnError::Finalization(cleanup_err)
    }
}

/// Private module for sealed traits.
pub(crate) mod _priv {
    /// Sealed trait to prevent downstream [`Executor`](crate::Executor)
    /// implementations.
    pub trait Sealed {}
}
