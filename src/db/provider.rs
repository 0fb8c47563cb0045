//! Connection leasing for transaction attempts

use std::{future::Future, sync::Arc};

use sqlx::{Connection as _, PgConnection, Postgres, pool::PoolConnection};

use super::{ConnError, ConnPool};
use crate::config::PoolConfig;

/// Source of database connections for the transaction executor.
///
/// Each transaction attempt leases exactly one connection with
/// [`acquire`](Self::acquire) and hands it back with
/// [`release`](Self::release) once the attempt has been finalized, no matter
/// how the attempt ended.
pub trait ConnectionProvider: Send + Sync {
    /// Leases one connection for a single transaction attempt.
    fn acquire(&self) -> impl Future<Output = Result<Conn, sqlx::Error>> + Send;

    /// Takes a connection back after the attempt has been finalized.
    ///
    /// A pooled provider may complete by scheduling the check-in rather than
    /// waiting for it. A direct provider closes the connection and surfaces
    /// the outcome.
    fn release(&self, conn: Conn) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

/// A leased connection, owned by the executor for the span of one attempt.
#[derive(Debug)]
pub struct Conn(ConnInner);

#[derive(Debug)]
enum ConnInner {
    Pooled(PoolConnection<Postgres>),
    Direct(PgConnection),
}

impl Conn {
    /// Wraps a connection checked out of a [`ConnPool`].
    pub fn pooled(conn: PoolConnection<Postgres>) -> Self {
        Self(ConnInner::Pooled(conn))
    }

    /// Wraps a standalone connection.
    pub fn direct(conn: PgConnection) -> Self {
        Self(ConnInner::Direct(conn))
    }

    /// Opens a transaction on the leased connection.
    ///
    /// Dropping the returned transaction without committing queues a
    /// `ROLLBACK`, which is what keeps a cancelled attempt from leaking its
    /// writes.
    pub(crate) async fn begin(&mut self) -> Result<sqlx::Transaction<'_, Postgres>, sqlx::Error> {
        self.as_pg_mut().begin().await
    }

    /// Returns the connection to wherever it came from.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        match self.0 {
            // The pool reclaims the connection on drop and rolls back any
            // transaction left open before handing it out again.
            ConnInner::Pooled(conn) => {
                drop(conn);
                Ok(())
            }
            ConnInner::Direct(conn) => conn.close().await,
        }
    }

    fn as_pg_mut(&mut self) -> &mut PgConnection {
        match &mut self.0 {
            ConnInner::Pooled(conn) => &mut **conn,
            ConnInner::Direct(conn) => conn,
        }
    }
}

/// Provider that leases connections from a shared [`ConnPool`].
#[derive(Debug, Clone)]
pub struct PoolProvider {
    pool: ConnPool,
}

impl PoolProvider {
    pub fn new(pool: ConnPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool and wraps it as a provider.
    #[tracing::instrument(skip_all, err)]
    pub async fn connect(url: &str, config: PoolConfig) -> Result<Self, ConnError> {
        ConnPool::connect(url, config).await.map(Self::new)
    }

    /// The underlying pool, for statements that run outside any transaction.
    pub fn pool(&self) -> &ConnPool {
        &self.pool
    }
}

impl ConnectionProvider for PoolProvider {
    fn acquire(&self) -> impl Future<Output = Result<Conn, sqlx::Error>> + Send {
        async move { self.pool.acquire().await.map(Conn::pooled) }
    }

    fn release(&self, conn: Conn) -> impl Future<Output = Result<(), sqlx::Error>> + Send {
        conn.close()
    }
}

/// Provider that opens a fresh connection per attempt, without pooling.
#[derive(Debug, Clone)]
pub struct DirectProvider {
    url: Arc<str>,
}

impl DirectProvider {
    pub fn new(url: impl Into<Arc<str>>) -> Self {
        Self { url: url.into() }
    }
}

impl ConnectionProvider for DirectProvider {
    fn acquire(&self) -> impl Future<Output = Result<Conn, sqlx::Error>> + Send {
        async move { PgConnection::connect(&self.url).await.map(Conn::direct) }
    }

    fn release(&self, conn: Conn) -> impl Future<Output = Result<(), sqlx::Error>> + Send {
        conn.close()
    }
}
