//! Connection pool implementation backing the pooled provider

use sqlx::{Pool, Postgres, postgres::PgPoolOptions};

use crate::config::PoolConfig;

/// A connection pool to the database.
#[derive(Debug, Clone)]
pub struct ConnPool(Pool<Postgres>);

impl ConnPool {
    /// Creates a connection pool, applying every knob from the config.
    #[tracing::instrument(skip_all, err)]
    pub async fn connect(url: &str, config: PoolConfig) -> Result<Self, ConnError> {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .connect(url)
            .await
            .map(Self)
            .map_err(ConnError::ConnectionError)
    }

    /// Creates a connection pool with exponential backoff retry for databases
    /// that are still starting up.
    ///
    /// Retries up to 20 times when receiving error code 57P03 (database
    /// starting up). Used with ephemeral PostgreSQL instances in tests.
    #[cfg(any(test, feature = "temp-db"))]
    #[tracing::instrument(skip_all, err)]
    pub async fn connect_with_retry(url: &str, config: PoolConfig) -> Result<Self, ConnError> {
        use std::time::Duration;

        use backon::{ExponentialBuilder, Retryable};

        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(100))
            .with_max_times(20);

        fn is_db_starting_up(err: &ConnError) -> bool {
            matches!(
                err,
                ConnError::ConnectionError(sqlx::Error::Database(db_err))
                if db_err.code().is_some_and(|code| code == "57P03")
            )
        }

        fn notify_retry(err: &ConnError, dur: Duration) {
            tracing::warn!(
                error = %err,
                "Database still starting up during connection. Retrying in {:.1}s",
                dur.as_secs_f32()
            );
        }

        (|| Self::connect(url, config.clone()))
            .retry(retry_policy)
            .when(is_db_starting_up)
            .notify(notify_retry)
            .await
    }
}

impl std::ops::Deref for ConnPool {
    type Target = Pool<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Implement sqlx::Executor for &ConnPool by delegating to the underlying Pool
impl<'c> sqlx::Executor<'c> for &'c ConnPool {
    type Database = Postgres;

    fn fetch_many<'e, 'q: 'e, E>(
        self,
        query: E,
    ) -> futures::stream::BoxStream<
        'e,
        Result<
            sqlx::Either<
                <Postgres as sqlx::Database>::QueryResult,
                <Postgres as sqlx::Database>::Row,
            >,
            sqlx::Error,
        >,
    >
    where
        'c: 'e,
        E: 'q + sqlx::Execute<'q, Self::Database>,
    {
        (&self.0).fetch_many(query)
    }

    fn fetch_optional<'e, 'q: 'e, E>(
        self,
        query: E,
    ) -> futures::future::BoxFuture<
        'e,
        Result<Option<<Postgres as sqlx::Database>::Row>, sqlx::Error>,
    >
    where
        'c: 'e,
        E: 'q + sqlx::Execute<'q, Self::Database>,
    {
        (&self.0).fetch_optional(query)
    }

    fn prepare_with<'e, 'q: 'e>(
        self,
        sql: &'q str,
        parameters: &'e [<Postgres as sqlx::Database>::TypeInfo],
    ) -> futures::future::BoxFuture<
        'e,
        Result<<Postgres as sqlx::Database>::Statement<'q>, sqlx::Error>,
    >
    where
        'c: 'e,
    {
        (&self.0).prepare_with(sql, parameters)
    }

    fn describe<'e, 'q: 'e>(
        self,
        sql: &'q str,
    ) -> futures::future::BoxFuture<'e, Result<sqlx::Describe<Self::Database>, sqlx::Error>>
    where
        'c: 'e,
    {
        (&self.0).describe(sql)
    }
}

impl<'c> super::Executor<'c> for &'c ConnPool {}

impl crate::_priv::Sealed for &ConnPool {}

/// Errors that can occur when setting up the connection pool.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Failed to establish database connection.
    #[error("Error connecting to database: {0}")]
    ConnectionError(#[source] sqlx::Error),
}
