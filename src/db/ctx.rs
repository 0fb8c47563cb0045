//! Context handed to transaction bodies while their attempt is live

use sqlx::{PgConnection, Postgres};

/// Handle to an in-progress transaction, valid only while the executor runs
/// the attempt.
///
/// A body receives the context by value, moves it into the pipeline it
/// returns, and runs statements through it via [`sqlx::Executor`] (implemented
/// on `&mut TxnContext`). The context carries no commit or rollback
/// authority: finalization belongs to the executor.
///
/// The context borrows from the executor-owned transaction, so it cannot
/// outlive the attempt. Code that tries to retain it past finalization, or to
/// smuggle it into another attempt, does not compile.
#[derive(Debug)]
pub struct TxnContext<'t> {
    conn: &'t mut PgConnection,
}

impl<'t> TxnContext<'t> {
    /// Reborrows the live transaction for the duration of one body.
    pub(crate) fn new(tx: &'t mut sqlx::Transaction<'_, Postgres>) -> Self {
        Self { conn: &mut **tx }
    }
}

// Implement sqlx::Executor for &mut TxnContext by delegating to the borrowed
// PgConnection
impl<'c> sqlx::Executor<'c> for &'c mut TxnContext<'_> {
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
        (&mut *self.conn).fetch_many(query)
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
        (&mut *self.conn).fetch_optional(query)
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
        (&mut *self.conn).prepare_with(sql, parameters)
    }

    fn describe<'e, 'q: 'e>(
        self,
        sql: &'q str,
    ) -> futures::future::BoxFuture<'e, Result<sqlx::Describe<Self::Database>, sqlx::Error>>
    where
        'c: 'e,
    {
        (&mut *self.conn).describe(sql)
    }
}

impl<'c> super::Executor<'c> for &'c mut TxnContext<'_> {}

impl crate::_priv::Sealed for &mut TxnContext<'_> {}
