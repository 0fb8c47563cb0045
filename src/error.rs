//! Error taxonomy for executed transaction attempts.

/// Error for a single transaction attempt, tagged with the phase that failed.
///
/// The tag tells a caller what the database saw before the error surfaced:
///
/// - [`Construction`](TxnError::Construction): nothing from the attempt's
///   body ran. Acquiring the connection or `BEGIN` failed, or the body failed
///   while assembling its pipeline. If `BEGIN` had already run, the
///   transaction was rolled back before this error was returned.
/// - [`Execution`](TxnError::Execution): the started pipeline signaled a
///   failure, no matter how deeply nested its origin. The transaction was
///   rolled back; none of the attempt's statements took effect.
/// - [`Finalization`](TxnError::Finalization): the body finished but commit,
///   rollback, or releasing the connection failed. See [`FinalizeError`] for
///   which step it was and what that implies.
///
/// `E` is the caller's error type. It must absorb driver errors raised inside
/// pipelines, hence the `From<sqlx::Error>` bound on
/// [`execute`](crate::TxnExecutor::execute).
#[derive(Debug, thiserror::Error)]
pub enum TxnError<E> {
    /// The attempt failed before any unit of asynchronous work started.
    #[error("Error constructing transaction body: {0}")]
    Construction(#[source] E),

    /// The attempt's pipeline failed after it was started.
    #[error("Error executing transaction body: {0}")]
    Execution(#[source] E),

    /// The attempt failed while being closed out.
    #[error("Error finalizing transaction: {0}")]
    Finalization(#[source] FinalizeError),
}

impl<E> TxnError<E> {
    /// Returns `true` if the attempt failed before any work started.
    pub fn is_construction(&self) -> bool {
        matches!(self, TxnError::Construction(_))
    }

    /// Returns `true` if the attempt's started pipeline failed.
    pub fn is_execution(&self) -> bool {
        matches!(self, TxnError::Execution(_))
    }

    /// Returns `true` if commit, rollback, or release failed.
    pub fn is_finalization(&self) -> bool {
        matches!(self, TxnError::Finalization(_))
    }

    /// Returns the body's own failure, if this error carries one.
    ///
    /// Finalization errors come from the driver, not the body, so they
    /// return `None`.
    pub fn body_error(&self) -> Option<&E> {
        match self {
            TxnError::Construction(err) | TxnError::Execution(err) => Some(err),
            TxnError::Finalization(_) => None,
        }
    }

    /// Consumes the error and returns the body's failure, if any.
    pub fn into_body_error(self) -> Option<E> {
        match self {
            TxnError::Construction(err) | TxnError::Execution(err) => Some(err),
            TxnError::Finalization(_) => None,
        }
    }
}

impl TxnError<sqlx::Error> {
    /// Returns `true` if the error is likely to be a transient connection
    /// issue rather than a verdict on the attempt's statements.
    ///
    /// The following driver errors qualify:
    /// - `sqlx::Error::Io`: an I/O error, often a network issue or a closed
    ///   socket.
    /// - `sqlx::Error::Tls`: a failure during the TLS handshake.
    /// - `sqlx::Error::PoolTimedOut`: the pool timed out leasing a
    ///   connection.
    /// - `sqlx::Error::PoolClosed`: the pool was closed while the attempt was
    ///   pending.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.driver_error(),
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
        )
    }

    /// Returns `true` if rerunning the whole attempt from the boundary is
    /// reasonable.
    ///
    /// Covers connection errors (see [`is_connection_error`]) plus the two
    /// conditions PostgreSQL raises to tell a client to retry its
    /// transaction:
    /// - **Serialization failure** (code `40001`): two transactions
    ///   conflicted and one was chosen to be redone.
    /// - **Deadlock detected** (code `40P01`): the server aborted this
    ///   transaction to break a lock cycle.
    ///
    /// Both apply to the attempt as a whole. The boundary rolls back and
    /// releases before returning, so the caller can simply call
    /// [`execute`](crate::TxnExecutor::execute) again with a fresh body.
    ///
    /// [`is_connection_error`]: TxnError::is_connection_error
    pub fn is_retryable(&self) -> bool {
        if self.is_connection_error() {
            return true;
        }

        matches!(
            self.driver_error(),
            sqlx::Error::Database(err)
                if err.code().is_some_and(|code| matches!(
                    code.as_ref(),
                    "40001" | // serialization_failure
                    "40P01"   // deadlock_detected
                ))
        )
    }

    fn driver_error(&self) -> &sqlx::Error {
        match self {
            TxnError::Construction(err) | TxnError::Execution(err) => err,
            TxnError::Finalization(err) => err.driver_error(),
        }
    }
}

/// A failure while closing out a transaction attempt.
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    /// `COMMIT` failed.
    ///
    /// PostgreSQL terminates the transaction when a commit fails, so no
    /// explicit rollback follows: the attempt's work is gone and the
    /// connection is clean for reuse.
    #[error("Error committing transaction: {0}")]
    Commit(#[source] sqlx::Error),

    /// `ROLLBACK` failed.
    ///
    /// Surfaced directly when rollback was the only failure; when it happened
    /// while handling an earlier body failure, the configured
    /// [`FinalizePolicy`](crate::FinalizePolicy) decides which error wins.
    #[error("Error rolling back transaction: {0}")]
    Rollback(#[source] sqlx::Error),

    /// Returning the connection to its provider failed.
    ///
    /// With a pooled provider this step cannot fail; dedicated connections
    /// surface errors from the close handshake here. The attempt itself may
    /// have committed before this error.
    #[error("Error releasing connection: {0}")]
    Release(#[source] sqlx::Error),
}

impl FinalizeError {
    /// The driver error behind the failed step.
    pub fn driver_error(&self) -> &sqlx::Error {
        match self {
            FinalizeError::Commit(err)
            | FinalizeError::Rollback(err)
            | FinalizeError::Release(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("test failure")]
    struct Boom;

    #[test]
    fn phase_predicates_match_the_variant() {
        //* Given
        let construction = TxnError::Construction(Boom);
        let execution = TxnError::Execution(Boom);
        let finalization =
            TxnError::<Boom>::Finalization(FinalizeError::Commit(sqlx::Error::PoolClosed));

        //* Then
        assert!(construction.is_construction());
        assert!(!construction.is_execution());
        assert!(execution.is_execution());
        assert!(!execution.is_finalization());
        assert!(finalization.is_finalization());
        assert!(!finalization.is_construction());
    }

    #[test]
    fn body_error_is_absent_for_finalization_failures() {
        //* Given
        let execution = TxnError::Execution(Boom);
        let finalization =
            TxnError::<Boom>::Finalization(FinalizeError::Rollback(sqlx::Error::PoolClosed));

        //* Then
        assert!(
            execution.body_error().is_some(),
            "execution errors should expose the body failure"
        );
        assert!(
            finalization.body_error().is_none(),
            "finalization errors come from the driver, not the body"
        );
        assert!(execution.into_body_error().is_some());
        assert!(finalization.into_body_error().is_none());
    }

    #[test]
    fn connection_errors_are_retryable() {
        //* Given
        let timed_out = TxnError::Construction(sqlx::Error::PoolTimedOut);
        let not_found = TxnError::Execution(sqlx::Error::RowNotFound);

        //* Then
        assert!(timed_out.is_connection_error());
        assert!(
            timed_out.is_retryable(),
            "pool timeouts should invite a retry of the whole attempt"
        );
        assert!(!not_found.is_connection_error());
        assert!(
            !not_found.is_retryable(),
            "a missing row is a verdict, not a transient failure"
        );
    }

    #[test]
    fn display_labels_the_failed_phase() {
        //* Given
        let construction = TxnError::Construction(Boom);
        let execution = TxnError::Execution(Boom);
        let finalization =
            TxnError::<Boom>::Finalization(FinalizeError::Rollback(sqlx::Error::PoolClosed));

        //* Then
        assert_eq!(
            construction.to_string(),
            "Error constructing transaction body: test failure"
        );
        assert_eq!(
            execution.to_string(),
            "Error executing transaction body: test failure"
        );
        assert!(
            finalization
                .to_string()
                .starts_with("Error finalizing transaction: Error rolling back transaction:"),
            "finalization display should name the failed step"
        );
    }
}
