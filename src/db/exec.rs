//! Custom executor trait for statements run through this crate
//!
//! This module defines a marker trait that extends [`sqlx::Executor`] and
//! restricts which types can run statements through the public API.

use sqlx::Postgres;

/// Database executor trait that extends [`sqlx::Executor`]
///
/// This trait acts as a marker restricting the crate's query surface to the
/// pool (for statements outside any transaction) and the transaction context
/// (for statements inside an attempt), while providing full
/// [`sqlx::Executor`] functionality through the trait bound.
pub trait Executor<'c>: sqlx::Executor<'c, Database = Postgres> + crate::_priv::Sealed {}
