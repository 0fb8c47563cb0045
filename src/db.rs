//! Internal database connection abstractions
//!
//! This module provides the primitives the transaction executor runs on:
//! the connection pool, the provider seam that leases connections for
//! attempts, and the context handed to transaction bodies.
//!
//! The module is private to the crate; only selected types are re-exported
//! through lib.rs.

mod conn;
mod ctx;
mod exec;
mod provider;

pub use conn::{ConnError, ConnPool};
pub use ctx::TxnContext;
pub use exec::Executor;
pub use provider::{Conn, ConnectionProvider, DirectProvider, PoolProvider};
