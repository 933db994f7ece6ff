//! The driver seam: anything that can run dialect SQL with bindings.
//!
//! A driver is deliberately dumb. It reports its [`Dialect`], executes
//! statements, and returns rows or counts; everything above it (grammar,
//! logging, transaction refcounting, error context) lives in
//! [`Connection`](crate::connection::Connection). Test suites substitute
//! in-memory fakes here.

use crate::grammar::Dialect;
use crate::row::Row;
use crate::value::Value;
use std::future::Future;

/// Error surfaced by a driver. Connections wrap it with the statement
/// text and bindings before it reaches callers.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Backend abstraction over an SQL connection.
pub trait Driver: Send + Sync {
    /// Which grammar to compile statements with.
    fn dialect(&self) -> Dialect;

    /// Run a select and return its rows.
    fn select(
        &self,
        sql: &str,
        bindings: &[Value],
    ) -> impl Future<Output = DriverResult<Vec<Row>>> + Send;

    /// Run an insert and return the last inserted id.
    fn insert(
        &self,
        sql: &str,
        bindings: &[Value],
    ) -> impl Future<Output = DriverResult<i64>> + Send;

    /// Run any other statement and return the affected row count.
    fn execute(
        &self,
        sql: &str,
        bindings: &[Value],
    ) -> impl Future<Output = DriverResult<u64>> + Send;

    /// Open a physical transaction.
    fn begin(&self) -> impl Future<Output = DriverResult<()>> + Send;

    /// Commit the physical transaction.
    fn commit(&self) -> impl Future<Output = DriverResult<()>> + Send;

    /// Roll back the physical transaction.
    fn rollback(&self) -> impl Future<Output = DriverResult<()>> + Send;
}
