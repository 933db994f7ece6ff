//! Connection layer: statement logging, error context, and reference-counted
//! transactions on top of a [`Driver`].

use crate::driver::Driver;
use crate::error::{OrmError, OrmResult};
use crate::grammar::Grammar;
use crate::row::Row;
use crate::value::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// A driver plus the bookkeeping every statement shares: grammar selection,
/// tracing at the statement boundary, driver-error wrapping, and the nested
/// transaction counter.
#[derive(Debug)]
pub struct Connection<D> {
    driver: D,
    depth: AtomicU32,
}

impl<D: Driver> Connection<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            depth: AtomicU32::new(0),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The grammar matching the driver's dialect.
    pub fn grammar(&self) -> Grammar {
        Grammar::new(self.driver.dialect())
    }

    /// Run a select, returning rows.
    pub async fn select(&self, sql: &str, bindings: &[Value]) -> OrmResult<Vec<Row>> {
        let started = Instant::now();
        match self.driver.select(sql, bindings).await {
            Ok(rows) => {
                tracing::debug!(
                    sql,
                    bindings = bindings.len(),
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "select"
                );
                Ok(rows)
            }
            Err(e) => {
                tracing::warn!(sql, error = %e, "select failed");
                Err(OrmError::query(e.message(), sql, bindings))
            }
        }
    }

    /// Run an insert, returning the last inserted id.
    pub async fn insert(&self, sql: &str, bindings: &[Value]) -> OrmResult<i64> {
        let started = Instant::now();
        match self.driver.insert(sql, bindings).await {
            Ok(id) => {
                tracing::debug!(
                    sql,
                    bindings = bindings.len(),
                    id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "insert"
                );
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(sql, error = %e, "insert failed");
                Err(OrmError::query(e.message(), sql, bindings))
            }
        }
    }

    /// Run an update/delete/DDL statement, returning the affected row count.
    pub async fn execute(&self, sql: &str, bindings: &[Value]) -> OrmResult<u64> {
        let started = Instant::now();
        match self.driver.execute(sql, bindings).await {
            Ok(affected) => {
                tracing::debug!(
                    sql,
                    bindings = bindings.len(),
                    affected,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "execute"
                );
                Ok(affected)
            }
            Err(e) => {
                tracing::warn!(sql, error = %e, "execute failed");
                Err(OrmError::query(e.message(), sql, bindings))
            }
        }
    }

    /// Current nesting depth; zero means no transaction is open.
    pub fn transaction_depth(&self) -> u32 {
        self.depth.load(Ordering::SeqCst)
    }

    /// Begin a transaction. Only the outermost call opens a physical one;
    /// inner calls just bump the counter.
    pub async fn begin_transaction(&self) -> OrmResult<()> {
        let prev = self.depth.fetch_add(1, Ordering::SeqCst);
        if prev == 0 {
            if let Err(e) = self.driver.begin().await {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                return Err(OrmError::driver(e.message()));
            }
            tracing::debug!("begin transaction");
        }
        Ok(())
    }

    /// Commit: physical only when leaving the outermost level. A commit
    /// with no open transaction is a no-op.
    pub async fn commit(&self) -> OrmResult<()> {
        let depth = self.depth.load(Ordering::SeqCst);
        if depth == 0 {
            return Ok(());
        }
        if depth == 1 {
            self.driver
                .commit()
                .await
                .map_err(|e| OrmError::driver(e.message()))?;
            tracing::debug!("commit transaction");
        }
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    /// Roll back the whole transaction regardless of nesting depth. Inner
    /// scopes cannot partially roll back, so the counter resets to zero and
    /// the physical rollback is issued once.
    pub async fn rollback(&self) -> OrmResult<()> {
        let prev = self.depth.swap(0, Ordering::SeqCst);
        if prev > 0 {
            self.driver
                .rollback()
                .await
                .map_err(|e| OrmError::driver(e.message()))?;
            tracing::debug!("rollback transaction");
        }
        Ok(())
    }

    /// Run a closure inside a transaction: commit on `Ok`, roll back on
    /// `Err` and re-raise the original error. A rollback failure is folded
    /// into the returned error so neither is lost.
    pub async fn transaction<T>(
        &self,
        f: impl AsyncFnOnce(&Self) -> OrmResult<T>,
    ) -> OrmResult<T> {
        self.begin_transaction().await?;
        match f(self).await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = self.rollback().await {
                    return Err(OrmError::other(format!("{e} (rollback failed: {rb})")));
                }
                Err(e)
            }
        }
    }
}
