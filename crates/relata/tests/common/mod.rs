//! Shared test support: an in-memory driver that logs every statement and
//! replays queued responses.
#![allow(dead_code)]

use relata::{Dialect, Driver, DriverError, DriverResult, Row, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One canned reply for the next statement of the matching kind.
pub enum FakeResponse {
    Rows(Vec<Row>),
    InsertId(i64),
    Affected(u64),
    Fail(&'static str),
}

/// Records `(sql, bindings)` for every call and pops responses in FIFO
/// order. With no queued response, selects return no rows and writes
/// report one affected row / insert id 1.
#[derive(Default)]
pub struct FakeDriver {
    log: Mutex<Vec<(String, Vec<Value>)>>,
    responses: Mutex<VecDeque<FakeResponse>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, response: FakeResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn log(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().unwrap().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    fn record(&self, sql: &str, bindings: &[Value]) {
        self.log
            .lock()
            .unwrap()
            .push((sql.to_string(), bindings.to_vec()));
    }

    fn pop(&self) -> Option<FakeResponse> {
        self.responses.lock().unwrap().pop_front()
    }
}

impl Driver for FakeDriver {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn select(&self, sql: &str, bindings: &[Value]) -> DriverResult<Vec<Row>> {
        self.record(sql, bindings);
        match self.pop() {
            Some(FakeResponse::Rows(rows)) => Ok(rows),
            Some(FakeResponse::Fail(message)) => Err(DriverError::new(message)),
            _ => Ok(Vec::new()),
        }
    }

    async fn insert(&self, sql: &str, bindings: &[Value]) -> DriverResult<i64> {
        self.record(sql, bindings);
        match self.pop() {
            Some(FakeResponse::InsertId(id)) => Ok(id),
            Some(FakeResponse::Fail(message)) => Err(DriverError::new(message)),
            _ => Ok(1),
        }
    }

    async fn execute(&self, sql: &str, bindings: &[Value]) -> DriverResult<u64> {
        self.record(sql, bindings);
        match self.pop() {
            Some(FakeResponse::Affected(n)) => Ok(n),
            Some(FakeResponse::Fail(message)) => Err(DriverError::new(message)),
            _ => Ok(1),
        }
    }

    async fn begin(&self) -> DriverResult<()> {
        self.record("begin", &[]);
        Ok(())
    }

    async fn commit(&self) -> DriverResult<()> {
        self.record("commit", &[]);
        Ok(())
    }

    async fn rollback(&self) -> DriverResult<()> {
        self.record("rollback", &[]);
        Ok(())
    }
}

/// Build a row from column/value pairs.
pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(col, val)| (col.to_string(), val.clone()))
        .collect()
}
