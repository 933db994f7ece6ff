//! Structured query descriptor and fluent builder.
//!
//! [`Query`] records structured clause data instead of SQL strings; the
//! [`Grammar`](crate::grammar::Grammar) turns it into dialect SQL plus an
//! ordered binding list. Builder methods consume and return `self` for
//! chaining; methods that can reject their input at the call site return
//! `OrmResult<Self>` instead.

use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::{OrmError, OrmResult};
use crate::grammar::Grammar;
use crate::row::Row;
use crate::value::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Boolean connector between where/having clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

impl Boolean {
    pub fn as_sql(self) -> &'static str {
        match self {
            Boolean::And => "and",
            Boolean::Or => "or",
        }
    }
}

/// Comparison operator for where/having/join conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
    ILike,
}

impl Op {
    pub fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Like => "like",
            Op::NotLike => "not like",
            Op::ILike => "ilike",
        }
    }
}

impl FromStr for Op {
    type Err = OrmError;

    fn from_str(s: &str) -> OrmResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "=" => Ok(Op::Eq),
            "<>" | "!=" => Ok(Op::Ne),
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Lte),
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Gte),
            "like" => Ok(Op::Like),
            "not like" => Ok(Op::NotLike),
            "ilike" => Ok(Op::ILike),
            other => Err(OrmError::InvalidOperator(other.to_string())),
        }
    }
}

/// Sort direction for order-by clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

impl FromStr for Direction {
    type Err = OrmError;

    fn from_str(s: &str) -> OrmResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(OrmError::InvalidDirection(other.to_string())),
        }
    }
}

/// Aggregate spec: `{function}({columns}) as aggregate`.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
        }
    }
}

/// One ON condition inside a join: column-to-column comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOn {
    pub first: String,
    pub op: Op,
    pub second: String,
    pub boolean: Boolean,
}

/// A join clause with its ordered ON conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub ons: Vec<JoinOn>,
}

impl Join {
    pub fn new(kind: JoinKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            ons: Vec::new(),
        }
    }

    pub fn on(mut self, first: impl Into<String>, op: Op, second: impl Into<String>) -> Self {
        self.ons.push(JoinOn {
            first: first.into(),
            op,
            second: second.into(),
            boolean: Boolean::And,
        });
        self
    }

    pub fn or_on(mut self, first: impl Into<String>, op: Op, second: impl Into<String>) -> Self {
        self.ons.push(JoinOn {
            first: first.into(),
            op,
            second: second.into(),
            boolean: Boolean::Or,
        });
        self
    }
}

/// Where-clause variants. Every variant's values are emitted as placeholders
/// in the position the clause occupies.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    Basic {
        column: String,
        op: Op,
        value: Value,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
    },
    Between {
        column: String,
        low: Value,
        high: Value,
    },
    Nested {
        query: Box<Query>,
    },
    Sub {
        column: String,
        op: Op,
        query: Box<Query>,
    },
    In {
        column: String,
        values: Vec<Value>,
        not: bool,
    },
    InSub {
        column: String,
        query: Box<Query>,
        not: bool,
    },
    Null {
        column: String,
        not: bool,
    },
    Exists {
        query: Box<Query>,
        not: bool,
    },
}

/// A where clause tagged with its connector. The tree always stores the
/// syntactic connector; the compiler strips the first clause's one.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    pub clause: WhereClause,
    pub boolean: Boolean,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Having {
    Basic {
        column: String,
        op: Op,
        value: Value,
        boolean: Boolean,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
        boolean: Boolean,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    By { column: String, direction: Direction },
    Raw { sql: String, bindings: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    pub query: Box<Query>,
    pub all: bool,
}

/// Structured, dialect-neutral representation of a single statement's intent.
///
/// Created fresh per logical query and discarded after execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub(crate) table: String,
    pub(crate) columns: Vec<String>,
    pub(crate) aggregate: Option<Aggregate>,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<Join>,
    pub(crate) wheres: Vec<Where>,
    pub(crate) groups: Vec<String>,
    pub(crate) havings: Vec<Having>,
    pub(crate) orders: Vec<Order>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) unions: Vec<Union>,
}

impl Query {
    /// Start a query against a table.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Set (or replace) the target table.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    // ==================== SELECT columns ====================

    /// Replace the selected column list.
    pub fn select<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append selected columns.
    pub fn add_select<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== JOIN ====================

    /// Add an INNER JOIN with a single ON condition.
    pub fn join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: Op,
        second: impl Into<String>,
    ) -> Self {
        self.join_with(JoinKind::Inner, table, |j| j.on(first, op, second))
    }

    /// Add a LEFT JOIN with a single ON condition.
    pub fn left_join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: Op,
        second: impl Into<String>,
    ) -> Self {
        self.join_with(JoinKind::Left, table, |j| j.on(first, op, second))
    }

    /// Add a join built through a closure, for multi-condition ON lists.
    pub fn join_with(
        mut self,
        kind: JoinKind,
        table: impl Into<String>,
        f: impl FnOnce(Join) -> Join,
    ) -> Self {
        self.joins.push(f(Join::new(kind, table)));
        self
    }

    // ==================== WHERE ====================

    fn push_where(mut self, clause: WhereClause, boolean: Boolean) -> Self {
        self.wheres.push(Where { clause, boolean });
        self
    }

    /// Add `column = value`. A `Null` value rewrites to an IS NULL test.
    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null() {
            return self.where_null(column);
        }
        self.push_where(
            WhereClause::Basic {
                column: column.into(),
                op: Op::Eq,
                value,
            },
            Boolean::And,
        )
    }

    /// `or` variant of [`Query::where_eq`].
    pub fn or_where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null() {
            return self.or_where_null(column);
        }
        self.push_where(
            WhereClause::Basic {
                column: column.into(),
                op: Op::Eq,
                value,
            },
            Boolean::Or,
        )
    }

    /// Add a comparison with an explicit operator.
    ///
    /// A `Null` value is only meaningful with `Op::Eq` (rewritten to IS NULL);
    /// any other operator with a null value is rejected here, at the call
    /// that introduced it.
    pub fn where_op(
        self,
        column: impl Into<String>,
        op: Op,
        value: impl Into<Value>,
    ) -> OrmResult<Self> {
        self.where_op_boolean(column, op, value, Boolean::And)
    }

    /// `or` variant of [`Query::where_op`].
    pub fn or_where_op(
        self,
        column: impl Into<String>,
        op: Op,
        value: impl Into<Value>,
    ) -> OrmResult<Self> {
        self.where_op_boolean(column, op, value, Boolean::Or)
    }

    fn where_op_boolean(
        self,
        column: impl Into<String>,
        op: Op,
        value: impl Into<Value>,
        boolean: Boolean,
    ) -> OrmResult<Self> {
        let column = column.into();
        let value = value.into();
        if value.is_null() {
            if op != Op::Eq {
                return Err(OrmError::invalid_argument(format!(
                    "operator '{}' requires a non-null value for column '{column}'",
                    op.as_sql()
                )));
            }
            return Ok(self.push_where(WhereClause::Null { column, not: false }, boolean));
        }
        Ok(self.push_where(WhereClause::Basic { column, op, value }, boolean))
    }

    /// Add a raw SQL fragment with its own bindings.
    pub fn where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.push_where(
            WhereClause::Raw {
                sql: sql.into(),
                bindings,
            },
            Boolean::And,
        )
    }

    pub fn or_where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.push_where(
            WhereClause::Raw {
                sql: sql.into(),
                bindings,
            },
            Boolean::Or,
        )
    }

    pub fn where_between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_where(
            WhereClause::Between {
                column: column.into(),
                low: low.into(),
                high: high.into(),
            },
            Boolean::And,
        )
    }

    pub fn or_where_between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_where(
            WhereClause::Between {
                column: column.into(),
                low: low.into(),
                high: high.into(),
            },
            Boolean::Or,
        )
    }

    /// Group boolean expressions in parentheses. The closure receives a fresh
    /// child query sharing this query's table; its where tree is wrapped as a
    /// single nested clause.
    pub fn where_nested(self, f: impl FnOnce(Query) -> Query) -> Self {
        self.where_nested_boolean(f, Boolean::And)
    }

    pub fn or_where_nested(self, f: impl FnOnce(Query) -> Query) -> Self {
        self.where_nested_boolean(f, Boolean::Or)
    }

    fn where_nested_boolean(self, f: impl FnOnce(Query) -> Query, boolean: Boolean) -> Self {
        let child = f(Query::table(self.table.clone()));
        if child.wheres.is_empty() {
            return self;
        }
        self.push_where(
            WhereClause::Nested {
                query: Box::new(child),
            },
            boolean,
        )
    }

    /// Compare a column against a closure-built sub-select.
    pub fn where_sub(
        self,
        column: impl Into<String>,
        op: Op,
        f: impl FnOnce(Query) -> Query,
    ) -> Self {
        let query = Box::new(f(Query::default()));
        self.push_where(
            WhereClause::Sub {
                column: column.into(),
                op,
                query,
            },
            Boolean::And,
        )
    }

    pub fn where_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.where_in_boolean(column, values, Boolean::And, false)
    }

    pub fn or_where_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.where_in_boolean(column, values, Boolean::Or, false)
    }

    pub fn where_not_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.where_in_boolean(column, values, Boolean::And, true)
    }

    pub fn or_where_not_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.where_in_boolean(column, values, Boolean::Or, true)
    }

    fn where_in_boolean<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
        boolean: Boolean,
        not: bool,
    ) -> Self {
        self.push_where(
            WhereClause::In {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
                not,
            },
            boolean,
        )
    }

    /// IN against a closure-built sub-select; the sub-query's bindings merge
    /// in clause position.
    pub fn where_in_query(self, column: impl Into<String>, f: impl FnOnce(Query) -> Query) -> Self {
        self.where_in_query_boolean(column, f, Boolean::And, false)
    }

    pub fn where_not_in_query(
        self,
        column: impl Into<String>,
        f: impl FnOnce(Query) -> Query,
    ) -> Self {
        self.where_in_query_boolean(column, f, Boolean::And, true)
    }

    fn where_in_query_boolean(
        self,
        column: impl Into<String>,
        f: impl FnOnce(Query) -> Query,
        boolean: Boolean,
        not: bool,
    ) -> Self {
        let query = Box::new(f(Query::default()));
        self.push_where(
            WhereClause::InSub {
                column: column.into(),
                query,
                not,
            },
            boolean,
        )
    }

    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.push_where(
            WhereClause::Null {
                column: column.into(),
                not: false,
            },
            Boolean::And,
        )
    }

    pub fn or_where_null(self, column: impl Into<String>) -> Self {
        self.push_where(
            WhereClause::Null {
                column: column.into(),
                not: false,
            },
            Boolean::Or,
        )
    }

    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.push_where(
            WhereClause::Null {
                column: column.into(),
                not: true,
            },
            Boolean::And,
        )
    }

    pub fn or_where_not_null(self, column: impl Into<String>) -> Self {
        self.push_where(
            WhereClause::Null {
                column: column.into(),
                not: true,
            },
            Boolean::Or,
        )
    }

    pub fn where_exists(self, f: impl FnOnce(Query) -> Query) -> Self {
        self.where_exists_boolean(f, Boolean::And, false)
    }

    pub fn where_not_exists(self, f: impl FnOnce(Query) -> Query) -> Self {
        self.where_exists_boolean(f, Boolean::And, true)
    }

    pub fn or_where_exists(self, f: impl FnOnce(Query) -> Query) -> Self {
        self.where_exists_boolean(f, Boolean::Or, false)
    }

    pub fn or_where_not_exists(self, f: impl FnOnce(Query) -> Query) -> Self {
        self.where_exists_boolean(f, Boolean::Or, true)
    }

    fn where_exists_boolean(
        self,
        f: impl FnOnce(Query) -> Query,
        boolean: Boolean,
        not: bool,
    ) -> Self {
        let query = Box::new(f(Query::default()));
        self.push_where(WhereClause::Exists { query, not }, boolean)
    }

    // ==================== GROUP / HAVING / ORDER ====================

    pub fn group_by<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(mut self, column: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        self.havings.push(Having::Basic {
            column: column.into(),
            op,
            value: value.into(),
            boolean: Boolean::And,
        });
        self
    }

    pub fn having_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.havings.push(Having::Raw {
            sql: sql.into(),
            bindings,
            boolean: Boolean::And,
        });
        self
    }

    pub fn or_having_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.havings.push(Having::Raw {
            sql: sql.into(),
            bindings,
            boolean: Boolean::Or,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(Order::By {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn order_by_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.orders.push(Order::Raw {
            sql: sql.into(),
            bindings,
        });
        self
    }

    // ==================== LIMIT / OFFSET / UNION ====================

    /// Set LIMIT. Non-positive values are ignored.
    pub fn limit(mut self, value: u64) -> Self {
        if value > 0 {
            self.limit = Some(value);
        }
        self
    }

    pub fn offset(mut self, value: u64) -> Self {
        self.offset = Some(value);
        self
    }

    /// Alias for [`Query::limit`].
    pub fn take(self, value: u64) -> Self {
        self.limit(value)
    }

    /// Alias for [`Query::offset`].
    pub fn skip(self, value: u64) -> Self {
        self.offset(value)
    }

    pub fn union(mut self, query: Query) -> Self {
        self.unions.push(Union {
            query: Box::new(query),
            all: false,
        });
        self
    }

    pub fn union_all(mut self, query: Query) -> Self {
        self.unions.push(Union {
            query: Box::new(query),
            all: true,
        });
        self
    }

    // ==================== Compilation ====================

    /// Compile the select form of this descriptor.
    pub fn to_sql(&self, grammar: &Grammar) -> String {
        grammar.compile_select(self)
    }

    /// The ordered binding list for the select form.
    ///
    /// Collected by walking the descriptor in exactly the grammar's emission
    /// order (wheres, havings, orders, unions), so bindings always co-index
    /// with emitted placeholders.
    pub fn bindings(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.collect_select_bindings(&mut out);
        out
    }

    pub(crate) fn collect_select_bindings(&self, out: &mut Vec<Value>) {
        self.collect_where_bindings(out);
        self.collect_having_bindings(out);
        self.collect_order_bindings(out);
        for union in &self.unions {
            union.query.collect_select_bindings(out);
        }
    }

    pub(crate) fn collect_where_bindings(&self, out: &mut Vec<Value>) {
        for w in &self.wheres {
            match &w.clause {
                WhereClause::Basic { value, .. } => out.push(value.clone()),
                WhereClause::Raw { bindings, .. } => out.extend(bindings.iter().cloned()),
                WhereClause::Between { low, high, .. } => {
                    out.push(low.clone());
                    out.push(high.clone());
                }
                WhereClause::Nested { query } => query.collect_where_bindings(out),
                WhereClause::Sub { query, .. }
                | WhereClause::InSub { query, .. }
                | WhereClause::Exists { query, .. } => query.collect_select_bindings(out),
                WhereClause::In { values, .. } => out.extend(values.iter().cloned()),
                WhereClause::Null { .. } => {}
            }
        }
    }

    fn collect_having_bindings(&self, out: &mut Vec<Value>) {
        for h in &self.havings {
            match h {
                Having::Basic { value, .. } => out.push(value.clone()),
                Having::Raw { bindings, .. } => out.extend(bindings.iter().cloned()),
            }
        }
    }

    pub(crate) fn collect_order_bindings(&self, out: &mut Vec<Value>) {
        for o in &self.orders {
            if let Order::Raw { bindings, .. } = o {
                out.extend(bindings.iter().cloned());
            }
        }
    }

    // ==================== Execution ====================

    /// Run the select and return raw rows.
    pub async fn get<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<Vec<Row>> {
        let grammar = conn.grammar();
        conn.select(&self.to_sql(&grammar), &self.bindings()).await
    }

    /// Run the select limited to one row.
    pub async fn first<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<Option<Row>> {
        let limited = self.clone().take(1);
        Ok(limited.get(conn).await?.into_iter().next())
    }

    /// Fetch a row by `id` column.
    pub async fn find<D: Driver>(
        &self,
        conn: &Connection<D>,
        id: impl Into<Value>,
    ) -> OrmResult<Option<Row>> {
        self.clone().where_eq("id", id).first(conn).await
    }

    /// First row's value for one column.
    pub async fn pluck<D: Driver>(
        &self,
        conn: &Connection<D>,
        column: &str,
    ) -> OrmResult<Option<Value>> {
        let row = self.clone().select([column]).first(conn).await?;
        Ok(row.and_then(|r| r.get(column).cloned()))
    }

    pub async fn exists<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<bool> {
        Ok(self.count(conn).await? > 0)
    }

    /// `count(*)` over the current descriptor.
    pub async fn count<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<i64> {
        let value = self.aggregate(conn, "count", &["*"]).await?;
        Ok(value.as_int().unwrap_or(0))
    }

    pub async fn min<D: Driver>(&self, conn: &Connection<D>, column: &str) -> OrmResult<Value> {
        self.aggregate(conn, "min", &[column]).await
    }

    pub async fn max<D: Driver>(&self, conn: &Connection<D>, column: &str) -> OrmResult<Value> {
        self.aggregate(conn, "max", &[column]).await
    }

    pub async fn sum<D: Driver>(&self, conn: &Connection<D>, column: &str) -> OrmResult<Value> {
        self.aggregate(conn, "sum", &[column]).await
    }

    pub async fn avg<D: Driver>(&self, conn: &Connection<D>, column: &str) -> OrmResult<Value> {
        self.aggregate(conn, "avg", &[column]).await
    }

    /// Execute an aggregate function and extract the `aggregate` column of
    /// row 0. Runs on a clone so the descriptor stays reusable afterwards.
    pub async fn aggregate<D: Driver>(
        &self,
        conn: &Connection<D>,
        function: &str,
        columns: &[&str],
    ) -> OrmResult<Value> {
        let mut query = self.clone();
        query.aggregate = Some(Aggregate {
            function: function.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        query.columns.clear();
        let rows = query.get(conn).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.get("aggregate").cloned())
            .unwrap_or(Value::Null))
    }

    /// Insert one or more rows. All rows must share the first row's column
    /// set; heterogeneous rows are rejected before any SQL is built.
    pub async fn insert<D: Driver>(
        &self,
        conn: &Connection<D>,
        rows: &[BTreeMap<String, Value>],
    ) -> OrmResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let grammar = conn.grammar();
        let sql = grammar.compile_insert(self, rows)?;
        conn.execute(&sql, &Self::insert_bindings(rows)).await
    }

    /// Insert a single row and return the driver's last-insert-id.
    pub async fn insert_get_id<D: Driver>(
        &self,
        conn: &Connection<D>,
        row: &BTreeMap<String, Value>,
    ) -> OrmResult<i64> {
        let grammar = conn.grammar();
        let rows = std::slice::from_ref(row);
        let sql = grammar.compile_insert(self, rows)?;
        conn.insert(&sql, &Self::insert_bindings(rows)).await
    }

    fn insert_bindings(rows: &[BTreeMap<String, Value>]) -> Vec<Value> {
        // BTreeMap iteration matches the column order the grammar emits.
        rows.iter()
            .flat_map(|row| row.values().cloned())
            .collect()
    }

    /// Update matching rows; the where tree is appended verbatim.
    pub async fn update<D: Driver>(
        &self,
        conn: &Connection<D>,
        values: &BTreeMap<String, Value>,
    ) -> OrmResult<u64> {
        let grammar = conn.grammar();
        let sql = grammar.compile_update(self, values);
        let mut bindings: Vec<Value> = values.values().cloned().collect();
        self.collect_where_bindings(&mut bindings);
        self.collect_order_bindings(&mut bindings);
        conn.execute(&sql, &bindings).await
    }

    /// Delete matching rows, optionally keyed by `id`.
    pub async fn delete<D: Driver>(
        &self,
        conn: &Connection<D>,
        id: Option<Value>,
    ) -> OrmResult<u64> {
        let query = match id {
            Some(id) => self.clone().where_eq("id", id),
            None => self.clone(),
        };
        let grammar = conn.grammar();
        let sql = grammar.compile_delete(&query);
        let mut bindings = Vec::new();
        query.collect_where_bindings(&mut bindings);
        conn.execute(&sql, &bindings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Dialect, Grammar};

    fn mysql() -> Grammar {
        Grammar::new(Dialect::MySql)
    }

    #[test]
    fn operator_parsing() {
        assert_eq!("=".parse::<Op>().unwrap(), Op::Eq);
        assert_eq!("!=".parse::<Op>().unwrap(), Op::Ne);
        assert_eq!("not like".parse::<Op>().unwrap(), Op::NotLike);
        assert!(matches!(
            "<=>".parse::<Op>(),
            Err(OrmError::InvalidOperator(_))
        ));
    }

    #[test]
    fn direction_parsing() {
        assert_eq!("ASC".parse::<Direction>().unwrap(), Direction::Asc);
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(OrmError::InvalidDirection(_))
        ));
    }

    #[test]
    fn null_value_rewrites_to_is_null() {
        let q = Query::table("users").where_eq("deleted_at", Value::Null);
        assert_eq!(
            q.to_sql(&mysql()),
            "select * from `users` where `deleted_at` is null"
        );
        assert!(q.bindings().is_empty());

        let q = Query::table("users")
            .where_op("deleted_at", Op::Eq, Value::Null)
            .unwrap();
        assert_eq!(
            q.to_sql(&mysql()),
            "select * from `users` where `deleted_at` is null"
        );
    }

    #[test]
    fn null_value_with_other_operator_is_rejected() {
        let err = Query::table("users")
            .where_op("deleted_at", Op::Ne, Value::Null)
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn binding_order_matches_clause_order() {
        let q = Query::table("users")
            .where_eq("name", "ada")
            .where_in("id", [1_i64, 2, 3])
            .where_between("age", 20_i64, 30_i64);
        assert_eq!(
            q.bindings(),
            vec![
                Value::Text("ada".into()),
                Value::Int(1),
                Value::Int(2),
                Value::Int(3),
                Value::Int(20),
                Value::Int(30),
            ]
        );
        let sql = q.to_sql(&mysql());
        assert_eq!(sql.matches('?').count(), q.bindings().len());
    }

    #[test]
    fn nested_boolean_scenario() {
        // where id = 1 and (id in (1,2,3) or (status in ('active')))
        let q = Query::table("users")
            .where_op("id", Op::Eq, 1_i64)
            .unwrap()
            .where_nested(|q| {
                q.where_in("id", [1_i64, 2, 3])
                    .or_where_nested(|q| q.or_where_in("status", ["active"]))
            });
        assert_eq!(
            q.to_sql(&mysql()),
            "select * from `users` where `id` = ? and (`id` in (?, ?, ?) or (`status` in (?)))"
        );
        assert_eq!(
            q.bindings(),
            vec![
                Value::Int(1),
                Value::Int(1),
                Value::Int(2),
                Value::Int(3),
                Value::Text("active".into()),
            ]
        );
    }

    #[test]
    fn empty_nested_closure_adds_nothing() {
        let q = Query::table("users").where_nested(|q| q);
        assert_eq!(q.to_sql(&mysql()), "select * from `users`");
    }

    #[test]
    fn where_in_subquery_merges_bindings_in_position() {
        let q = Query::table("users")
            .where_eq("active", 1_i64)
            .where_in_query("id", |q| {
                q.from("posts")
                    .select(["user_id"])
                    .where_eq("status", "published")
            });
        assert_eq!(
            q.to_sql(&mysql()),
            "select * from `users` where `active` = ? and `id` in (select `user_id` from `posts` where `status` = ?)"
        );
        assert_eq!(
            q.bindings(),
            vec![Value::Int(1), Value::Text("published".into())]
        );
    }

    #[test]
    fn limit_zero_is_ignored() {
        let q = Query::table("users").limit(0);
        assert_eq!(q.to_sql(&mysql()), "select * from `users`");
    }

    #[test]
    fn union_bindings_follow_parent() {
        let q = Query::table("users")
            .where_eq("role", "admin")
            .union_all(Query::table("archived_users").where_eq("role", "admin"));
        assert_eq!(
            q.to_sql(&mysql()),
            "select * from `users` where `role` = ? union all select * from `archived_users` where `role` = ?"
        );
        assert_eq!(
            q.bindings(),
            vec![Value::Text("admin".into()), Value::Text("admin".into())]
        );
    }
}
