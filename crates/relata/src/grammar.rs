//! Dialect grammars: turn a [`Query`] descriptor into SQL text.
//!
//! Keywords are emitted lowercase. Placeholders and identifier quoting are
//! the only dialect differences: MySQL uses backticks and positional `?`,
//! Postgres uses double quotes and numbered `$n`. The `$n` counter threads
//! through every compile helper so sub-queries keep numbering monotonic.

use crate::error::{OrmError, OrmResult};
use crate::query::{Having, Join, Order, Query, Where, WhereClause};
use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres => '"',
        }
    }
}

/// SQL compiler for one dialect. Cheap to construct, carries no state
/// between statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grammar {
    dialect: Dialect,
}

impl Grammar {
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub const fn mysql() -> Self {
        Self::new(Dialect::MySql)
    }

    pub const fn postgres() -> Self {
        Self::new(Dialect::Postgres)
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn placeholder(&self, n: &mut usize) -> String {
        *n += 1;
        match self.dialect {
            Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${n}"),
        }
    }

    /// Quote an identifier: handles `table.column` paths, `alias` splitting
    /// on " as ", and leaves `*` bare.
    pub fn wrap(&self, identifier: &str) -> String {
        if let Some(pos) = identifier.to_ascii_lowercase().find(" as ") {
            let (name, alias) = (&identifier[..pos], &identifier[pos + 4..]);
            return format!("{} as {}", self.wrap(name), self.wrap_segment(alias));
        }
        identifier
            .split('.')
            .map(|seg| self.wrap_segment(seg))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn wrap_segment(&self, segment: &str) -> String {
        if segment == "*" {
            return segment.to_string();
        }
        let q = self.dialect.quote_char();
        let escaped = segment.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    fn wrap_list(&self, identifiers: &[String]) -> String {
        identifiers
            .iter()
            .map(|c| self.wrap(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ==================== SELECT ====================

    pub fn compile_select(&self, query: &Query) -> String {
        let mut n = 0;
        self.compile_select_with(query, &mut n)
    }

    fn compile_select_with(&self, query: &Query, n: &mut usize) -> String {
        let mut parts = Vec::new();
        parts.push(self.compile_columns(query));
        parts.push(format!("from {}", self.wrap(&query.table)));
        if !query.joins.is_empty() {
            parts.push(self.compile_joins(&query.joins));
        }
        if !query.wheres.is_empty() {
            parts.push(format!("where {}", self.wheres_body(&query.wheres, n)));
        }
        if !query.groups.is_empty() {
            parts.push(format!("group by {}", self.wrap_list(&query.groups)));
        }
        if !query.havings.is_empty() {
            parts.push(self.compile_havings(&query.havings, n));
        }
        if !query.orders.is_empty() {
            parts.push(self.compile_orders(&query.orders, n));
        }
        if let Some(limit) = query.limit {
            parts.push(format!("limit {limit}"));
        }
        if let Some(offset) = query.offset {
            parts.push(format!("offset {offset}"));
        }
        for union in &query.unions {
            let keyword = if union.all { "union all" } else { "union" };
            parts.push(format!(
                "{keyword} {}",
                self.compile_select_with(&union.query, n)
            ));
        }
        parts.join(" ")
    }

    fn compile_columns(&self, query: &Query) -> String {
        let distinct = if query.distinct { "distinct " } else { "" };
        if let Some(agg) = &query.aggregate {
            let columns = if agg.columns.is_empty() {
                "*".to_string()
            } else {
                self.wrap_list(&agg.columns)
            };
            return format!("select {}({distinct}{columns}) as aggregate", agg.function);
        }
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            self.wrap_list(&query.columns)
        };
        format!("select {distinct}{columns}")
    }

    fn compile_joins(&self, joins: &[Join]) -> String {
        joins
            .iter()
            .map(|join| {
                let ons = join
                    .ons
                    .iter()
                    .map(|on| {
                        format!(
                            "{} {} {} {}",
                            on.boolean.as_sql(),
                            self.wrap(&on.first),
                            on.op.as_sql(),
                            self.wrap(&on.second)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                format!(
                    "{} join {} on {}",
                    join.kind.as_sql(),
                    self.wrap(&join.table),
                    strip_leading_connector(&ons)
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Emit the where clauses without the `where ` keyword, first connector
    /// stripped. Nested groups reuse this body directly.
    fn wheres_body(&self, wheres: &[Where], n: &mut usize) -> String {
        let joined = wheres
            .iter()
            .map(|w| format!("{} {}", w.boolean.as_sql(), self.compile_where(&w.clause, n)))
            .collect::<Vec<_>>()
            .join(" ");
        strip_leading_connector(&joined).to_string()
    }

    fn compile_where(&self, clause: &WhereClause, n: &mut usize) -> String {
        match clause {
            WhereClause::Basic { column, op, .. } => {
                format!(
                    "{} {} {}",
                    self.wrap(column),
                    op.as_sql(),
                    self.placeholder(n)
                )
            }
            WhereClause::Raw { sql, bindings } => {
                // Raw fragments carry literal `?`; burn counter slots so
                // later Postgres placeholders stay aligned.
                *n += bindings.len();
                sql.clone()
            }
            WhereClause::Between { column, .. } => {
                let low = self.placeholder(n);
                let high = self.placeholder(n);
                format!("{} between {low} and {high}", self.wrap(column))
            }
            WhereClause::Nested { query } => {
                format!("({})", self.wheres_body(&query.wheres, n))
            }
            WhereClause::Sub { column, op, query } => {
                format!(
                    "{} {} ({})",
                    self.wrap(column),
                    op.as_sql(),
                    self.compile_select_with(query, n)
                )
            }
            WhereClause::In {
                column,
                values,
                not,
            } => {
                let keyword = if *not { "not in" } else { "in" };
                let placeholders = values
                    .iter()
                    .map(|_| self.placeholder(n))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} {keyword} ({placeholders})", self.wrap(column))
            }
            WhereClause::InSub { column, query, not } => {
                let keyword = if *not { "not in" } else { "in" };
                format!(
                    "{} {keyword} ({})",
                    self.wrap(column),
                    self.compile_select_with(query, n)
                )
            }
            WhereClause::Null { column, not } => {
                let keyword = if *not { "is not null" } else { "is null" };
                format!("{} {keyword}", self.wrap(column))
            }
            WhereClause::Exists { query, not } => {
                let keyword = if *not { "not exists" } else { "exists" };
                format!("{keyword} ({})", self.compile_select_with(query, n))
            }
        }
    }

    fn compile_havings(&self, havings: &[Having], n: &mut usize) -> String {
        let joined = havings
            .iter()
            .map(|h| match h {
                Having::Basic {
                    column,
                    op,
                    boolean,
                    ..
                } => format!(
                    "{} {} {} {}",
                    boolean.as_sql(),
                    self.wrap(column),
                    op.as_sql(),
                    self.placeholder(n)
                ),
                Having::Raw {
                    sql,
                    bindings,
                    boolean,
                } => {
                    *n += bindings.len();
                    format!("{} {}", boolean.as_sql(), sql)
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!("having {}", strip_leading_connector(&joined))
    }

    fn compile_orders(&self, orders: &[Order], n: &mut usize) -> String {
        let items = orders
            .iter()
            .map(|o| match o {
                Order::By { column, direction } => {
                    format!("{} {}", self.wrap(column), direction.as_sql())
                }
                Order::Raw { sql, bindings } => {
                    *n += bindings.len();
                    sql.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("order by {items}")
    }

    // ==================== INSERT / UPDATE / DELETE ====================

    /// Compile a multi-row insert. The first row defines the column set;
    /// every other row must match it exactly.
    pub fn compile_insert(
        &self,
        query: &Query,
        rows: &[BTreeMap<String, Value>],
    ) -> OrmResult<String> {
        let first = rows
            .first()
            .ok_or_else(|| OrmError::invalid_argument("insert requires at least one row"))?;
        let columns: Vec<String> = first.keys().cloned().collect();
        for (i, row) in rows.iter().enumerate().skip(1) {
            if row.keys().ne(first.keys()) {
                return Err(OrmError::invalid_argument(format!(
                    "insert row {i} does not match the first row's columns"
                )));
            }
        }
        let mut n = 0;
        let groups = rows
            .iter()
            .map(|_| {
                let placeholders = columns
                    .iter()
                    .map(|_| self.placeholder(&mut n))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({placeholders})")
            })
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "insert into {} ({}) values {}",
            self.wrap(&query.table),
            self.wrap_list(&columns),
            groups
        ))
    }

    /// Compile an update of the given column/value pairs, constrained by the
    /// descriptor's joins, wheres, orders and limit.
    pub fn compile_update(&self, query: &Query, values: &BTreeMap<String, Value>) -> String {
        let mut n = 0;
        let sets = values
            .keys()
            .map(|col| format!("{} = {}", self.wrap(col), self.placeholder(&mut n)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("update {}", self.wrap(&query.table));
        if !query.joins.is_empty() {
            sql.push(' ');
            sql.push_str(&self.compile_joins(&query.joins));
        }
        sql.push_str(&format!(" set {sets}"));
        if !query.wheres.is_empty() {
            sql.push_str(&format!(" where {}", self.wheres_body(&query.wheres, &mut n)));
        }
        if !query.orders.is_empty() {
            sql.push(' ');
            sql.push_str(&self.compile_orders(&query.orders, &mut n));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" limit {limit}"));
        }
        sql
    }

    /// Compile a delete constrained by the descriptor's where tree.
    pub fn compile_delete(&self, query: &Query) -> String {
        let mut sql = format!("delete from {}", self.wrap(&query.table));
        if !query.wheres.is_empty() {
            let mut n = 0;
            sql.push_str(&format!(" where {}", self.wheres_body(&query.wheres, &mut n)));
        }
        sql
    }
}

/// Drop the `and ` / `or ` a clause list always starts with.
fn strip_leading_connector(sql: &str) -> &str {
    sql.strip_prefix("and ")
        .or_else(|| sql.strip_prefix("or "))
        .unwrap_or(sql)
}
