//! Model-aware query builder with the eager-load plan.
//!
//! [`ModelQuery`] wraps a [`Query`] scoped to one model's table and carries
//! an eager plan: a map of dot-paths to constraint closures. Requesting
//! `"posts.comments"` expands to entries for `"posts"` and
//! `"posts.comments"`; only top-level entries are loaded here, and the
//! nested remainder is forwarded into each relation's own query, which
//! recurses one level at a time.

use crate::collection::Collection;
use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::{OrmError, OrmResult};
use crate::grammar::Grammar;
use crate::model::{Entity, ModelDef};
use crate::query::{Direction, Op, Query};
use crate::relations::{Constrained, Relation};
use crate::value::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A user-supplied refinement applied to a relation's query during eager
/// loading. Shared so plans clone cheaply.
pub type Constraint = Arc<dyn Fn(Query) -> Query + Send + Sync>;

fn no_constraint() -> Constraint {
    Arc::new(|q| q)
}

/// A [`Query`] bound to a model definition, hydrating rows into entities
/// and running the eager plan after fetch.
#[derive(Clone)]
pub struct ModelQuery {
    model: &'static ModelDef,
    query: Query,
    eager: BTreeMap<String, Constraint>,
}

impl std::fmt::Debug for ModelQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelQuery")
            .field("model", &self.model.table)
            .field("query", &self.query)
            .field("eager", &self.eager.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelQuery {
    pub fn new(model: &'static ModelDef) -> Self {
        let query = Self {
            model,
            query: Query::table(model.table),
            eager: BTreeMap::new(),
        };
        query.with(model.eager)
    }

    pub fn model(&self) -> &'static ModelDef {
        self.model
    }

    /// Add eager paths. `"a.b.c"` registers `"a"`, `"a.b"` and `"a.b.c"`;
    /// existing entries (and their constraints) are kept.
    pub fn with<S: AsRef<str>>(mut self, paths: impl IntoIterator<Item = S>) -> Self {
        for path in paths {
            for prefix in dot_prefixes(path.as_ref()) {
                self.eager.entry(prefix).or_insert_with(no_constraint);
            }
        }
        self
    }

    /// Add one eager path with a constraint on its final segment. Prefix
    /// segments get pass-through entries; an existing constraint at the
    /// exact path is replaced.
    pub fn with_constraint(
        mut self,
        path: &str,
        f: impl Fn(Query) -> Query + Send + Sync + 'static,
    ) -> Self {
        for prefix in dot_prefixes(path) {
            self.eager.entry(prefix).or_insert_with(no_constraint);
        }
        self.eager.insert(path.to_string(), Arc::new(f));
        self
    }

    /// Merge an already-expanded plan, replacing on collision. Used when a
    /// parent query forwards nested paths into a relation's query.
    pub(crate) fn with_forwarded(mut self, paths: &BTreeMap<String, Constraint>) -> Self {
        for (path, constraint) in paths {
            self.eager.insert(path.clone(), Arc::clone(constraint));
        }
        self
    }

    pub fn eager_paths(&self) -> impl Iterator<Item = &str> {
        self.eager.keys().map(String::as_str)
    }

    /// Rewrite the underlying query descriptor.
    pub fn map_query(mut self, f: impl FnOnce(Query) -> Query) -> Self {
        self.query = f(self.query);
        self
    }

    // ==================== Delegated builder surface ====================

    pub fn select<C: Into<String>>(self, columns: impl IntoIterator<Item = C>) -> Self {
        self.map_query(|q| q.select(columns))
    }

    pub fn distinct(self) -> Self {
        self.map_query(Query::distinct)
    }

    pub fn join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: Op,
        second: impl Into<String>,
    ) -> Self {
        self.map_query(|q| q.join(table, first, op, second))
    }

    pub fn left_join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: Op,
        second: impl Into<String>,
    ) -> Self {
        self.map_query(|q| q.left_join(table, first, op, second))
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map_query(|q| q.where_eq(column, value))
    }

    pub fn or_where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map_query(|q| q.or_where_eq(column, value))
    }

    pub fn where_op(
        self,
        column: impl Into<String>,
        op: Op,
        value: impl Into<Value>,
    ) -> OrmResult<Self> {
        let Self {
            model,
            query,
            eager,
        } = self;
        Ok(Self {
            model,
            query: query.where_op(column, op, value)?,
            eager,
        })
    }

    pub fn where_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.map_query(|q| q.where_in(column, values))
    }

    pub fn where_not_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.map_query(|q| q.where_not_in(column, values))
    }

    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.map_query(|q| q.where_null(column))
    }

    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.map_query(|q| q.where_not_null(column))
    }

    pub fn where_between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.map_query(|q| q.where_between(column, low, high))
    }

    pub fn where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.map_query(|q| q.where_raw(sql, bindings))
    }

    pub fn where_nested(self, f: impl FnOnce(Query) -> Query) -> Self {
        self.map_query(|q| q.where_nested(f))
    }

    pub fn or_where_nested(self, f: impl FnOnce(Query) -> Query) -> Self {
        self.map_query(|q| q.or_where_nested(f))
    }

    pub fn group_by<C: Into<String>>(self, columns: impl IntoIterator<Item = C>) -> Self {
        self.map_query(|q| q.group_by(columns))
    }

    pub fn having(self, column: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        self.map_query(|q| q.having(column, op, value))
    }

    pub fn order_by(self, column: impl Into<String>, direction: Direction) -> Self {
        self.map_query(|q| q.order_by(column, direction))
    }

    pub fn order_by_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.map_query(|q| q.order_by_raw(sql, bindings))
    }

    pub fn limit(self, value: u64) -> Self {
        self.map_query(|q| q.limit(value))
    }

    pub fn offset(self, value: u64) -> Self {
        self.map_query(|q| q.offset(value))
    }

    pub fn take(self, value: u64) -> Self {
        self.limit(value)
    }

    pub fn skip(self, value: u64) -> Self {
        self.offset(value)
    }

    pub fn to_sql(&self, grammar: &Grammar) -> String {
        self.query.to_sql(grammar)
    }

    pub fn bindings(&self) -> Vec<Value> {
        self.query.bindings()
    }

    // ==================== Execution ====================

    /// Fetch, hydrate, and run the eager plan.
    ///
    /// Boxed because nested eager loading recurses through this method via
    /// each relation's own `ModelQuery`.
    pub fn get<'a, D: Driver>(
        &'a self,
        conn: &'a Connection<D>,
    ) -> BoxFuture<'a, OrmResult<Collection>> {
        Box::pin(async move {
            let rows = self.query.get(conn).await?;
            let mut entities: Collection = rows
                .into_iter()
                .map(|row| Entity::from_row(self.model, row))
                .collect();
            if !entities.is_empty() && !self.eager.is_empty() {
                self.eager_load(conn, &mut entities).await?;
            }
            Ok(entities)
        })
    }

    pub async fn first<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<Option<Entity>> {
        let limited = self.clone().take(1);
        Ok(limited.get(conn).await?.into_iter().next())
    }

    pub async fn find<D: Driver>(
        &self,
        conn: &Connection<D>,
        id: impl Into<Value>,
    ) -> OrmResult<Option<Entity>> {
        self.clone()
            .where_eq(self.model.primary_key, id)
            .first(conn)
            .await
    }

    pub async fn count<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<i64> {
        self.query.count(conn).await
    }

    pub async fn exists<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<bool> {
        self.query.exists(conn).await
    }

    pub async fn update<D: Driver>(
        &self,
        conn: &Connection<D>,
        values: &BTreeMap<String, Value>,
    ) -> OrmResult<u64> {
        self.query.update(conn, values).await
    }

    pub async fn delete<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<u64> {
        self.query.delete(conn, None).await
    }

    pub async fn insert<D: Driver>(
        &self,
        conn: &Connection<D>,
        rows: &[BTreeMap<String, Value>],
    ) -> OrmResult<u64> {
        self.query.insert(conn, rows).await
    }

    // ==================== Eager loading ====================

    /// Load every top-level entry of the eager plan onto the fetched set.
    async fn eager_load<D: Driver>(
        &self,
        conn: &Connection<D>,
        entities: &mut Collection,
    ) -> OrmResult<()> {
        for (name, constraint) in &self.eager {
            if !name.contains('.') {
                self.load_relation(conn, entities, name, constraint).await?;
            }
        }
        Ok(())
    }

    /// One relation's batch: constrain by all parent keys, forward the
    /// nested plan, fetch once, match back.
    async fn load_relation<D: Driver>(
        &self,
        conn: &Connection<D>,
        parents: &mut Collection,
        name: &str,
        constraint: &Constraint,
    ) -> OrmResult<()> {
        let def = self
            .model
            .relation(name)
            .ok_or_else(|| OrmError::unknown_relation(self.model.table, name))?;
        let mut relation = Relation::new(def, None, Constrained::No);
        relation.add_eager_constraints(parents);
        let constraint = Arc::clone(constraint);
        relation.constrain(move |q| (*constraint)(q));
        relation.with_nested(&self.nested_relations(name));
        relation.init_relation(parents, name);
        let results = relation.get(conn).await?;
        relation.match_results(parents, name, results);
        Ok(())
    }

    /// The plan entries strictly under `name.`, re-keyed relative to it.
    fn nested_relations(&self, name: &str) -> BTreeMap<String, Constraint> {
        let prefix = format!("{name}.");
        self.eager
            .iter()
            .filter_map(|(path, constraint)| {
                path.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), Arc::clone(constraint)))
            })
            .collect()
    }
}

/// Every dot-prefix of a path, shortest first: `"a.b.c"` yields `"a"`,
/// `"a.b"`, `"a.b.c"`.
fn dot_prefixes(path: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut end = 0;
    for segment in path.split('.') {
        end += segment.len();
        prefixes.push(path[..end].to_string());
        end += 1;
    }
    prefixes
}
