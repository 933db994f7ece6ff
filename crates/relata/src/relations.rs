//! Relation declarations and the runtime engine that loads them.
//!
//! [`RelationDef`] is the static declaration attached to a
//! [`ModelDef`](crate::model::ModelDef); [`Relation`] is the runtime object
//! built per load. Lazy access constrains by one parent key; eager loading
//! swaps that for a single `where in` over every parent's keys, then matches
//! results back through a hash dictionary, so N parents cost two queries.

use crate::builder::ModelQuery;
use crate::collection::Collection;
use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::{OrmError, OrmResult};
use crate::model::{Entity, ModelDef, Related};
use crate::query::Query;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
}

impl RelationKind {
    pub fn is_singular(self) -> bool {
        matches!(self, RelationKind::HasOne | RelationKind::BelongsTo)
    }
}

/// Static declaration of one relation between two models.
///
/// For `HasOne`/`HasMany` the foreign key lives on the related table; for
/// `BelongsTo` it lives on the declaring table.
pub struct RelationDef {
    pub name: &'static str,
    pub kind: RelationKind,
    pub related: &'static ModelDef,
    pub foreign_key: &'static str,
}

impl std::fmt::Debug for RelationDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("related", &self.related.table)
            .field("foreign_key", &self.foreign_key)
            .finish()
    }
}

impl RelationDef {
    pub const fn has_one(
        name: &'static str,
        related: &'static ModelDef,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::HasOne,
            related,
            foreign_key,
        }
    }

    pub const fn has_many(
        name: &'static str,
        related: &'static ModelDef,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::HasMany,
            related,
            foreign_key,
        }
    }

    pub const fn belongs_to(
        name: &'static str,
        related: &'static ModelDef,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::BelongsTo,
            related,
            foreign_key,
        }
    }
}

/// Whether a new [`Relation`] should immediately constrain its query to one
/// parent. Eager loading passes `No` and applies a batched `where in`
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constrained {
    Yes,
    No,
}

/// The runtime side of a relation: a query against the related model plus
/// the matching logic that attaches results to parents.
#[derive(Debug, Clone)]
pub struct Relation {
    kind: RelationKind,
    related: &'static ModelDef,
    foreign_key: &'static str,
    parent_key: Option<Value>,
    query: ModelQuery,
}

impl Relation {
    /// Build the relation's query. With `Constrained::Yes` and a parent row
    /// the single-parent constraint is applied now.
    pub fn new(
        def: &'static RelationDef,
        parent_row: Option<&Entity>,
        constrained: Constrained,
    ) -> Self {
        let parent_key = parent_row.map(|row| match def.kind {
            RelationKind::HasOne | RelationKind::HasMany => row.key(),
            RelationKind::BelongsTo => row.get(def.foreign_key).cloned().unwrap_or(Value::Null),
        });
        let mut relation = Self {
            kind: def.kind,
            related: def.related,
            foreign_key: def.foreign_key,
            parent_key,
            query: ModelQuery::new(def.related),
        };
        if constrained == Constrained::Yes {
            relation.add_constraints();
        }
        relation
    }

    /// The column the related rows are matched on, table-qualified for the
    /// query side.
    fn qualified_match_column(&self) -> String {
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                format!("{}.{}", self.related.table, self.foreign_key)
            }
            RelationKind::BelongsTo => {
                format!("{}.{}", self.related.table, self.related.primary_key)
            }
        }
    }

    fn edit_query(&mut self, f: impl FnOnce(ModelQuery) -> ModelQuery) {
        let query = std::mem::replace(&mut self.query, ModelQuery::new(self.related));
        self.query = f(query);
    }

    /// Constrain to the single parent captured at construction.
    fn add_constraints(&mut self) {
        if let Some(key) = self.parent_key.clone() {
            let column = self.qualified_match_column();
            self.edit_query(|q| q.map_query(|q| q.where_eq(column, key)));
        }
    }

    /// Replace the single-parent constraint with one `where in` over every
    /// parent's key. An all-null key set degenerates to an impossible match
    /// rather than an unconstrained scan.
    pub fn add_eager_constraints(&mut self, parents: &Collection) {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for parent in parents {
            let key = self.parent_match_key(parent);
            if !key.is_null() && seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            keys.push(Value::Int(0));
        }
        let column = self.qualified_match_column();
        self.edit_query(|q| q.map_query(|q| q.where_in(column, keys)));
    }

    /// The value on the parent side that pairs with a related row.
    fn parent_match_key(&self, parent: &Entity) -> Value {
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => parent.key(),
            RelationKind::BelongsTo => {
                parent.get(self.foreign_key).cloned().unwrap_or(Value::Null)
            }
        }
    }

    /// The value on a related row that pairs with a parent.
    fn result_match_key(&self, result: &Entity) -> Value {
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                result.get(self.foreign_key).cloned().unwrap_or(Value::Null)
            }
            RelationKind::BelongsTo => result.key(),
        }
    }

    /// Seed every parent with the relation's empty shape, so parents that
    /// match nothing still carry a loaded entry.
    pub fn init_relation(&self, parents: &mut Collection, name: &str) {
        let empty = if self.kind.is_singular() {
            Related::One(None)
        } else {
            Related::Many(Collection::default())
        };
        for parent in parents.iter_mut() {
            parent.set_relation(name, empty.clone());
        }
    }

    /// Distribute eager-loaded results onto their parents through a hash
    /// dictionary, one pass over results and one over parents.
    pub fn match_results(&self, parents: &mut Collection, name: &str, results: Collection) {
        let mut dictionary: HashMap<Value, Vec<Entity>> = HashMap::new();
        for result in results {
            let key = self.result_match_key(&result);
            if !key.is_null() {
                dictionary.entry(key).or_default().push(result);
            }
        }
        for parent in parents.iter_mut() {
            let key = self.parent_match_key(parent);
            let matched = dictionary.get(&key);
            let related = if self.kind.is_singular() {
                Related::One(
                    matched
                        .and_then(|items| items.first())
                        .cloned()
                        .map(Box::new),
                )
            } else {
                Related::Many(matched.cloned().unwrap_or_default().into())
            };
            parent.set_relation(name, related);
        }
    }

    /// Further constrain the underlying query.
    pub fn constrain(&mut self, f: impl FnOnce(Query) -> Query) {
        self.edit_query(|q| q.map_query(f));
    }

    /// Forward eager paths into the relation's own query, for nested
    /// dot-path loading.
    pub fn with_nested(&mut self, paths: &BTreeMap<String, crate::builder::Constraint>) {
        self.edit_query(|q| q.with_forwarded(paths));
    }

    /// Run the relation's query.
    pub async fn get<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<Collection> {
        self.query.get(conn).await
    }

    /// Run the query shaped for this relation's cardinality.
    pub async fn get_results<D: Driver>(&self, conn: &Connection<D>) -> OrmResult<Related> {
        if self.kind.is_singular() {
            Ok(Related::One(self.query.first(conn).await?.map(Box::new)))
        } else {
            Ok(Related::Many(self.query.get(conn).await?))
        }
    }

    /// Persist a new child keyed to the captured parent. Only meaningful on
    /// the owning side; `BelongsTo` rejects it.
    pub async fn create<'a, D: Driver, V: Into<Value>>(
        &self,
        conn: &Connection<D>,
        attrs: impl IntoIterator<Item = (&'a str, V)>,
    ) -> OrmResult<Entity> {
        if self.kind == RelationKind::BelongsTo {
            return Err(OrmError::invalid_argument(
                "cannot create through a belongs-to relation",
            ));
        }
        let parent_key = self.parent_key.clone().ok_or_else(|| {
            OrmError::invalid_argument("relation has no parent to key the new row to")
        })?;
        let mut entity = self.related.make(attrs);
        entity.set(self.foreign_key, parent_key);
        entity.save(conn).await?;
        Ok(entity)
    }

    /// Attach an existing entity to the captured parent and persist it.
    pub async fn save<D: Driver>(
        &self,
        conn: &Connection<D>,
        entity: &mut Entity,
    ) -> OrmResult<bool> {
        if self.kind == RelationKind::BelongsTo {
            return Err(OrmError::invalid_argument(
                "cannot save through a belongs-to relation",
            ));
        }
        let parent_key = self.parent_key.clone().ok_or_else(|| {
            OrmError::invalid_argument("relation has no parent to key the row to")
        })?;
        entity.set(self.foreign_key, parent_key);
        entity.save(conn).await
    }
}
