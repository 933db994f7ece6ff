//! Model definitions and active-record entities.
//!
//! A [`ModelDef`] is a `static` description of one table: name, primary key,
//! mass-assignment whitelist, declared relations. Definitions reference each
//! other through `&'static`, so mutually-related models are plain statics:
//!
//! ```ignore
//! static USER: ModelDef = ModelDef::new("users")
//!     .fillable(&["name", "email"])
//!     .relations(&[RelationDef::has_many("posts", &POST, "user_id")]);
//!
//! static POST: ModelDef = ModelDef::new("posts")
//!     .fillable(&["title", "user_id"])
//!     .relations(&[RelationDef::belongs_to("author", &USER, "user_id")]);
//! ```
//!
//! An [`Entity`] is one row under that definition: current attributes, the
//! snapshot taken at last sync, loaded relations, and a persistence flag.

use crate::builder::ModelQuery;
use crate::collection::Collection;
use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::{OrmError, OrmResult};
use crate::query::Query;
use crate::relations::{Constrained, Relation, RelationDef};
use crate::row::Row;
use crate::value::Value;
use std::collections::BTreeMap;

/// Static description of a mapped table.
pub struct ModelDef {
    pub table: &'static str,
    pub primary_key: &'static str,
    pub fillable: &'static [&'static str],
    pub hidden: &'static [&'static str],
    pub incrementing: bool,
    pub eager: &'static [&'static str],
    pub relations: &'static [RelationDef],
}

// Definitions reference each other cyclically, so Debug prints relation
// names instead of recursing into related definitions.
impl std::fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDef")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("fillable", &self.fillable)
            .field(
                "relations",
                &self.relations.iter().map(|r| r.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ModelDef {
    pub const fn new(table: &'static str) -> Self {
        Self {
            table,
            primary_key: "id",
            fillable: &[],
            hidden: &[],
            incrementing: true,
            eager: &[],
            relations: &[],
        }
    }

    pub const fn primary_key(mut self, key: &'static str) -> Self {
        self.primary_key = key;
        self
    }

    pub const fn fillable(mut self, columns: &'static [&'static str]) -> Self {
        self.fillable = columns;
        self
    }

    pub const fn hidden(mut self, columns: &'static [&'static str]) -> Self {
        self.hidden = columns;
        self
    }

    pub const fn non_incrementing(mut self) -> Self {
        self.incrementing = false;
        self
    }

    /// Relation paths eager-loaded by every query unless overridden.
    pub const fn eager(mut self, paths: &'static [&'static str]) -> Self {
        self.eager = paths;
        self
    }

    pub const fn relations(mut self, relations: &'static [RelationDef]) -> Self {
        self.relations = relations;
        self
    }

    /// Look up a declared relation by name.
    pub fn relation(&'static self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Start a query scoped to this model's table, with its default eager
    /// paths applied.
    pub fn query(&'static self) -> ModelQuery {
        ModelQuery::new(self)
    }

    /// Start a query with the given eager paths on top of the defaults.
    pub fn with(&'static self, paths: &[&str]) -> ModelQuery {
        self.query().with(paths)
    }

    /// A blank, non-persisted entity.
    pub fn new_entity(&'static self) -> Entity {
        Entity {
            def: self,
            attributes: BTreeMap::new(),
            original: BTreeMap::new(),
            relations: BTreeMap::new(),
            exists: false,
        }
    }

    /// A non-persisted entity mass-assigned from the given pairs.
    pub fn make<'a, V: Into<Value>>(
        &'static self,
        attrs: impl IntoIterator<Item = (&'a str, V)>,
    ) -> Entity {
        let mut entity = self.new_entity();
        entity.fill(attrs);
        entity
    }

    /// Mass-assign and persist in one step.
    pub async fn create<'a, D: Driver, V: Into<Value>>(
        &'static self,
        conn: &Connection<D>,
        attrs: impl IntoIterator<Item = (&'a str, V)>,
    ) -> OrmResult<Entity> {
        let mut entity = self.make(attrs);
        entity.save(conn).await?;
        Ok(entity)
    }

    pub async fn find<D: Driver>(
        &'static self,
        conn: &Connection<D>,
        id: impl Into<Value>,
    ) -> OrmResult<Option<Entity>> {
        self.query().find(conn, id).await
    }

    pub async fn first<D: Driver>(
        &'static self,
        conn: &Connection<D>,
    ) -> OrmResult<Option<Entity>> {
        self.query().first(conn).await
    }

    pub async fn all<D: Driver>(&'static self, conn: &Connection<D>) -> OrmResult<Collection> {
        self.query().get(conn).await
    }

    /// Fetch the given keys and delete each matching entity, returning how
    /// many were removed.
    pub async fn destroy<D: Driver, V: Into<Value>>(
        &'static self,
        conn: &Connection<D>,
        ids: impl IntoIterator<Item = V>,
    ) -> OrmResult<u64> {
        let mut count = 0;
        for id in ids {
            if let Some(mut entity) = self.find(conn, id).await? {
                if entity.delete(conn).await? {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    fn base_query(&self) -> Query {
        Query::table(self.table)
    }
}

/// A loaded relation result cached on an entity.
#[derive(Debug, Clone)]
pub enum Related {
    /// HasOne / BelongsTo: at most one related entity.
    One(Option<Box<Entity>>),
    /// HasMany: the full related set.
    Many(Collection),
}

/// One row of a model: attributes, the original snapshot, loaded relations,
/// and whether the row exists in the database.
#[derive(Debug, Clone)]
pub struct Entity {
    def: &'static ModelDef,
    attributes: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    relations: BTreeMap<String, Related>,
    exists: bool,
}

impl Entity {
    /// Hydrate from a database row. Bypasses the fillable whitelist and
    /// snapshots immediately, so a fresh entity is never dirty.
    pub fn from_row(def: &'static ModelDef, row: Row) -> Self {
        let attributes: BTreeMap<String, Value> = row.into_columns().into_iter().collect();
        Self {
            def,
            original: attributes.clone(),
            attributes,
            relations: BTreeMap::new(),
            exists: true,
        }
    }

    pub fn def(&self) -> &'static ModelDef {
        self.def
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The primary key value, `Null` when unset.
    pub fn key(&self) -> Value {
        self.get(self.def.primary_key).cloned().unwrap_or(Value::Null)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Mass-assign. Keys may be table-qualified (`users.name`); the prefix
    /// is stripped before the fillable check. Non-fillable keys are skipped.
    pub fn fill<'a, V: Into<Value>>(
        &mut self,
        attrs: impl IntoIterator<Item = (&'a str, V)>,
    ) -> &mut Self {
        for (key, value) in attrs {
            let key = key.rsplit('.').next().unwrap_or(key);
            if self.def.fillable.contains(&key) {
                self.attributes.insert(key.to_string(), value.into());
            }
        }
        self
    }

    /// Attributes changed since the last snapshot: new keys, or keys whose
    /// value differs from the original.
    pub fn dirty(&self) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter(|(k, v)| self.original.get(*k) != Some(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes
            .iter()
            .any(|(k, v)| self.original.get(k) != Some(v))
    }

    /// Snapshot current attributes as the clean baseline.
    pub fn sync_original(&mut self) -> &mut Self {
        self.original = self.attributes.clone();
        self
    }

    /// The key an update or delete should target: the snapshot's primary
    /// key, so a locally re-keyed entity still addresses its stored row.
    fn key_for_save(&self) -> Value {
        self.original
            .get(self.def.primary_key)
            .or_else(|| self.attributes.get(self.def.primary_key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Persist: insert when new, update the dirty diff when already stored.
    /// An update with an empty diff issues no statement.
    pub async fn save<D: Driver>(&mut self, conn: &Connection<D>) -> OrmResult<bool> {
        if self.exists {
            self.perform_update(conn).await?;
        } else {
            self.perform_insert(conn).await?;
        }
        self.sync_original();
        Ok(true)
    }

    async fn perform_insert<D: Driver>(&mut self, conn: &Connection<D>) -> OrmResult<()> {
        let query = self.def.base_query();
        if self.def.incrementing {
            let id = query.insert_get_id(conn, &self.attributes).await?;
            self.attributes
                .insert(self.def.primary_key.to_string(), Value::Int(id));
        } else {
            query
                .insert(conn, std::slice::from_ref(&self.attributes))
                .await?;
        }
        self.exists = true;
        Ok(())
    }

    async fn perform_update<D: Driver>(&mut self, conn: &Connection<D>) -> OrmResult<()> {
        let dirty = self.dirty();
        if dirty.is_empty() {
            return Ok(());
        }
        self.def
            .base_query()
            .where_eq(self.def.primary_key, self.key_for_save())
            .update(conn, &dirty)
            .await?;
        Ok(())
    }

    /// Mass-assign then save.
    pub async fn update<'a, D: Driver, V: Into<Value>>(
        &mut self,
        conn: &Connection<D>,
        attrs: impl IntoIterator<Item = (&'a str, V)>,
    ) -> OrmResult<bool> {
        self.fill(attrs);
        self.save(conn).await
    }

    /// Delete the stored row. Returns `false` without touching the database
    /// when the entity was never persisted.
    pub async fn delete<D: Driver>(&mut self, conn: &Connection<D>) -> OrmResult<bool> {
        if !self.exists {
            return Ok(false);
        }
        self.def
            .base_query()
            .where_eq(self.def.primary_key, self.key_for_save())
            .delete(conn, None)
            .await?;
        self.exists = false;
        Ok(true)
    }

    // ==================== Relations ====================

    /// A relation result already loaded onto this entity.
    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) -> &mut Self {
        self.relations.insert(name.into(), related);
        self
    }

    pub fn loaded_relations(&self) -> &BTreeMap<String, Related> {
        &self.relations
    }

    /// The runtime relation object for a declared relation, constrained to
    /// this entity. Useful for creating children or refining the relation
    /// query before running it.
    pub fn relation_query(&self, name: &str) -> OrmResult<Relation> {
        let def = self
            .def
            .relation(name)
            .ok_or_else(|| OrmError::unknown_relation(self.def.table, name))?;
        Ok(Relation::new(def, Some(self), Constrained::Yes))
    }

    /// Resolve a relation by name, fetching and caching on first access.
    pub async fn related<D: Driver>(
        &mut self,
        conn: &Connection<D>,
        name: &str,
    ) -> OrmResult<Related> {
        if let Some(cached) = self.relations.get(name) {
            return Ok(cached.clone());
        }
        let def = self
            .def
            .relation(name)
            .ok_or_else(|| OrmError::unknown_relation(self.def.table, name))?;
        let relation = Relation::new(def, Some(self), Constrained::Yes);
        let results = relation.get_results(conn).await?;
        self.relations.insert(name.to_string(), results.clone());
        Ok(results)
    }

    // ==================== Serialization ====================

    /// JSON form: attributes minus hidden columns, plus every loaded
    /// relation under its name.
    pub fn to_value(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.attributes {
            if self.def.hidden.contains(&key.as_str()) {
                continue;
            }
            map.insert(key.clone(), value.to_json());
        }
        for (name, related) in &self.relations {
            let value = match related {
                Related::One(None) => serde_json::Value::Null,
                Related::One(Some(entity)) => entity.to_value(),
                Related::Many(collection) => collection.to_value(),
            };
            map.insert(name.clone(), value);
        }
        serde_json::Value::Object(map)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static USER: ModelDef = ModelDef::new("users")
        .fillable(&["name", "email"])
        .hidden(&["password"]);

    #[test]
    fn fill_respects_whitelist_and_strips_table_prefix() {
        let mut user = USER.new_entity();
        user.fill([
            ("users.name", Value::from("ada")),
            ("email", Value::from("ada@example.com")),
            ("role", Value::from("admin")),
        ]);
        assert_eq!(user.get("name"), Some(&Value::Text("ada".into())));
        assert_eq!(
            user.get("email"),
            Some(&Value::Text("ada@example.com".into()))
        );
        assert_eq!(user.get("role"), None);
    }

    #[test]
    fn dirty_tracks_only_changes_since_snapshot() {
        let mut user = USER.make([("name", "ada")]);
        assert_eq!(user.dirty().len(), 1);
        user.sync_original();
        assert!(user.dirty().is_empty());
        assert!(!user.is_dirty());

        user.set("name", "lovelace");
        let dirty = user.dirty();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty.get("name"), Some(&Value::Text("lovelace".into())));

        // setting a value back to the snapshot clears it from the diff
        user.set("name", "ada");
        assert!(user.dirty().is_empty());
    }

    #[test]
    fn from_row_is_clean_and_persisted() {
        let row = Row::new()
            .with("id", Value::Int(7))
            .with("name", Value::from("ada"));
        let user = Entity::from_row(&USER, row);
        assert!(user.exists());
        assert!(user.dirty().is_empty());
        assert_eq!(user.key(), Value::Int(7));
    }

    #[test]
    fn key_for_save_prefers_the_snapshot() {
        let row = Row::new().with("id", Value::Int(7));
        let mut user = Entity::from_row(&USER, row);
        user.set("id", Value::Int(99));
        assert_eq!(user.key_for_save(), Value::Int(7));
    }

    #[test]
    fn serialization_hides_hidden_columns() {
        let row = Row::new()
            .with("id", Value::Int(1))
            .with("name", Value::from("ada"))
            .with("password", Value::from("secret"));
        let user = Entity::from_row(&USER, row);
        let json = user.to_value();
        assert_eq!(json["name"], serde_json::json!("ada"));
        assert!(json.get("password").is_none());
    }

    #[test]
    fn set_relation_appears_in_serialized_form() {
        let mut user = Entity::from_row(&USER, Row::new().with("id", Value::Int(1)));
        user.set_relation("posts", Related::Many(Collection::default()));
        assert_eq!(user.to_value()["posts"], serde_json::json!([]));
    }
}
