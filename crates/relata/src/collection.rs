//! Ordered result collection with a small functional surface.
//!
//! A collection is list-style by default. Built through [`Collection::from_keyed`]
//! it additionally carries one string key per entity, and `map`/`filter`
//! preserve those keys alongside the surviving entities.

use crate::model::Entity;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::ops::Index;

/// An ordered set of entities returned by a query or relation.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    items: Vec<Entity>,
    // When present, co-indexed with items.
    keys: Option<Vec<String>>,
}

impl Collection {
    pub fn new(items: Vec<Entity>) -> Self {
        Self { items, keys: None }
    }

    /// Dictionary-style collection with one key per entity, in order.
    pub fn from_keyed(pairs: impl IntoIterator<Item = (String, Entity)>) -> Self {
        let (keys, items) = pairs.into_iter().unzip();
        Self {
            items,
            keys: Some(keys),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Entity> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&Entity> {
        self.items.last()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items.get(index)
    }

    /// Look up by explicit key; always `None` on a list-style collection.
    pub fn get_key(&self, key: &str) -> Option<&Entity> {
        let keys = self.keys.as_ref()?;
        let index = keys.iter().position(|k| k == key)?;
        self.items.get(index)
    }

    /// The explicit keys, when this collection is dictionary-style.
    pub fn keys(&self) -> Option<&[String]> {
        self.keys.as_deref()
    }

    /// Append an entity. A keyed collection assigns the positional index as
    /// the new entry's key.
    pub fn push(&mut self, entity: Entity) {
        if let Some(keys) = &mut self.keys {
            keys.push(self.items.len().to_string());
        }
        self.items.push(entity);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.items.iter_mut()
    }

    /// Transform every entity, preserving order and keys.
    pub fn map(&self, f: impl Fn(&Entity) -> Entity) -> Self {
        Self {
            items: self.items.iter().map(f).collect(),
            keys: self.keys.clone(),
        }
    }

    /// Keep entities matching the predicate; surviving entries keep their
    /// keys.
    pub fn filter(&self, f: impl Fn(&Entity) -> bool) -> Self {
        match &self.keys {
            None => Self::new(self.items.iter().filter(|e| f(e)).cloned().collect()),
            Some(keys) => Self::from_keyed(
                keys.iter()
                    .zip(&self.items)
                    .filter(|(_, e)| f(e))
                    .map(|(k, e)| (k.clone(), e.clone())),
            ),
        }
    }

    pub fn fold<T>(&self, initial: T, mut f: impl FnMut(T, &Entity) -> T) -> T {
        self.items.iter().fold(initial, |acc, e| f(acc, e))
    }

    pub fn each(&self, mut f: impl FnMut(&Entity)) {
        for item in &self.items {
            f(item);
        }
    }

    pub fn into_vec(self) -> Vec<Entity> {
        self.items
    }

    /// JSON array of the entities' serialized forms.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Array(self.items.iter().map(Entity::to_value).collect())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_value())
    }
}

impl From<Vec<Entity>> for Collection {
    fn from(items: Vec<Entity>) -> Self {
        Self::new(items)
    }
}

impl FromIterator<Entity> for Collection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Index<usize> for Collection {
    type Output = Entity;

    fn index(&self, index: usize) -> &Entity {
        &self.items[index]
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in &self.items {
            seq.serialize_element(&item.to_value())?;
        }
        seq.end()
    }
}
