//! Result rows returned by the driver.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::collections::BTreeMap;

/// A single result row: a string-keyed map of column name to value.
///
/// Rows are the exchange shape between the driver collaborator and the
/// hydration layer; column order is not significant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter, mainly for drivers and tests.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            columns: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Fetch a column value, erroring with the column name when absent.
    pub fn try_get(&self, column: &str) -> OrmResult<Value> {
        self.columns
            .get(column)
            .cloned()
            .ok_or_else(|| OrmError::decode(column, "column missing from result row"))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    pub fn into_columns(self) -> BTreeMap<String, Value> {
        self.columns
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_try_get() {
        let row = Row::new().with("id", 1_i64).with("name", "ada");
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.try_get("name").unwrap(), Value::Text("ada".into()));
        let err = row.try_get("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
