//! Error types for relata

use crate::value::Value;
use thiserror::Error;

/// Result type alias for relata operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for query building and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Unrecognized comparison operator
    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    /// Sort direction other than asc/desc
    #[error("Invalid sort direction: {0}")]
    InvalidDirection(String),

    /// Bad input caught at the call that introduced it
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Relation name not registered on the model
    #[error("Unknown relation '{name}' on model '{model}'")]
    UnknownRelation { model: String, name: String },

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Failure reported by the driver outside statement execution
    #[error("Driver error: {0}")]
    Driver(String),

    /// Statement failure, re-wrapped with the compiled SQL and bindings
    #[error("{message} (SQL: {sql}) (bindings: {bindings:?})")]
    Query {
        message: String,
        sql: String,
        bindings: Vec<Value>,
    },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an unknown-relation error
    pub fn unknown_relation(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownRelation {
            model: model.into(),
            name: name.into(),
        }
    }

    /// Create a driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Wrap a driver failure with the offending SQL and bindings
    pub fn query(message: impl Into<String>, sql: impl Into<String>, bindings: &[Value]) -> Self {
        Self::Query {
            message: message.into(),
            sql: sql.into(),
            bindings: bindings.to_vec(),
        }
    }

    /// Create an other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Check if this is a configuration error (bad input, not an execution failure)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperator(_)
                | Self::InvalidDirection(_)
                | Self::InvalidArgument(_)
                | Self::UnknownRelation { .. }
        )
    }

    /// Check if this is an invalid-argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Check if this is an execution error carrying SQL context
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }
}
