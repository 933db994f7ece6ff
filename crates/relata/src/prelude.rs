//! Convenient imports for typical `relata` usage.
//!
//! Intentionally small and focused on the most common APIs so examples can
//! start with:
//!
//! ```ignore
//! use relata::prelude::*;
//! ```

pub use crate::{
    Collection, Connection, Direction, Driver, Entity, ModelDef, ModelQuery, Op, OrmError,
    OrmResult, Query, Related, RelationDef, Row, Value,
};
