//! # relata
//!
//! A query-building and relational-mapping engine with pluggable SQL drivers.
//!
//! ## Features
//!
//! - **Structured queries**: [`Query`] records clause data, not SQL strings;
//!   a dialect [`Grammar`] compiles it plus an aligned binding list
//! - **Two dialects**: MySQL (backticks, `?`) and Postgres (double quotes, `$n`)
//! - **Active-record entities**: static [`ModelDef`] table descriptions,
//!   [`Entity`] rows with dirty tracking and snapshot-keyed updates
//! - **Relations**: `has_one` / `has_many` / `belongs_to`, lazy or eager;
//!   eager loading batches N parents into one `where in` query and supports
//!   nested `"posts.comments"` dot-paths
//! - **Driver seam**: any backend implementing [`Driver`] plugs in; tests
//!   run against in-memory fakes
//! - **Nested transactions**: reference-counted `begin`/`commit` with a
//!   closure-based [`Connection::transaction`] helper
//!
//! ## Quick look
//!
//! ```ignore
//! use relata::prelude::*;
//!
//! static USER: ModelDef = ModelDef::new("users")
//!     .fillable(&["name", "email"])
//!     .relations(&[RelationDef::has_many("posts", &POST, "user_id")]);
//!
//! static POST: ModelDef = ModelDef::new("posts")
//!     .fillable(&["title", "user_id"]);
//!
//! let conn = Connection::new(driver);
//! let user = USER.create(&conn, [("name", "ada")]).await?;
//! let users = USER.with(&["posts"]).where_eq("active", true).get(&conn).await?;
//! ```

pub mod builder;
pub mod collection;
pub mod connection;
pub mod driver;
pub mod error;
pub mod grammar;
pub mod model;
pub mod prelude;
pub mod query;
pub mod relations;
pub mod row;
pub mod value;

pub use builder::{Constraint, ModelQuery};
pub use collection::Collection;
pub use connection::Connection;
pub use driver::{Driver, DriverError, DriverResult};
pub use error::{OrmError, OrmResult};
pub use grammar::{Dialect, Grammar};
pub use model::{Entity, ModelDef, Related};
pub use query::{Boolean, Direction, Join, JoinKind, Op, Query};
pub use relations::{Constrained, Relation, RelationDef, RelationKind};
pub use row::Row;
pub use value::Value;
