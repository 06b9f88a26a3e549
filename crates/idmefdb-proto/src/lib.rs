//! IDMEF object model for idmefdb.
//!
//! This crate defines the data types shared by the query layer and the
//! language front-end. It holds no database logic.
//!
//! # Modules
//!
//! - [`schema`] - Class tree: classes, their children and leaf value types
//! - [`path`] - Object paths such as `alert.source(0).node.address(*).address`
//! - [`value`] - Typed values and timestamps
//! - [`criteria`] - Boolean criteria trees over paths
//! - [`error`] - Object model error types
//!
//! ```ignore
//! use idmefdb_proto::{Criteria, Criterion, CriterionOperator, Path, Value};
//!
//! let path = Path::parse("alert.classification.text")?;
//! let criteria: Criteria =
//!     Criterion::fixed(path, CriterionOperator::EQUAL, Value::String("foo".into()))?.into();
//! ```

pub mod criteria;
pub mod error;
pub mod path;
pub mod schema;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use criteria::{BrokenDownTime, Criteria, Criterion, CriterionOperator, CriterionValue, Relation};
pub use path::{Path, PathIndex, Segment};
pub use schema::{Child, ChildKind, IdmefClass, ValueType};
pub use value::{Time, Value};
