//! The row & type kernel: values, data types, collations and schemas.

pub mod collation;
pub mod data_type;
pub mod schema;
pub mod value;

pub use collation::{merge_coercion, CharacterSet, Coercibility, Coercion, CollationId};
pub use data_type::{DataType, GeometryKind, SizeTier};
pub use schema::{Column, Schema};
pub use value::{Geometry, Row, Value};
