//! Table schema: fields, constraints, schema files, and the table handle
//! tying them to a record store and its indexes.

mod constraint;
mod field;
pub mod schema_file;
#[allow(clippy::module_inception)]
mod table;
pub(crate) mod validation;

pub use constraint::{ConstraintDescriptor, ConstraintKind, ForeignReference};
pub use field::{FieldDescriptor, MAX_NAME_LEN};
pub use table::Table;
