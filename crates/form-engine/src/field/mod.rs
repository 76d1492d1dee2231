pub mod builder;
pub mod descriptor;
pub mod erased;

pub use builder::FieldBuilder;
pub use descriptor::{FieldDescriptor, Flag};
pub use erased::{ErasedField, TypedField};
