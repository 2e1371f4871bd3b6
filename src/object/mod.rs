//! The object model the codegen compiles against: tags, the tagged value
//! word, and region-allocating constructors.

pub mod layout;
pub mod tag;
pub mod value;

pub use layout::*;
pub use tag::{ObjHeader, ObjTag};
pub use value::Value;
