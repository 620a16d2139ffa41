/// Type descriptors
///
/// This module describes the shape and element layout of arrays. A [`Type`]
/// is an immutable, structurally shared tree: dimension nodes wrap element
/// types, struct nodes hold ordered named fields, and leaves are scalars,
/// strings, bytes, object slots or pointers.
///
mod core;
pub use core::*;

mod kind;
pub use kind::*;

mod parser;
pub use parser::*;

mod promote;
pub use promote::*;
