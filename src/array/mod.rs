/// Arrays
///
/// [`Array`] handles pair a data pointer with a type and its layout
/// metadata. Indexing, field projection and the sequence generators all
/// build new handles over existing memory, keeping it alive through
/// reference counted memory blocks.
///
mod arrmeta;
pub use arrmeta::*;

mod core;
pub use core::*;

mod value;
pub use value::*;

mod coercion;
pub use coercion::*;

mod assign;
mod extract;

mod subset;
pub use subset::*;

mod indexing;
pub use indexing::*;

mod fields;

mod range;
pub use range::*;

mod display;
pub use display::*;
