/// Memory ownership
///
/// Raw storage behind arrays. Every buffer an array can point into is owned
/// by a reference counted [`MemoryBlock`]; views and projections hold their
/// own reference, so the bytes outlive whichever array created them.
///
mod block;
pub use block::*;

mod foreign;
pub use foreign::*;
