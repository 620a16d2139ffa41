pub mod array;
pub mod error;
pub mod memory;
pub mod ndt;

pub mod cli;
pub mod session;
