//! The `luac` 5.0 chunk format.
//!
//! [`load`] turns a byte buffer into a [`BytecodeImage`]; [`dump`] writes one
//! back. Neither validates opcodes, that is left to the operator table.

mod header;
mod loader;
mod prototype;
mod reader;
mod writer;

pub use header::{Endian, Header, SIGNATURE, TEST_NUMBER, VERSION};
pub use loader::{load, load_with, LoadOptions, MAX_NESTING};
pub use prototype::{BytecodeImage, Constant, LocalVar, Prototype};
pub use writer::{dump, dump_with};
