//! luadec-core
//!
//! Loader and decompiler for Lua 5.0 `luac` chunks as they ship inside game
//! resource archives. The instruction layout is read from the chunk header,
//! so forks with non-standard field widths decode without changes.
//!
//! The pipeline is bytes -> [`format::load`] -> [`BytecodeImage`] ->
//! [`render_prototype`] -> pseudo-source. No file I/O happens here.

pub mod batch;
pub mod codec;
pub mod context;
pub mod emit;
pub mod error;
pub mod format;
pub mod instruction;
pub mod listing;
pub mod nls;
pub mod opcode;
pub mod operator;
pub mod value;

pub use batch::{decode, decompile_batch, BatchReport, Decoded};
pub use emit::{render_prototype, Decompiled, RenderOptions, Warning};
pub use error::{DecodeError, Result};
pub use format::{load, load_with, BytecodeImage, Constant, Header, LoadOptions, Prototype};
pub use instruction::Instruction;
pub use listing::listing;
pub use nls::Nls;
pub use opcode::OperatorKind;

/// Decompile a chunk with default options.
pub fn decompile(bytes: &[u8]) -> Result<Decompiled> {
    decompile_with(bytes, &LoadOptions::default(), &RenderOptions::default())
}

pub fn decompile_with(bytes: &[u8], load: &LoadOptions, render: &RenderOptions) -> Result<Decompiled> {
    let image = load_with(bytes, load)?;
    render_prototype(&image.main, render)
}
