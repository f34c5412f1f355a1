use thiserror::Error;

/// Failures that abort decoding of one script.
///
/// `MalformedHeader`, `TruncatedStream` and `InvalidConstantTag` come from the
/// loader and mean the blob cannot be trusted any further. `UnbalancedBlocks`
/// is raised by the reconstructor only when its own nesting bookkeeping is
/// broken, which is a bug rather than bad input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("truncated stream at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedStream {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("invalid constant tag {tag} at offset {offset}")]
    InvalidConstantTag { tag: u8, offset: usize },

    #[error("unbalanced blocks in {proto}: {open} closer(s) left open at pc={pc}")]
    UnbalancedBlocks {
        proto: String,
        pc: usize,
        open: usize,
    },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
