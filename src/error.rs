use crate::arch::SimdKind;

/// Everything that can go wrong between program text and a callable artifact.
///
/// Generation errors carry the 1-based line number of the offending
/// instruction. None of them leave a partial artifact behind.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: cannot parse literal constant `{literal}`")]
    BadLiteral { line: usize, literal: String },

    #[error("line {line}: bad assembly command `{mnemonic}`")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: SIMD slot {slot} out of range (at most {max} registers)")]
    SlotOutOfRange { line: usize, slot: u32, max: u32 },

    #[error("line {line}: index {index} is too large to address")]
    IndexOutOfRange { line: usize, index: u32 },

    #[error("SIMD kind `{0}` is not supported by this CPU")]
    UnsupportedKind(SimdKind),

    #[error("failed to encode machine code: {0}")]
    Encode(String),

    #[error("executable memory: {0}")]
    Memory(#[from] std::io::Error),

    #[error("{what} buffer too small: need {needed} floats, got {got}")]
    BufferTooSmall {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("operand ${id} does not belong to this graph")]
    DanglingOperand { id: u32 },

    #[error("{message}")]
    GraphParse { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
