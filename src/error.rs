//! Error taxonomy for the QTC codec (see spec.md §7).

/// Reason an encode, decode, or PGM read/write failed.
#[derive(Debug, thiserror::Error)]
pub enum QtcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a QTC file: missing \"Q1\" magic")]
    MissingMagic,

    #[error("unexpected end of stream while decoding")]
    UnexpectedEof,

    #[error("malformed PGM header: {0}")]
    MalformedPgm(String),

    #[error("image is not square ({width}x{height})")]
    NonSquare { width: u32, height: u32 },

    #[error("image side {0} is not a power of two")]
    NotPowerOfTwo(u32),

    #[error("alpha must be in [0.0, 2.0], got {0}")]
    AlphaOutOfRange(f64),

    #[error("-c/--encode and -u/--decode are mutually exclusive")]
    ConflictingModes,

    #[error("unexpected file extension for input={input}, output={output}")]
    WrongExtension { input: String, output: String },
}
