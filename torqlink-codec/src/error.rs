use thiserror::Error;

/// Errors produced while encoding or decoding frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Stripped frame is shorter than the 20-character header
    #[error("Frame too short: expected at least {expected} characters, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    /// MID 0061 frame whose length matches neither result layout
    #[error("MID 0061: Unexpected string length: {0}")]
    UnexpectedResultLength(usize),

    /// Header field of the wrong width
    #[error("Invalid {field}: expected {width} characters, got {value:?}")]
    InvalidHeaderField {
        field: &'static str,
        width: usize,
        value: String,
    },

    /// Data segment does not fit the 4-digit length field
    #[error("Data segment too long: {0} bytes")]
    DataTooLong(usize),
}
