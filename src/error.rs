//! Error types for stub compilation.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Calling-convention cursor misuse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConventionError {
    #[error("location query does not match the current parameter kind")]
    InvalidParamKind,
}

/// Macro-assembler finalisation failure.
///
/// Emission pseudo-ops are infallible; anything that can go wrong (an
/// out-of-range branch, an unbound label) surfaces here when the back-end
/// fixes up and writes out the final bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("encoding failed: {reason}")]
pub struct EncodingError {
    pub reason: String,
}

impl EncodingError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Main error type for stub compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("method cannot be both fast-native and critical-native")]
    IncompatibleAnnotations,

    #[error("illegal critical-native signature: {reason}")]
    IllegalCriticalSignature { reason: &'static str },

    #[error("calling convention misuse: {0}")]
    Convention(#[from] ConventionError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
