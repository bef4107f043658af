//! Translation error definitions.
//!
//! The taxonomy is closed; every variant carries the bytecode offset
//! where it was detected. Nothing is recovered internally and the
//! translator never falls back to running the host function.

use quarry_bytecode::AdapterError;
use thiserror::Error;

/// A translation error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("not an introspectable function: {0}")]
    NotIntrospectable(String),

    #[error("unsupported opcode {opname} at offset {offset}")]
    UnsupportedOpcode { opname: String, offset: u32 },

    #[error("unrecognized control flow at offset {0}")]
    UnsupportedControlFlow(u32),

    #[error("symbolic stack underflow at offset {0}")]
    StackUnderflow(u32),

    #[error("unbalanced jump at offset {0}")]
    UnbalancedJump(u32),

    #[error("unresolved name '{name}' at offset {offset}")]
    UnresolvedName { name: String, offset: u32 },

    #[error("translation limit exceeded at offset {0}")]
    TranslationLimitExceeded(u32),
}

impl From<AdapterError> for TranslateError {
    fn from(err: AdapterError) -> Self {
        TranslateError::NotIntrospectable(err.0)
    }
}
