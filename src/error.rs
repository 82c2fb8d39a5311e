// RegVM Error Handling Module
// One fatal condition per failed run; no handler recovers.

use thiserror::Error;

pub type VmResult<T> = Result<T, VmError>;

/// Fatal conditions surfaced by `Vm::run`.
///
/// Execution never continues past any of these: the dispatch loop halts and
/// the error propagates to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// The dispatch table has no handler for the opcode byte.
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    /// A cursor read was issued at or past the end of the stream.
    #[error("bytecode read out of bounds at offset {offset} (stream length {len})")]
    OutOfBounds { offset: usize, len: usize },

    /// An operation was applied to a value of the wrong runtime kind.
    #[error("{op}: expected {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// The host evaluator rejected or failed on an EVAL source string.
    #[error("host evaluation failed: {0}")]
    HostEvaluationFailure(String),

    /// A host function invoked through FUNC_CALL returned an error.
    #[error("host call failed: {0}")]
    HostCallFailure(String),
}

impl VmError {
    pub fn type_mismatch(op: &'static str, expected: &'static str, found: &'static str) -> Self {
        VmError::TypeMismatch {
            op,
            expected,
            found,
        }
    }
}
