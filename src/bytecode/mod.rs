// RegVM Bytecode Module
// Instruction set and stream conventions shared with external producers.

pub mod disasm;
pub mod opcode;

pub use opcode::Opcode;

/// Number of register slots in the register file.
pub const NUM_REGISTERS: usize = 256;

/// Reserved register indices.
///
/// These hold machine state rather than user data; producers allocate user
/// registers above `NUM_RESERVED`.
pub mod reg {
    /// Cursor position into the instruction stream. Despite the name it
    /// addresses a flat stream, not a call stack.
    pub const STACK_PTR: u8 = 0;
    /// Result surfaced by a completed run.
    pub const RETURN_VAL: u8 = 1;
    /// Register-file snapshot held across one CALL_BCFUNC/RETURN_BCFUNC pair.
    pub const BACKUP: u8 = 2;
    /// Caller-supplied global-environment handle.
    pub const GLOBAL: u8 = 3;
    /// Caller-supplied document-like handle.
    pub const DOCUMENT: u8 = 4;
    /// The void constant.
    pub const VOID: u8 = 5;
    /// An empty host object.
    pub const EMPTY_OBJECT: u8 = 6;

    pub const NUM_RESERVED: u8 = 7;
}
