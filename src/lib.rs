// RegVM
// A minimal register-based bytecode virtual machine with host interop.
//
// Bytecode arrives pre-encoded from an external producer; this crate only
// decodes and executes it. One `Vm` instance owns a 256-slot register file
// and a flat program+data stream, runs a dispatch loop to completion, and
// surfaces the return-value register or exactly one fatal error.

pub mod bytecode;
pub mod error;
pub mod vm;

pub use bytecode::{reg, Opcode, NUM_REGISTERS};
pub use error::{VmError, VmResult};
pub use vm::{HostBindings, HostEval, HostObject, NoEval, Value, Vm};
