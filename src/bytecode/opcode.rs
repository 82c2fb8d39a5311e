// RegVM Bytecode Instructions

/// Bytecode operation codes.
///
/// Byte values are grouped by instruction family: loads 1-5, control flow and
/// host interop 10-19, comparisons 50-57, arithmetic 100-103. Gaps are
/// reserved; decoding any unassigned byte is an `UnknownOpcode` fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    // Loads
    LoadString = 1,   // dst, u16 len, payload bytes
    LoadNum = 2,      // dst, imm8
    LoadFloatNum = 3, // dst, f64 big-endian
    LoadLongNum = 4,  // dst, u32 big-endian
    LoadArray = 5,    // dst, u16 count, register bytes

    // Control flow and host interop
    PropAccess = 10,   // dst, obj, prop
    FuncCall = 11,     // dst, func, this, u16 argc, register bytes
    Eval = 12,         // dst, src
    CallBcFunc = 13,   // u16 target
    ReturnBcFunc = 14, // (none)
    Copy = 15,         // dst, src
    Exit = 16,         // (none)
    JumpCond = 17,     // cond, delta
    Jump = 18,         // delta
    JumpCondNeg = 19,  // cond, delta

    // Comparisons (dst, a, b)
    CompEqual = 50,
    CompNotEqual = 51,
    CompStrictEqual = 52,
    CompStrictNotEqual = 53,
    CompLessThan = 54,
    CompGreaterThan = 55,
    CompLessThanEqual = 56,
    CompGreaterThanEqual = 57,

    // Arithmetic (dst, src; dst is also the left operand)
    Add = 100,
    Sub = 101,
    Mul = 102,
    Div = 103,
}

impl Opcode {
    /// Decode an opcode byte. Returns `None` for unassigned bytes.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        match byte {
            1 => Some(Opcode::LoadString),
            2 => Some(Opcode::LoadNum),
            3 => Some(Opcode::LoadFloatNum),
            4 => Some(Opcode::LoadLongNum),
            5 => Some(Opcode::LoadArray),
            10 => Some(Opcode::PropAccess),
            11 => Some(Opcode::FuncCall),
            12 => Some(Opcode::Eval),
            13 => Some(Opcode::CallBcFunc),
            14 => Some(Opcode::ReturnBcFunc),
            15 => Some(Opcode::Copy),
            16 => Some(Opcode::Exit),
            17 => Some(Opcode::JumpCond),
            18 => Some(Opcode::Jump),
            19 => Some(Opcode::JumpCondNeg),
            50 => Some(Opcode::CompEqual),
            51 => Some(Opcode::CompNotEqual),
            52 => Some(Opcode::CompStrictEqual),
            53 => Some(Opcode::CompStrictNotEqual),
            54 => Some(Opcode::CompLessThan),
            55 => Some(Opcode::CompGreaterThan),
            56 => Some(Opcode::CompLessThanEqual),
            57 => Some(Opcode::CompGreaterThanEqual),
            100 => Some(Opcode::Add),
            101 => Some(Opcode::Sub),
            102 => Some(Opcode::Mul),
            103 => Some(Opcode::Div),
            _ => None,
        }
    }

    /// Assembler-style name used by the disassembler and trace output.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::LoadString => "LOAD_STRING",
            Opcode::LoadNum => "LOAD_NUM",
            Opcode::LoadFloatNum => "LOAD_FLOAT_NUM",
            Opcode::LoadLongNum => "LOAD_LONG_NUM",
            Opcode::LoadArray => "LOAD_ARRAY",
            Opcode::PropAccess => "PROPACCESS",
            Opcode::FuncCall => "FUNC_CALL",
            Opcode::Eval => "EVAL",
            Opcode::CallBcFunc => "CALL_BCFUNC",
            Opcode::ReturnBcFunc => "RETURN_BCFUNC",
            Opcode::Copy => "COPY",
            Opcode::Exit => "EXIT",
            Opcode::JumpCond => "JUMP_COND",
            Opcode::Jump => "JUMP",
            Opcode::JumpCondNeg => "JUMP_COND_NEG",
            Opcode::CompEqual => "COMP_EQUAL",
            Opcode::CompNotEqual => "COMP_NOT_EQUAL",
            Opcode::CompStrictEqual => "COMP_STRICT_EQUAL",
            Opcode::CompStrictNotEqual => "COMP_STRICT_NOT_EQUAL",
            Opcode::CompLessThan => "COMP_LESS_THAN",
            Opcode::CompGreaterThan => "COMP_GREATER_THAN",
            Opcode::CompLessThanEqual => "COMP_LESS_THAN_EQUAL",
            Opcode::CompGreaterThanEqual => "COMP_GREATER_THAN_EQUAL",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
        }
    }
}
