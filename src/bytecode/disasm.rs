// RegVM Disassembler
// Renders one mnemonic line per decoded instruction.

use crate::bytecode::Opcode;
use std::fmt::Write;

/// Disassemble a bytecode stream.
///
/// Unassigned opcode bytes render as `.byte` directives and decoding
/// continues; a stream that ends mid-operand renders a `<truncated>` marker
/// and stops. This is a display aid, not a validator: streams that
/// interleave code and inline data can produce nonsense lines for the data
/// part.
pub fn disassemble(code: &[u8]) -> String {
    let mut out = String::new();
    let mut reader = Reader { code, pos: 0 };

    while reader.pos < code.len() {
        let at = reader.pos;
        let byte = code[reader.pos];
        reader.pos += 1;

        let Some(opcode) = Opcode::from_byte(byte) else {
            let _ = writeln!(out, "{:04}  .byte 0x{:02x}", at, byte);
            continue;
        };

        match render(opcode, &mut reader) {
            Some(operands) if operands.is_empty() => {
                let _ = writeln!(out, "{:04}  {}", at, opcode.mnemonic());
            }
            Some(operands) => {
                let _ = writeln!(out, "{:04}  {} {}", at, opcode.mnemonic(), operands);
            }
            None => {
                let _ = writeln!(out, "{:04}  {} <truncated>", at, opcode.mnemonic());
                break;
            }
        }
    }

    out
}

struct Reader<'a> {
    code: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn byte(&mut self) -> Option<u8> {
        let byte = *self.code.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn word(&mut self) -> Option<u16> {
        let high = self.byte()? as u16;
        let low = self.byte()? as u16;
        Some((high << 8) | low)
    }

    fn long(&mut self) -> Option<u32> {
        let mut out = 0u32;
        for _ in 0..4 {
            out = (out << 8) | self.byte()? as u32;
        }
        Some(out)
    }

    fn float(&mut self) -> Option<f64> {
        let mut bytes = [0u8; 8];
        for byte in &mut bytes {
            *byte = self.byte()?;
        }
        Some(f64::from_be_bytes(bytes))
    }

    fn string(&mut self) -> Option<String> {
        let len = self.word()? as usize;
        let mut out = String::with_capacity(len);
        for _ in 0..len {
            out.push(self.byte()? as char);
        }
        Some(out)
    }

    fn reg_list(&mut self) -> Option<String> {
        let count = self.word()? as usize;
        let mut regs = Vec::with_capacity(count);
        for _ in 0..count {
            regs.push(format!("r{}", self.byte()?));
        }
        Some(format!("[{}]", regs.join(", ")))
    }
}

fn render(opcode: Opcode, r: &mut Reader) -> Option<String> {
    let text = match opcode {
        Opcode::LoadString => {
            let dst = r.byte()?;
            format!("r{}, {:?}", dst, r.string()?)
        }
        Opcode::LoadNum => format!("r{}, {}", r.byte()?, r.byte()?),
        Opcode::LoadFloatNum => {
            let dst = r.byte()?;
            format!("r{}, {}", dst, r.float()?)
        }
        Opcode::LoadLongNum => {
            let dst = r.byte()?;
            format!("r{}, {}", dst, r.long()?)
        }
        Opcode::LoadArray => {
            let dst = r.byte()?;
            format!("r{}, {}", dst, r.reg_list()?)
        }
        Opcode::PropAccess
        | Opcode::CompEqual
        | Opcode::CompNotEqual
        | Opcode::CompStrictEqual
        | Opcode::CompStrictNotEqual
        | Opcode::CompLessThan
        | Opcode::CompGreaterThan
        | Opcode::CompLessThanEqual
        | Opcode::CompGreaterThanEqual => {
            format!("r{}, r{}, r{}", r.byte()?, r.byte()?, r.byte()?)
        }
        Opcode::FuncCall => {
            let dst = r.byte()?;
            let func = r.byte()?;
            let this = r.byte()?;
            format!("r{}, r{}, r{}, {}", dst, func, this, r.reg_list()?)
        }
        Opcode::Eval
        | Opcode::Copy
        | Opcode::JumpCond
        | Opcode::JumpCondNeg
        | Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div => format!("r{}, r{}", r.byte()?, r.byte()?),
        Opcode::CallBcFunc => format!("@{:04}", r.word()?),
        Opcode::Jump => format!("r{}", r.byte()?),
        Opcode::ReturnBcFunc | Opcode::Exit => String::new(),
    };
    Some(text)
}
