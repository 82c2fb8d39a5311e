// RegVM Virtual Machine
// Register-based dispatch loop over a flat program+data stream.
// The stack-pointer register is the sole cursor into the stream; every
// operand read goes through it and advances it.

use smallvec::SmallVec;

use crate::bytecode::{reg, Opcode, NUM_REGISTERS};
use crate::error::{VmError, VmResult};
use crate::vm::host::{HostBindings, HostEval, NoEval};
use crate::vm::value::Value;

/// One VM instance: a register file bound to one immutable bytecode stream.
///
/// State lives for exactly one `run()`; nothing persists across runs beyond
/// what the caller re-initializes.
pub struct Vm {
    regs: Vec<Value>,
    code: Vec<u8>,
    host_eval: Box<dyn HostEval>,
    trace: bool,
}

impl Vm {
    /// Initialize the register file over a pre-encoded stream. The stack
    /// pointer starts at 0, the return-value register at zero, and the host
    /// roots come from the caller-supplied bindings.
    pub fn new(code: Vec<u8>, bindings: HostBindings) -> Self {
        let mut regs = vec![Value::Void; NUM_REGISTERS];
        regs[reg::STACK_PTR as usize] = Value::Number(0.0);
        regs[reg::RETURN_VAL as usize] = Value::Number(0.0);
        regs[reg::GLOBAL as usize] = bindings.global;
        regs[reg::DOCUMENT as usize] = bindings.document;
        regs[reg::VOID as usize] = Value::Void;
        regs[reg::EMPTY_OBJECT as usize] = Value::object();

        Self {
            regs,
            code,
            host_eval: Box::new(NoEval),
            trace: false,
        }
    }

    /// Install the evaluator backing the EVAL opcode.
    pub fn with_host_eval(mut self, eval: impl HostEval + 'static) -> Self {
        self.host_eval = Box::new(eval);
        self
    }

    /// Log each executed instruction to stderr.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn get(&self, index: u8) -> &Value {
        &self.regs[index as usize]
    }

    pub fn set(&mut self, index: u8, value: Value) {
        self.regs[index as usize] = value;
    }

    /// Execute until the stack pointer reaches the stream length, then
    /// surface the return-value register. Any fault halts execution; there
    /// is no partial-result mode.
    pub fn run(&mut self) -> VmResult<Value> {
        while self.sp() < self.code.len() {
            self.step()?;
        }
        Ok(self.get(reg::RETURN_VAL).clone())
    }

    fn step(&mut self) -> VmResult<()> {
        let offset = self.sp();
        let byte = self.next_byte()?;
        let opcode = Opcode::from_byte(byte).ok_or(VmError::UnknownOpcode {
            opcode: byte,
            offset,
        })?;
        if self.trace {
            eprintln!("{:04}  {}", offset, opcode.mnemonic());
        }
        self.execute(opcode)
    }

    // Instruction cursor

    fn sp(&self) -> usize {
        match &self.regs[reg::STACK_PTR as usize] {
            Value::Number(n) => *n as usize,
            _ => 0,
        }
    }

    fn set_sp(&mut self, pos: usize) {
        self.regs[reg::STACK_PTR as usize] = Value::Number(pos as f64);
    }

    /// The sole primitive for operand decoding: read one byte at the stack
    /// pointer and advance it.
    fn next_byte(&mut self) -> VmResult<u8> {
        let offset = self.sp();
        if offset >= self.code.len() {
            return Err(VmError::OutOfBounds {
                offset,
                len: self.code.len(),
            });
        }
        self.set_sp(offset + 1);
        Ok(self.code[offset])
    }

    // Decoders

    /// 16-bit big-endian length prefix, combined arithmetically.
    fn read_u16(&mut self) -> VmResult<u16> {
        let high = self.next_byte()? as u16;
        let low = self.next_byte()? as u16;
        Ok((high << 8) | low)
    }

    fn read_u32(&mut self) -> VmResult<u32> {
        let mut out = 0u32;
        for _ in 0..4 {
            out = (out << 8) | self.next_byte()? as u32;
        }
        Ok(out)
    }

    fn read_f64(&mut self) -> VmResult<f64> {
        let mut bytes = [0u8; 8];
        for byte in &mut bytes {
            *byte = self.next_byte()?;
        }
        Ok(f64::from_be_bytes(bytes))
    }

    /// Length-prefixed string: payload bytes are character codes.
    fn decode_string(&mut self) -> VmResult<String> {
        let len = self.read_u16()? as usize;
        let mut out = String::with_capacity(len);
        for _ in 0..len {
            out.push(self.next_byte()? as char);
        }
        Ok(out)
    }

    /// Length-prefixed register array: each payload byte is a register index
    /// resolved to its current value.
    fn decode_reg_array(&mut self) -> VmResult<SmallVec<[Value; 8]>> {
        let count = self.read_u16()? as usize;
        let mut values = SmallVec::with_capacity(count);
        for _ in 0..count {
            let index = self.next_byte()?;
            values.push(self.get(index).clone());
        }
        Ok(values)
    }

    // Dispatch

    fn execute(&mut self, opcode: Opcode) -> VmResult<()> {
        match opcode {
            Opcode::LoadString => {
                let dst = self.next_byte()?;
                let string = self.decode_string()?;
                self.set(dst, Value::string(string));
            }

            Opcode::LoadNum => {
                let dst = self.next_byte()?;
                let imm = self.next_byte()?;
                self.set(dst, Value::Number(imm as f64));
            }

            Opcode::LoadFloatNum => {
                let dst = self.next_byte()?;
                let imm = self.read_f64()?;
                self.set(dst, Value::Number(imm));
            }

            Opcode::LoadLongNum => {
                let dst = self.next_byte()?;
                let imm = self.read_u32()?;
                self.set(dst, Value::Number(imm as f64));
            }

            Opcode::LoadArray => {
                let dst = self.next_byte()?;
                let values = self.decode_reg_array()?;
                self.set(dst, Value::array(values.into_vec()));
            }

            Opcode::Copy => {
                let dst = self.next_byte()?;
                let src = self.next_byte()?;
                self.set(dst, self.get(src).clone());
            }

            Opcode::Add => {
                let dst = self.next_byte()?;
                let src = self.next_byte()?;
                let a = self.get(dst).clone();
                let b = self.get(src).clone();
                let result = match (&a, &b) {
                    (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                    (Value::String(x), y) => Value::string(format!("{}{}", x, y)),
                    (x, Value::String(y)) => Value::string(format!("{}{}", x, y)),
                    _ => {
                        let found = if a.as_number().is_some() { &b } else { &a };
                        return Err(VmError::type_mismatch(
                            "ADD",
                            "number or string",
                            found.type_name(),
                        ));
                    }
                };
                self.set(dst, result);
            }

            Opcode::Sub => self.binary_number_op("SUB", |a, b| a - b)?,
            Opcode::Mul => self.binary_number_op("MUL", |a, b| a * b)?,
            // IEEE-754 division: dividing by zero yields an infinity.
            Opcode::Div => self.binary_number_op("DIV", |a, b| a / b)?,

            Opcode::CompEqual => self.equality_op(|a, b| a.loose_eq(b))?,
            Opcode::CompNotEqual => self.equality_op(|a, b| !a.loose_eq(b))?,
            Opcode::CompStrictEqual => self.equality_op(|a, b| a.strict_eq(b))?,
            Opcode::CompStrictNotEqual => self.equality_op(|a, b| !a.strict_eq(b))?,
            Opcode::CompLessThan => self.ordering_op("COMP_LESS_THAN", |o| o.is_lt())?,
            Opcode::CompGreaterThan => self.ordering_op("COMP_GREATER_THAN", |o| o.is_gt())?,
            Opcode::CompLessThanEqual => self.ordering_op("COMP_LESS_THAN_EQUAL", |o| o.is_le())?,
            Opcode::CompGreaterThanEqual => {
                self.ordering_op("COMP_GREATER_THAN_EQUAL", |o| o.is_ge())?
            }

            Opcode::JumpCond => {
                let cond = self.next_byte()?;
                let delta = self.next_byte()?;
                if self.get(cond).is_truthy() {
                    self.jump_by("JUMP_COND", delta)?;
                }
            }

            Opcode::JumpCondNeg => {
                let cond = self.next_byte()?;
                let delta = self.next_byte()?;
                if !self.get(cond).is_truthy() {
                    self.jump_by("JUMP_COND_NEG", delta)?;
                }
            }

            Opcode::Jump => {
                let delta = self.next_byte()?;
                self.jump_by("JUMP", delta)?;
            }

            Opcode::PropAccess => {
                let dst = self.next_byte()?;
                let obj = self.next_byte()?;
                let prop = self.next_byte()?;
                let object = self.get(obj).clone();
                let key = self.get(prop).clone();
                let value = property(&object, &key)?;
                self.set(dst, value);
            }

            Opcode::FuncCall => {
                let dst = self.next_byte()?;
                let func = self.next_byte()?;
                let this = self.next_byte()?;
                let args = self.decode_reg_array()?;
                let callee = self.get(func).clone();
                let receiver = self.get(this).clone();
                let result = match &callee {
                    Value::Function(callee) => {
                        (callee.func)(&receiver, &args).map_err(VmError::HostCallFailure)?
                    }
                    other => {
                        return Err(VmError::type_mismatch(
                            "FUNC_CALL",
                            "function",
                            other.type_name(),
                        ));
                    }
                };
                self.set(dst, result);
            }

            Opcode::Eval => {
                let dst = self.next_byte()?;
                let src = self.next_byte()?;
                let source = match self.get(src) {
                    Value::String(s) => s.clone(),
                    other => {
                        return Err(VmError::type_mismatch(
                            "EVAL",
                            "string",
                            other.type_name(),
                        ));
                    }
                };
                let result = self
                    .host_eval
                    .eval(&source)
                    .map_err(VmError::HostEvaluationFailure)?;
                self.set(dst, result);
            }

            Opcode::CallBcFunc => {
                let target = self.read_u16()? as usize;
                if target > self.code.len() {
                    return Err(VmError::OutOfBounds {
                        offset: target,
                        len: self.code.len(),
                    });
                }
                // Snapshot after the operand read, so the saved stack
                // pointer is the return address. The snapshot lands in the
                // single backup register; a nested call overwrites it.
                let snapshot = self.regs.clone();
                self.set(reg::BACKUP, Value::array(snapshot));
                self.set_sp(target);
            }

            Opcode::ReturnBcFunc => {
                let backup = self.get(reg::BACKUP).clone();
                let Value::Array(snapshot) = backup else {
                    return Err(VmError::type_mismatch(
                        "RETURN_BCFUNC",
                        "register snapshot",
                        backup.type_name(),
                    ));
                };
                let mut restored = snapshot.borrow().clone();
                if restored.len() != NUM_REGISTERS {
                    return Err(VmError::type_mismatch(
                        "RETURN_BCFUNC",
                        "register snapshot",
                        "array",
                    ));
                }
                // The callee's return value survives the restore; everything
                // else, the stack pointer included, reverts to its pre-call
                // state.
                restored[reg::RETURN_VAL as usize] = self.get(reg::RETURN_VAL).clone();
                self.regs = restored;
            }

            Opcode::Exit => {
                let len = self.code.len();
                self.set_sp(len);
            }
        }

        Ok(())
    }

    // Handler helpers

    fn binary_number_op(&mut self, op: &'static str, apply: fn(f64, f64) -> f64) -> VmResult<()> {
        let dst = self.next_byte()?;
        let src = self.next_byte()?;
        let a = self.number_in(op, dst)?;
        let b = self.number_in(op, src)?;
        self.set(dst, Value::Number(apply(a, b)));
        Ok(())
    }

    fn equality_op(&mut self, apply: fn(&Value, &Value) -> bool) -> VmResult<()> {
        let dst = self.next_byte()?;
        let a = self.next_byte()?;
        let b = self.next_byte()?;
        let result = apply(self.get(a), self.get(b));
        self.set(dst, Value::Bool(result));
        Ok(())
    }

    fn ordering_op(
        &mut self,
        op: &'static str,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> VmResult<()> {
        let dst = self.next_byte()?;
        let a = self.next_byte()?;
        let b = self.next_byte()?;
        let left = self.get(a).clone();
        let right = self.get(b).clone();
        let result = match (&left, &right) {
            // NaN is unordered: every relational comparison against it is false.
            (Value::Number(x), Value::Number(y)) => {
                x.partial_cmp(y).map(accept).unwrap_or(false)
            }
            (Value::String(x), Value::String(y)) => accept(x.cmp(y)),
            _ => {
                return Err(VmError::type_mismatch(
                    op,
                    "two numbers or two strings",
                    left.type_name(),
                ));
            }
        };
        self.set(dst, Value::Bool(result));
        Ok(())
    }

    fn number_in(&self, op: &'static str, index: u8) -> VmResult<f64> {
        self.get(index)
            .as_number()
            .ok_or_else(|| VmError::type_mismatch(op, "number", self.get(index).type_name()))
    }

    /// Relative jump by the signed value of a register, applied to the
    /// pointer position after this instruction's operands.
    fn jump_by(&mut self, op: &'static str, delta_reg: u8) -> VmResult<()> {
        let delta = self
            .get(delta_reg)
            .as_number()
            .ok_or_else(|| VmError::type_mismatch(op, "number", self.get(delta_reg).type_name()))?;
        let target = self.sp() as i64 + delta as i64;
        if target < 0 || target > self.code.len() as i64 {
            return Err(VmError::OutOfBounds {
                offset: target.max(0) as usize,
                len: self.code.len(),
            });
        }
        self.set_sp(target as usize);
        Ok(())
    }
}

/// Dynamic property read on a host value, JS-style: object keys coerce to
/// their display string, arrays and strings answer `length` and numeric
/// indices, missing properties read as void.
fn property(object: &Value, key: &Value) -> VmResult<Value> {
    match object {
        Value::Object(obj) => Ok(obj.borrow().get(&key.to_string())),
        Value::Array(arr) => {
            let arr = arr.borrow();
            if key.as_string() == Some("length") {
                return Ok(Value::Number(arr.len() as f64));
            }
            Ok(match index_of(key, arr.len()) {
                Some(i) => arr[i].clone(),
                None => Value::Void,
            })
        }
        Value::String(s) => {
            if key.as_string() == Some("length") {
                return Ok(Value::Number(s.chars().count() as f64));
            }
            Ok(match index_of(key, s.chars().count()) {
                Some(i) => s
                    .chars()
                    .nth(i)
                    .map(|c| Value::string(c.to_string()))
                    .unwrap_or(Value::Void),
                None => Value::Void,
            })
        }
        other => Err(VmError::type_mismatch(
            "PROPACCESS",
            "object, array or string",
            other.type_name(),
        )),
    }
}

fn index_of(key: &Value, len: usize) -> Option<usize> {
    let n = key.as_number()?;
    if n.fract() != 0.0 || n < 0.0 || n >= len as f64 {
        return None;
    }
    Some(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::value::HostObject;

    const R0: u8 = 10;
    const R1: u8 = 11;
    const R2: u8 = 12;
    const R3: u8 = 13;
    const R4: u8 = 14;

    /// Byte-stream builder for test programs.
    #[derive(Default)]
    struct Asm(Vec<u8>);

    impl Asm {
        fn op(mut self, opcode: Opcode) -> Self {
            self.0.push(opcode as u8);
            self
        }

        fn byte(mut self, byte: u8) -> Self {
            self.0.push(byte);
            self
        }

        fn word(mut self, word: u16) -> Self {
            self.0.extend_from_slice(&word.to_be_bytes());
            self
        }

        fn str_lit(mut self, s: &str) -> Self {
            self = self.word(s.len() as u16);
            self.0.extend_from_slice(s.as_bytes());
            self
        }

        fn load_num(self, dst: u8, imm: u8) -> Self {
            self.op(Opcode::LoadNum).byte(dst).byte(imm)
        }

        fn copy(self, dst: u8, src: u8) -> Self {
            self.op(Opcode::Copy).byte(dst).byte(src)
        }

        fn build(self) -> Vec<u8> {
            self.0
        }

        fn vm(self) -> Vm {
            Vm::new(self.build(), HostBindings::default())
        }
    }

    fn run(asm: Asm) -> VmResult<Value> {
        asm.vm().run()
    }

    fn global_with(key: &str, value: Value) -> HostBindings {
        let mut global = HostObject::new();
        global.set(key, value);
        HostBindings::new(Value::object_from(global), Value::object())
    }

    #[test]
    fn test_initial_register_state() {
        let vm = Asm::default().vm();
        assert_eq!(*vm.get(reg::STACK_PTR), Value::Number(0.0));
        assert_eq!(*vm.get(reg::RETURN_VAL), Value::Number(0.0));
        assert_eq!(*vm.get(reg::VOID), Value::Void);
        assert!(matches!(vm.get(reg::EMPTY_OBJECT), Value::Object(_)));
        assert_eq!(*vm.get(R0), Value::Void);
    }

    #[test]
    fn test_add_program_sums_immediates() {
        let result = run(Asm::default()
            .load_num(R0, 3)
            .load_num(R1, 4)
            .op(Opcode::Add)
            .byte(R0)
            .byte(R1)
            .copy(reg::RETURN_VAL, R0))
        .unwrap();
        assert_eq!(result, Value::Number(7.0));
    }

    #[test]
    fn test_mul_program() {
        let mut vm = Asm::default()
            .load_num(R0, 6)
            .load_num(R1, 7)
            .op(Opcode::Mul)
            .byte(R0)
            .byte(R1)
            .vm();
        vm.run().unwrap();
        assert_eq!(*vm.get(R0), Value::Number(42.0));
    }

    #[test]
    fn test_sub_and_div() {
        let mut vm = Asm::default()
            .load_num(R0, 10)
            .load_num(R1, 4)
            .op(Opcode::Sub)
            .byte(R0)
            .byte(R1)
            .load_num(R2, 12)
            .load_num(R3, 3)
            .op(Opcode::Div)
            .byte(R2)
            .byte(R3)
            .vm();
        vm.run().unwrap();
        assert_eq!(*vm.get(R0), Value::Number(6.0));
        assert_eq!(*vm.get(R2), Value::Number(4.0));
    }

    #[test]
    fn test_division_by_zero_yields_infinity() {
        let mut vm = Asm::default()
            .load_num(R0, 1)
            .load_num(R1, 0)
            .op(Opcode::Div)
            .byte(R0)
            .byte(R1)
            .vm();
        vm.run().unwrap();
        assert_eq!(*vm.get(R0), Value::Number(f64::INFINITY));
    }

    #[test]
    fn test_add_concatenates_strings() {
        let result = run(Asm::default()
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("answer: ")
            .load_num(R1, 42)
            .op(Opcode::Add)
            .byte(R0)
            .byte(R1)
            .copy(reg::RETURN_VAL, R0))
        .unwrap();
        assert_eq!(result, Value::string("answer: 42"));
    }

    #[test]
    fn test_arithmetic_on_wrong_kind_is_type_mismatch() {
        // R0 still holds void
        let err = run(Asm::default()
            .load_num(R1, 1)
            .op(Opcode::Mul)
            .byte(R0)
            .byte(R1))
        .unwrap_err();
        assert!(matches!(err, VmError::TypeMismatch { op: "MUL", .. }));
    }

    #[test]
    fn test_load_string_decodes_payload() {
        let result = run(Asm::default()
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("hello")
            .copy(reg::RETURN_VAL, R0))
        .unwrap();
        assert_eq!(result, Value::string("hello"));
    }

    #[test]
    fn test_wide_immediates() {
        let mut code = Asm::default().op(Opcode::LoadLongNum).byte(R0).build();
        code.extend_from_slice(&70000u32.to_be_bytes());
        code.push(Opcode::LoadFloatNum as u8);
        code.push(R1);
        code.extend_from_slice(&3.5f64.to_be_bytes());
        let mut vm = Vm::new(code, HostBindings::default());
        vm.run().unwrap();
        assert_eq!(*vm.get(R0), Value::Number(70000.0));
        assert_eq!(*vm.get(R1), Value::Number(3.5));
    }

    #[test]
    fn test_load_array_resolves_registers() {
        let result = run(Asm::default()
            .load_num(R0, 3)
            .load_num(R1, 4)
            .op(Opcode::LoadArray)
            .byte(R2)
            .word(2)
            .byte(R0)
            .byte(R1)
            .copy(reg::RETURN_VAL, R2))
        .unwrap();
        let Value::Array(arr) = result else {
            panic!("expected an array");
        };
        assert_eq!(*arr.borrow(), vec![Value::Number(3.0), Value::Number(4.0)]);
    }

    #[test]
    fn test_cond_jump_taken_skips_by_delta() {
        // Delta 3 skips the LOAD_NUM that would clobber the return value.
        let result = run(Asm::default()
            .load_num(R0, 1)
            .load_num(R1, 3)
            .op(Opcode::JumpCond)
            .byte(R0)
            .byte(R1)
            .load_num(reg::RETURN_VAL, 99))
        .unwrap();
        assert_eq!(result, Value::Number(0.0));
    }

    #[test]
    fn test_cond_jump_not_taken_continues_in_sequence() {
        let result = run(Asm::default()
            .load_num(R0, 0)
            .load_num(R1, 3)
            .op(Opcode::JumpCond)
            .byte(R0)
            .byte(R1)
            .load_num(reg::RETURN_VAL, 99))
        .unwrap();
        assert_eq!(result, Value::Number(99.0));
    }

    #[test]
    fn test_jump_cond_neg_jumps_on_falsy() {
        let result = run(Asm::default()
            .load_num(R1, 3)
            .op(Opcode::JumpCondNeg)
            .byte(reg::VOID)
            .byte(R1)
            .load_num(reg::RETURN_VAL, 99))
        .unwrap();
        assert_eq!(result, Value::Number(0.0));
    }

    #[test]
    fn test_backward_jump_builds_a_loop() {
        // Count R0 down from 3; the loop body runs three times.
        let result = run(Asm::default()
            .load_num(R0, 3) // 0
            .load_num(R1, 1) // 3
            .load_num(R2, 0) // 6
            .load_num(R3, 6) // 9
            .op(Opcode::Sub) // 12: R2 = -6
            .byte(R2)
            .byte(R3)
            .op(Opcode::Sub) // 15: loop body, R0 -= 1
            .byte(R0)
            .byte(R1)
            .op(Opcode::JumpCond) // 18: while R0 truthy, back to 15
            .byte(R0)
            .byte(R2)
            .copy(reg::RETURN_VAL, R0)) // 21
        .unwrap();
        assert_eq!(result, Value::Number(0.0));
    }

    #[test]
    fn test_jump_out_of_stream_is_out_of_bounds() {
        let err = run(Asm::default()
            .load_num(R0, 200)
            .op(Opcode::Jump)
            .byte(R0))
        .unwrap_err();
        assert!(matches!(err, VmError::OutOfBounds { .. }));
    }

    #[test]
    fn test_call_and_return_restore_registers() {
        // main:          callee at 7:
        //  0 R0 = 5       7 R0 = 42   (clobbered, must revert)
        //  3 call @7     10 R1 = 9    (callee temp, must revert)
        //  6 exit        13 RETURN_VAL = R0
        //                16 return
        let mut vm = Asm::default()
            .load_num(R0, 5)
            .op(Opcode::CallBcFunc)
            .word(7)
            .op(Opcode::Exit)
            .load_num(R0, 42)
            .load_num(R1, 9)
            .copy(reg::RETURN_VAL, R0)
            .op(Opcode::ReturnBcFunc)
            .vm();
        let result = vm.run().unwrap();
        assert_eq!(result, Value::Number(42.0));
        assert_eq!(*vm.get(R0), Value::Number(5.0));
        assert_eq!(*vm.get(R1), Value::Void);
    }

    #[test]
    fn test_return_without_call_is_a_fault() {
        let err = run(Asm::default().op(Opcode::ReturnBcFunc)).unwrap_err();
        assert!(matches!(
            err,
            VmError::TypeMismatch {
                op: "RETURN_BCFUNC",
                ..
            }
        ));
    }

    #[test]
    fn test_call_target_past_stream_is_out_of_bounds() {
        let err = run(Asm::default().op(Opcode::CallBcFunc).word(500)).unwrap_err();
        assert!(matches!(err, VmError::OutOfBounds { offset: 500, .. }));
    }

    #[test]
    fn test_unknown_opcode_halts() {
        let err = run(Asm::default().byte(0)).unwrap_err();
        assert_eq!(
            err,
            VmError::UnknownOpcode {
                opcode: 0,
                offset: 0
            }
        );
    }

    #[test]
    fn test_truncated_operand_is_out_of_bounds() {
        let err = run(Asm::default().op(Opcode::LoadNum).byte(R0)).unwrap_err();
        assert!(matches!(err, VmError::OutOfBounds { offset: 2, len: 2 }));
    }

    #[test]
    fn test_exit_terminates_immediately() {
        let result = run(Asm::default()
            .load_num(R0, 1)
            .op(Opcode::Exit)
            .load_num(reg::RETURN_VAL, 99))
        .unwrap();
        assert_eq!(result, Value::Number(0.0));
    }

    #[test]
    fn test_propaccess_reads_host_objects() {
        let bindings = global_with("answer", Value::Number(42.0));
        let code = Asm::default()
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("answer")
            .op(Opcode::PropAccess)
            .byte(R1)
            .byte(reg::GLOBAL)
            .byte(R0)
            .copy(reg::RETURN_VAL, R1)
            .build();
        let result = Vm::new(code, bindings).run().unwrap();
        assert_eq!(result, Value::Number(42.0));
    }

    #[test]
    fn test_propaccess_missing_key_reads_void() {
        let code = Asm::default()
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("missing")
            .op(Opcode::PropAccess)
            .byte(R1)
            .byte(reg::GLOBAL)
            .byte(R0)
            .copy(reg::RETURN_VAL, R1)
            .build();
        let result = Vm::new(code, HostBindings::default()).run().unwrap();
        assert_eq!(result, Value::Void);
    }

    #[test]
    fn test_propaccess_array_length_and_index() {
        let mut vm = Asm::default()
            .load_num(R0, 3)
            .load_num(R1, 4)
            .op(Opcode::LoadArray)
            .byte(R2)
            .word(2)
            .byte(R0)
            .byte(R1)
            .op(Opcode::LoadString)
            .byte(R3)
            .str_lit("length")
            .op(Opcode::PropAccess)
            .byte(R3)
            .byte(R2)
            .byte(R3)
            .load_num(R4, 1)
            .op(Opcode::PropAccess)
            .byte(R4)
            .byte(R2)
            .byte(R4)
            .vm();
        vm.run().unwrap();
        assert_eq!(*vm.get(R3), Value::Number(2.0));
        assert_eq!(*vm.get(R4), Value::Number(4.0));
    }

    #[test]
    fn test_propaccess_string_length_and_index() {
        let mut vm = Asm::default()
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("hello")
            .op(Opcode::LoadString)
            .byte(R1)
            .str_lit("length")
            .op(Opcode::PropAccess)
            .byte(R1)
            .byte(R0)
            .byte(R1)
            .load_num(R2, 1)
            .op(Opcode::PropAccess)
            .byte(R2)
            .byte(R0)
            .byte(R2)
            .vm();
        vm.run().unwrap();
        assert_eq!(*vm.get(R1), Value::Number(5.0));
        assert_eq!(*vm.get(R2), Value::string("e"));
    }

    #[test]
    fn test_propaccess_on_number_is_type_mismatch() {
        let err = run(Asm::default()
            .load_num(R0, 1)
            .op(Opcode::PropAccess)
            .byte(R1)
            .byte(R0)
            .byte(R0))
        .unwrap_err();
        assert!(matches!(
            err,
            VmError::TypeMismatch {
                op: "PROPACCESS",
                ..
            }
        ));
    }

    #[test]
    fn test_func_call_passes_receiver_and_args() {
        let bindings = global_with(
            "sum",
            Value::native("sum", |this, args| {
                if !matches!(this, Value::Object(_)) {
                    return Err("receiver must be an object".to_string());
                }
                let total = args.iter().filter_map(Value::as_number).sum::<f64>();
                Ok(Value::Number(total))
            }),
        );
        let code = Asm::default()
            .load_num(R2, 3)
            .load_num(R3, 4)
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("sum")
            .op(Opcode::PropAccess)
            .byte(R1)
            .byte(reg::GLOBAL)
            .byte(R0)
            .op(Opcode::FuncCall)
            .byte(R4)
            .byte(R1)
            .byte(reg::GLOBAL)
            .word(2)
            .byte(R2)
            .byte(R3)
            .copy(reg::RETURN_VAL, R4)
            .build();
        let result = Vm::new(code, bindings).run().unwrap();
        assert_eq!(result, Value::Number(7.0));
    }

    #[test]
    fn test_func_call_on_non_callable_is_type_mismatch() {
        let err = run(Asm::default()
            .load_num(R0, 1)
            .op(Opcode::FuncCall)
            .byte(R1)
            .byte(R0)
            .byte(reg::GLOBAL)
            .word(0))
        .unwrap_err();
        assert!(matches!(
            err,
            VmError::TypeMismatch {
                op: "FUNC_CALL",
                ..
            }
        ));
    }

    #[test]
    fn test_func_call_host_error_propagates() {
        let bindings = global_with(
            "boom",
            Value::native("boom", |_, _| Err("exploded".to_string())),
        );
        let code = Asm::default()
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("boom")
            .op(Opcode::PropAccess)
            .byte(R1)
            .byte(reg::GLOBAL)
            .byte(R0)
            .op(Opcode::FuncCall)
            .byte(R2)
            .byte(R1)
            .byte(reg::GLOBAL)
            .word(0)
            .build();
        let err = Vm::new(code, bindings).run().unwrap_err();
        assert_eq!(err, VmError::HostCallFailure("exploded".to_string()));
    }

    #[test]
    fn test_eval_routes_through_installed_evaluator() {
        let code = Asm::default()
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("2 + 2")
            .op(Opcode::Eval)
            .byte(R1)
            .byte(R0)
            .copy(reg::RETURN_VAL, R1)
            .build();
        let mut vm = Vm::new(code, HostBindings::default())
            .with_host_eval(|source: &str| Ok(Value::string(format!("evaluated: {}", source))));
        let result = vm.run().unwrap();
        assert_eq!(result, Value::string("evaluated: 2 + 2"));
    }

    #[test]
    fn test_eval_without_evaluator_fails_distinctly() {
        let err = run(Asm::default()
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("1")
            .op(Opcode::Eval)
            .byte(R1)
            .byte(R0))
        .unwrap_err();
        assert!(matches!(err, VmError::HostEvaluationFailure(_)));
    }

    #[test]
    fn test_eval_on_non_string_is_type_mismatch() {
        let err = run(Asm::default()
            .load_num(R0, 1)
            .op(Opcode::Eval)
            .byte(R1)
            .byte(R0))
        .unwrap_err();
        assert!(matches!(err, VmError::TypeMismatch { op: "EVAL", .. }));
    }

    #[test]
    fn test_loose_and_strict_equality_opcodes() {
        let mut vm = Asm::default()
            .load_num(R0, 7)
            .op(Opcode::LoadString)
            .byte(R1)
            .str_lit("7")
            .op(Opcode::CompEqual)
            .byte(R2)
            .byte(R0)
            .byte(R1)
            .op(Opcode::CompStrictEqual)
            .byte(R3)
            .byte(R0)
            .byte(R1)
            .vm();
        vm.run().unwrap();
        assert_eq!(*vm.get(R2), Value::Bool(true));
        assert_eq!(*vm.get(R3), Value::Bool(false));
    }

    #[test]
    fn test_relational_comparisons() {
        let mut vm = Asm::default()
            .load_num(R0, 3)
            .load_num(R1, 4)
            .op(Opcode::CompLessThan)
            .byte(R2)
            .byte(R0)
            .byte(R1)
            .op(Opcode::CompGreaterThanEqual)
            .byte(R3)
            .byte(R0)
            .byte(R1)
            .vm();
        vm.run().unwrap();
        assert_eq!(*vm.get(R2), Value::Bool(true));
        assert_eq!(*vm.get(R3), Value::Bool(false));
    }

    #[test]
    fn test_comparison_of_unordered_kinds_is_type_mismatch() {
        let err = run(Asm::default()
            .load_num(R0, 1)
            .op(Opcode::CompLessThan)
            .byte(R2)
            .byte(R0)
            .byte(reg::VOID))
        .unwrap_err();
        assert!(matches!(err, VmError::TypeMismatch { .. }));
    }

    #[test]
    fn test_document_root_is_reachable() {
        let mut document = HostObject::new();
        document.set("title", Value::string("home"));
        let bindings = HostBindings::new(Value::object(), Value::object_from(document));
        let code = Asm::default()
            .op(Opcode::LoadString)
            .byte(R0)
            .str_lit("title")
            .op(Opcode::PropAccess)
            .byte(R1)
            .byte(reg::DOCUMENT)
            .byte(R0)
            .copy(reg::RETURN_VAL, R1)
            .build();
        let result = Vm::new(code, bindings).run().unwrap();
        assert_eq!(result, Value::string("home"));
    }
}
