use crate::frame::Frame;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::Interpreter;
use crate::{VmError, VmResult};
use gvm_classfile::Opcode;

const DIVIDE_BY_ZERO: &str = "/ by zero";

impl<'a> Interpreter<'a> {
    /// Integer arithmetic wraps; shift distances use the low 5 (int) or 6
    /// (long) bits; division by zero is a fault
    pub(in crate::interpreter) fn exec_arithmetic_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        match opcode {
            // ===== int =====
            Opcode::Iadd | Opcode::Isub | Opcode::Imul | Opcode::Idiv | Opcode::Irem
            | Opcode::Ishl | Opcode::Ishr | Opcode::Iushr | Opcode::Iand | Opcode::Ior
            | Opcode::Ixor => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                let result = match opcode {
                    Opcode::Iadd => a.wrapping_add(b),
                    Opcode::Isub => a.wrapping_sub(b),
                    Opcode::Imul => a.wrapping_mul(b),
                    Opcode::Idiv if b == 0 => return Err(VmError::ArithmeticException(DIVIDE_BY_ZERO)),
                    Opcode::Idiv => a.wrapping_div(b),
                    Opcode::Irem if b == 0 => return Err(VmError::ArithmeticException(DIVIDE_BY_ZERO)),
                    Opcode::Irem => a.wrapping_rem(b),
                    Opcode::Ishl => a.wrapping_shl(b as u32 & 0x1f),
                    Opcode::Ishr => a.wrapping_shr(b as u32 & 0x1f),
                    Opcode::Iushr => ((a as u32) >> (b as u32 & 0x1f)) as i32,
                    Opcode::Iand => a & b,
                    Opcode::Ior => a | b,
                    _ => a ^ b,
                };
                frame.push_int(result)?;
            }

            Opcode::Ineg => {
                let a = frame.pop_int()?;
                frame.push_int(a.wrapping_neg())?;
            }

            // ===== long =====
            Opcode::Lshl | Opcode::Lshr | Opcode::Lushr => {
                let distance = frame.pop_int()? as u32 & 0x3f;
                let a = frame.pop_long()?;
                let result = match opcode {
                    Opcode::Lshl => a.wrapping_shl(distance),
                    Opcode::Lshr => a.wrapping_shr(distance),
                    _ => ((a as u64) >> distance) as i64,
                };
                frame.push_long(result)?;
            }

            Opcode::Ladd | Opcode::Lsub | Opcode::Lmul | Opcode::Ldiv | Opcode::Lrem
            | Opcode::Land | Opcode::Lor | Opcode::Lxor => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                let result = match opcode {
                    Opcode::Ladd => a.wrapping_add(b),
                    Opcode::Lsub => a.wrapping_sub(b),
                    Opcode::Lmul => a.wrapping_mul(b),
                    Opcode::Ldiv if b == 0 => return Err(VmError::ArithmeticException(DIVIDE_BY_ZERO)),
                    Opcode::Ldiv => a.wrapping_div(b),
                    Opcode::Lrem if b == 0 => return Err(VmError::ArithmeticException(DIVIDE_BY_ZERO)),
                    Opcode::Lrem => a.wrapping_rem(b),
                    Opcode::Land => a & b,
                    Opcode::Lor => a | b,
                    _ => a ^ b,
                };
                frame.push_long(result)?;
            }

            Opcode::Lneg => {
                let a = frame.pop_long()?;
                frame.push_long(a.wrapping_neg())?;
            }

            // ===== float =====
            Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv | Opcode::Frem => {
                let b = frame.pop_float()?;
                let a = frame.pop_float()?;
                let result = match opcode {
                    Opcode::Fadd => a + b,
                    Opcode::Fsub => a - b,
                    Opcode::Fmul => a * b,
                    Opcode::Fdiv => a / b,
                    _ => a % b,
                };
                frame.push_float(result)?;
            }

            Opcode::Fneg => {
                let a = frame.pop_float()?;
                frame.push_float(-a)?;
            }

            // ===== double =====
            Opcode::Dadd | Opcode::Dsub | Opcode::Dmul | Opcode::Ddiv | Opcode::Drem => {
                let b = frame.pop_double()?;
                let a = frame.pop_double()?;
                let result = match opcode {
                    Opcode::Dadd => a + b,
                    Opcode::Dsub => a - b,
                    Opcode::Dmul => a * b,
                    Opcode::Ddiv => a / b,
                    _ => a % b,
                };
                frame.push_double(result)?;
            }

            Opcode::Dneg => {
                let a = frame.pop_double()?;
                frame.push_double(-a)?;
            }

            _ => unreachable!("Not an arithmetic opcode: {:?}", opcode),
        }
        Ok(OpcodeResult::Continue)
    }
}
