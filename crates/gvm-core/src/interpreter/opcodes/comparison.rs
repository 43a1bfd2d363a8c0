use crate::frame::Frame;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::Interpreter;
use crate::VmResult;
use gvm_classfile::Opcode;
use std::cmp::Ordering;

fn ordering_to_int(ordering: Option<Ordering>, nan: i32) -> i32 {
    match ordering {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => nan,
    }
}

impl<'a> Interpreter<'a> {
    /// `*cmpl` pushes -1 when either operand is NaN, `*cmpg` pushes 1
    pub(in crate::interpreter) fn exec_comparison_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        let result = match opcode {
            Opcode::Lcmp => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                ordering_to_int(Some(a.cmp(&b)), 0)
            }
            Opcode::Fcmpl | Opcode::Fcmpg => {
                let b = frame.pop_float()?;
                let a = frame.pop_float()?;
                ordering_to_int(a.partial_cmp(&b), if opcode == Opcode::Fcmpg { 1 } else { -1 })
            }
            Opcode::Dcmpl | Opcode::Dcmpg => {
                let b = frame.pop_double()?;
                let a = frame.pop_double()?;
                ordering_to_int(a.partial_cmp(&b), if opcode == Opcode::Dcmpg { 1 } else { -1 })
            }
            _ => unreachable!("Not a comparison opcode: {:?}", opcode),
        };
        frame.push_int(result)?;
        Ok(OpcodeResult::Continue)
    }
}
