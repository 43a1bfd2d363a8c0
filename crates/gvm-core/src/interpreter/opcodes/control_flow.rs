use crate::frame::Frame;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::instruction::{Instruction, ValueKind};
use crate::interpreter::Interpreter;
use crate::value::{Slot, Value};
use crate::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// Branches record their target in `next_pc`; the dispatch loop moves
    /// the pc there after the handler returns
    pub(in crate::interpreter) fn exec_control_flow_ops(
        &mut self,
        frame: &mut Frame,
        instruction: Instruction,
    ) -> VmResult<OpcodeResult> {
        match instruction {
            Instruction::If(cond, target) => {
                let value = frame.pop_int()?;
                if cond.holds(value, 0) {
                    frame.next_pc = Some(target);
                }
            }

            Instruction::IfICmp(cond, target) => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                if cond.holds(a, b) {
                    frame.next_pc = Some(target);
                }
            }

            Instruction::IfACmp(eq, target) => {
                let b = frame.pop_ref()?;
                let a = frame.pop_ref()?;
                let same = match (&a, &b) {
                    (Some(a), Some(b)) => a.ptr_eq(b),
                    (None, None) => true,
                    _ => false,
                };
                if same == eq {
                    frame.next_pc = Some(target);
                }
            }

            Instruction::IfNull(is_null, target) => {
                if frame.pop_ref()?.is_none() == is_null {
                    frame.next_pc = Some(target);
                }
            }

            Instruction::Goto(target) => {
                frame.next_pc = Some(target);
            }

            Instruction::Jsr(target, return_address) => {
                frame.push(Slot::ReturnAddress(return_address))?;
                frame.next_pc = Some(target);
            }

            Instruction::Ret(index) => {
                let address = match frame.local(index as usize)? {
                    Slot::ReturnAddress(address) => *address,
                    other => return Err(other.mismatch("returnAddress")),
                };
                frame.next_pc = Some(address);
            }

            Instruction::TableSwitch { default, low, targets } => {
                let key = frame.pop_int()?;
                let offset = key as i64 - low as i64;
                let target = usize::try_from(offset)
                    .ok()
                    .and_then(|i| targets.get(i).copied())
                    .unwrap_or(default);
                frame.next_pc = Some(target);
            }

            Instruction::LookupSwitch { default, pairs } => {
                let key = frame.pop_int()?;
                let target = pairs
                    .binary_search_by_key(&key, |(k, _)| *k)
                    .map(|i| pairs[i].1)
                    .unwrap_or(default);
                frame.next_pc = Some(target);
            }

            Instruction::Return(kind) => return self.exec_return(frame, kind),

            other => unreachable!("Not a control flow instruction: {:?}", other),
        }
        Ok(OpcodeResult::Continue)
    }

    fn exec_return(&mut self, frame: &mut Frame, kind: Option<ValueKind>) -> VmResult<OpcodeResult> {
        let value = match kind {
            None => None,
            Some(ValueKind::Int) => Some(Value::Int(frame.pop_int()?)),
            Some(ValueKind::Long) => Some(Value::Long(frame.pop_long()?)),
            Some(ValueKind::Float) => Some(Value::Float(frame.pop_float()?)),
            Some(ValueKind::Double) => Some(Value::Double(frame.pop_double()?)),
            Some(ValueKind::Reference) => Some(Value::Reference(frame.pop_ref()?)),
        };

        let declared = &frame.method().signature.ret;
        let consistent = match (&value, declared) {
            (None, None) => true,
            (Some(value), Some(ty)) => value.matches(ty),
            _ => false,
        };
        if !consistent {
            return Err(VmError::TypeMismatch {
                expected: "return matching the method descriptor",
                found: format!("{:?} from {}", kind.map(ValueKind::name), frame.method().qualified_name()),
            });
        }
        Ok(OpcodeResult::Return(value))
    }
}
