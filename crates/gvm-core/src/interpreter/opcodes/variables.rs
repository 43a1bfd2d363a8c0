use crate::frame::Frame;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::{Instruction, Interpreter, ValueKind};
use crate::value::{Slot, Value};
use crate::VmResult;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_variable_ops(
        &mut self,
        frame: &mut Frame,
        instruction: Instruction,
    ) -> VmResult<OpcodeResult> {
        match instruction {
            Instruction::Load(kind, index) => {
                let value = frame.load_local(index as usize, kind.name())?;
                frame.push_value(value)?;
            }

            // astore also accepts the return address pushed by jsr
            Instruction::Store(ValueKind::Reference, index) => {
                let slot = frame.pop_single()?;
                match slot {
                    Slot::Reference(_) | Slot::ReturnAddress(_) => frame.set_local(index as usize, slot)?,
                    other => return Err(other.mismatch("reference")),
                }
            }

            Instruction::Store(kind, index) => {
                let value = match kind {
                    ValueKind::Int => Value::Int(frame.pop_int()?),
                    ValueKind::Long => Value::Long(frame.pop_long()?),
                    ValueKind::Float => Value::Float(frame.pop_float()?),
                    ValueKind::Double => Value::Double(frame.pop_double()?),
                    ValueKind::Reference => Value::Reference(frame.pop_ref()?),
                };
                frame.store_local(index as usize, value)?;
            }

            Instruction::Iinc { index, delta } => {
                let index = index as usize;
                let value = frame.load_local(index, "int")?.as_int()?;
                frame.store_local(index, Value::Int(value.wrapping_add(delta as i32)))?;
            }

            other => unreachable!("Not a variable instruction: {:?}", other),
        }
        Ok(OpcodeResult::Continue)
    }
}
