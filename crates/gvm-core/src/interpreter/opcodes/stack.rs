use crate::frame::Frame;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::Interpreter;
use crate::value::Slot;
use crate::VmResult;
use gvm_classfile::Opcode;

/// Push slot groups in order, bottom first
fn push_all(frame: &mut Frame, groups: &[&[Slot]]) -> VmResult<()> {
    for slot in groups.iter().flat_map(|g| g.iter()) {
        frame.push(slot.clone())?;
    }
    Ok(())
}

impl<'a> Interpreter<'a> {
    /// Stack shuffles move raw slots; `take_slots` refuses to cut a long or
    /// double in half, which covers both forms of every `pop2`/`dup2` variant
    pub(in crate::interpreter) fn exec_stack_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        match opcode {
            Opcode::Pop => {
                frame.take_slots(1)?;
            }

            Opcode::Pop2 => {
                frame.take_slots(2)?;
            }

            Opcode::Dup => {
                let v = frame.take_slots(1)?;
                push_all(frame, &[&v, &v])?;
            }

            Opcode::DupX1 => {
                let v1 = frame.take_slots(1)?;
                let v2 = frame.take_slots(1)?;
                push_all(frame, &[&v1, &v2, &v1])?;
            }

            Opcode::DupX2 => {
                let v1 = frame.take_slots(1)?;
                let below = frame.take_slots(2)?;
                push_all(frame, &[&v1, &below, &v1])?;
            }

            Opcode::Dup2 => {
                let top = frame.take_slots(2)?;
                push_all(frame, &[&top, &top])?;
            }

            Opcode::Dup2X1 => {
                let top = frame.take_slots(2)?;
                let below = frame.take_slots(1)?;
                push_all(frame, &[&top, &below, &top])?;
            }

            Opcode::Dup2X2 => {
                let top = frame.take_slots(2)?;
                let below = frame.take_slots(2)?;
                push_all(frame, &[&top, &below, &top])?;
            }

            Opcode::Swap => {
                let v1 = frame.take_slots(1)?;
                let v2 = frame.take_slots(1)?;
                push_all(frame, &[&v1, &v2])?;
            }

            _ => unreachable!("Not a stack opcode: {:?}", opcode),
        }
        Ok(OpcodeResult::Continue)
    }
}
