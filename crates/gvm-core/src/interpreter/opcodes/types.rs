use crate::frame::Frame;
use crate::heap::ObjectRef;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::instruction::Instruction;
use crate::interpreter::Interpreter;
use crate::value::Slot;
use crate::{VmError, VmResult};
use gvm_classfile::Opcode;

impl<'a> Interpreter<'a> {
    /// Primitive conversions. Float to integer casts saturate and map NaN
    /// to zero, which is exactly what `as` does.
    pub(in crate::interpreter) fn exec_conversion_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
    ) -> VmResult<OpcodeResult> {
        match opcode {
            Opcode::I2l => {
                let v = frame.pop_int()?;
                frame.push_long(v as i64)?;
            }
            Opcode::I2f => {
                let v = frame.pop_int()?;
                frame.push_float(v as f32)?;
            }
            Opcode::I2d => {
                let v = frame.pop_int()?;
                frame.push_double(v as f64)?;
            }
            Opcode::L2i => {
                let v = frame.pop_long()?;
                frame.push_int(v as i32)?;
            }
            Opcode::L2f => {
                let v = frame.pop_long()?;
                frame.push_float(v as f32)?;
            }
            Opcode::L2d => {
                let v = frame.pop_long()?;
                frame.push_double(v as f64)?;
            }
            Opcode::F2i => {
                let v = frame.pop_float()?;
                frame.push_int(v as i32)?;
            }
            Opcode::F2l => {
                let v = frame.pop_float()?;
                frame.push_long(v as i64)?;
            }
            Opcode::F2d => {
                let v = frame.pop_float()?;
                frame.push_double(v as f64)?;
            }
            Opcode::D2i => {
                let v = frame.pop_double()?;
                frame.push_int(v as i32)?;
            }
            Opcode::D2l => {
                let v = frame.pop_double()?;
                frame.push_long(v as i64)?;
            }
            Opcode::D2f => {
                let v = frame.pop_double()?;
                frame.push_float(v as f32)?;
            }
            Opcode::I2b => {
                let v = frame.pop_int()?;
                frame.push_int(v as i8 as i32)?;
            }
            Opcode::I2c => {
                let v = frame.pop_int()?;
                frame.push_int(v as u16 as i32)?;
            }
            Opcode::I2s => {
                let v = frame.pop_int()?;
                frame.push_int(v as i16 as i32)?;
            }
            _ => unreachable!("Not a conversion opcode: {:?}", opcode),
        }
        Ok(OpcodeResult::Continue)
    }

    /// `checkcast` and `instanceof`; null passes the cast and is not an
    /// instance of anything
    pub(in crate::interpreter) fn exec_type_ops(
        &mut self,
        frame: &mut Frame,
        instruction: Instruction,
    ) -> VmResult<OpcodeResult> {
        match instruction {
            Instruction::CheckCast(index) => {
                let object = match frame.peek(0)? {
                    Slot::Reference(object) => object.clone(),
                    other => return Err(other.mismatch("reference")),
                };
                if let Some(object) = object {
                    let target = self.runtime.load_class(frame.class().constant_pool().class_name(index))?;
                    if !object.class().is_assignable_to(&target) {
                        return Err(VmError::ClassCast {
                            from: object.class().name().replace('/', "."),
                            to: target.name().replace('/', "."),
                        });
                    }
                }
            }

            Instruction::InstanceOf(index) => {
                let result = match frame.pop_ref()? {
                    Some(object) => self.is_instance(frame, &object, index)?,
                    None => false,
                };
                frame.push_int(result as i32)?;
            }

            other => unreachable!("Not a type instruction: {:?}", other),
        }
        Ok(OpcodeResult::Continue)
    }

    fn is_instance(&self, frame: &Frame, object: &ObjectRef, index: u16) -> VmResult<bool> {
        let target = self.runtime.load_class(frame.class().constant_pool().class_name(index))?;
        Ok(object.class().is_assignable_to(&target))
    }
}
