use crate::class::Class;
use crate::frame::Frame;
use crate::heap::{ArrayData, ArrayKind, ObjectRef};
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::instruction::Instruction;
use crate::interpreter::Interpreter;
use crate::value::Value;
use crate::{VmError, VmResult};
use std::sync::Arc;

/// Element access must use the opcode family of the array's element kind;
/// `baload`/`bastore` serve both byte and boolean arrays
fn check_kind(data: &ArrayData, expected: ArrayKind) -> VmResult<()> {
    let actual = data.kind();
    if actual == expected || (expected == ArrayKind::Byte && actual == ArrayKind::Boolean) {
        Ok(())
    } else {
        Err(VmError::TypeMismatch {
            expected: "array of the accessed element kind",
            found: format!("{:?}[]", actual),
        })
    }
}

/// Allocate nested arrays; `counts[0]` is the outermost length
fn allocate_dimensions(class: &Arc<Class>, counts: &[i32]) -> VmResult<ObjectRef> {
    let array = ObjectRef::new_array(class.clone(), counts[0])?;
    if counts.len() > 1 {
        let component = class
            .component()
            .ok_or_else(|| VmError::MalformedCode(format!("too many dimensions for {}", class.name())))?;
        for i in 0..counts[0] {
            let inner = allocate_dimensions(component, &counts[1..])?;
            array.with_array_data(|data| data.store(i, inner.into()))?;
        }
    }
    Ok(array)
}

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_array_ops(
        &mut self,
        frame: &mut Frame,
        instruction: Instruction,
    ) -> VmResult<OpcodeResult> {
        match instruction {
            Instruction::ArrayLoad(kind) => {
                let index = frame.pop_int()?;
                let array = frame.pop_object()?;
                let value = array.with_array_data(|data| {
                    check_kind(data, kind)?;
                    data.load(index)
                })?;
                frame.push_value(value)?;
            }

            Instruction::ArrayStore(kind) => {
                let value = match kind {
                    ArrayKind::Long => Value::Long(frame.pop_long()?),
                    ArrayKind::Float => Value::Float(frame.pop_float()?),
                    ArrayKind::Double => Value::Double(frame.pop_double()?),
                    ArrayKind::Reference => Value::Reference(frame.pop_ref()?),
                    _ => Value::Int(frame.pop_int()?),
                };
                let index = frame.pop_int()?;
                let array = frame.pop_object()?;

                if let (Value::Reference(Some(element)), Some(component)) = (&value, array.class().component()) {
                    if !element.class().is_assignable_to(component) {
                        return Err(VmError::ArrayStore(format!(
                            "{} into {}",
                            element.class().name(),
                            array.class().name()
                        )));
                    }
                }
                array.with_array_data(|data| {
                    check_kind(data, kind)?;
                    data.store(index, value)
                })?;
            }

            Instruction::NewArray(kind) => {
                let count = frame.pop_int()?;
                let array = self.runtime.new_primitive_array(kind, count)?;
                frame.push_ref(Some(array))?;
            }

            Instruction::ANewArray(index) => {
                let count = frame.pop_int()?;
                let component = self.runtime.load_class(frame.class().constant_pool().class_name(index))?;
                let class = self.runtime.array_class_of(&component)?;
                frame.push_ref(Some(ObjectRef::new_array(class, count)?))?;
            }

            Instruction::MultiANewArray(index, dimensions) => {
                if dimensions == 0 {
                    return Err(VmError::MalformedCode("multianewarray with zero dimensions".to_string()));
                }
                let class = self.runtime.load_class(frame.class().constant_pool().class_name(index))?;
                let counts = frame
                    .take_slots(dimensions as usize)?
                    .iter()
                    .map(|slot| Value::from_slot(slot).and_then(|v| v.as_int()))
                    .collect::<VmResult<Vec<i32>>>()?;
                if let Some(&negative) = counts.iter().find(|&&c| c < 0) {
                    return Err(VmError::NegativeArraySize(negative));
                }
                frame.push_ref(Some(allocate_dimensions(&class, &counts)?))?;
            }

            Instruction::ArrayLength => {
                let array = frame.pop_object()?;
                let length = array.array_length()?;
                frame.push_int(length as i32)?;
            }

            other => unreachable!("Not an array instruction: {:?}", other),
        }
        Ok(OpcodeResult::Continue)
    }
}
