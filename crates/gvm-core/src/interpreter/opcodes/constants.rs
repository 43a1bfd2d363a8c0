use crate::frame::Frame;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::{Instruction, Interpreter};
use crate::value::Value;
use crate::{VmError, VmResult};
use gvm_classfile::ConstantInfo;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_constant_ops(
        &mut self,
        frame: &mut Frame,
        instruction: Instruction,
    ) -> VmResult<OpcodeResult> {
        let value = match instruction {
            Instruction::Const(value) => value,
            Instruction::Ldc(index) => self.load_constant(frame, index)?,
            Instruction::Ldc2(index) => match frame.class().constant_pool().get(index) {
                Some(ConstantInfo::Long(v)) => Value::Long(*v),
                Some(ConstantInfo::Double(v)) => Value::Double(*v),
                _ => return Err(bad_constant(frame, index, "ldc2_w")),
            },
            other => unreachable!("Not a constant instruction: {:?}", other),
        };
        frame.push_value(value)?;
        Ok(OpcodeResult::Continue)
    }

    fn load_constant(&self, frame: &Frame, index: u16) -> VmResult<Value> {
        let pool = frame.class().constant_pool();
        Ok(match pool.get(index) {
            Some(ConstantInfo::Integer(v)) => Value::Int(*v),
            Some(ConstantInfo::Float(v)) => Value::Float(*v),
            Some(ConstantInfo::String { .. }) => self.runtime.intern(pool.string(index))?.into(),
            Some(ConstantInfo::Class { .. }) => {
                let class = self.runtime.load_class(pool.class_name(index))?;
                self.runtime.class_mirror(&class)?.into()
            }
            Some(ConstantInfo::MethodType { .. } | ConstantInfo::MethodHandle { .. }) => {
                return Err(VmError::UnresolvedDynamic {
                    class: frame.class().name().to_string(),
                    name: "ldc".to_string(),
                    descriptor: format!("#{}", index),
                })
            }
            Some(ConstantInfo::Dynamic {
                name_and_type_index, ..
            }) => {
                let (name, descriptor) = pool.name_and_type(*name_and_type_index);
                return Err(VmError::UnresolvedDynamic {
                    class: frame.class().name().to_string(),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                });
            }
            _ => return Err(bad_constant(frame, index, "ldc")),
        })
    }
}

fn bad_constant(frame: &Frame, index: u16, op: &str) -> VmError {
    VmError::MalformedCode(format!(
        "{} of unloadable constant #{} in {}",
        op,
        index,
        frame.method().qualified_name()
    ))
}
