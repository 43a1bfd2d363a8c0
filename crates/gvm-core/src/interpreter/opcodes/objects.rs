use crate::class::{Class, Field};
use crate::heap::ObjectRef;
use crate::interpreter::core::current;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::instruction::Instruction;
use crate::interpreter::Interpreter;
use crate::thread::Thread;
use crate::{VmError, VmResult};
use std::sync::Arc;

impl<'a> Interpreter<'a> {
    /// Field access and `new`. Static access and allocation go through the
    /// initialization gate first and may re-execute once the initializer
    /// has run.
    pub(in crate::interpreter) fn exec_object_ops(
        &mut self,
        thread: &mut Thread,
        instruction: Instruction,
    ) -> VmResult<OpcodeResult> {
        let class = current(thread)?.class().clone();

        match instruction {
            Instruction::GetStatic(index) => {
                let (owner, field) = self.resolve_field_ref(&class, index, true)?;
                if let Some(result) = self.init_gate(thread, &owner)? {
                    return Ok(result);
                }
                let value = owner.get_static(&field)?;
                current(thread)?.push_value(value)?;
            }

            Instruction::PutStatic(index) => {
                let (owner, field) = self.resolve_field_ref(&class, index, true)?;
                if let Some(result) = self.init_gate(thread, &owner)? {
                    return Ok(result);
                }
                let value = current(thread)?.pop_typed(field.field_type())?;
                owner.set_static(&field, value)?;
            }

            Instruction::GetField(index) => {
                let (owner, field) = self.resolve_field_ref(&class, index, false)?;
                let frame = current(thread)?;
                let object = frame.pop_object()?;
                check_holder(object.class(), &owner)?;
                let value = object.get_field(&field)?;
                frame.push_value(value)?;
            }

            Instruction::PutField(index) => {
                let (owner, field) = self.resolve_field_ref(&class, index, false)?;
                let frame = current(thread)?;
                let value = frame.pop_typed(field.field_type())?;
                let object = frame.pop_object()?;
                check_holder(object.class(), &owner)?;
                object.set_field(&field, value)?;
            }

            Instruction::New(index) => {
                let target = self.runtime.load_class(class.constant_pool().class_name(index))?;
                if target.is_abstract() || target.is_interface() || target.is_array() {
                    return Err(VmError::Instantiation(target.name().to_string()));
                }
                if let Some(result) = self.init_gate(thread, &target)? {
                    return Ok(result);
                }
                current(thread)?.push_ref(Some(ObjectRef::new_instance(target)))?;
            }

            other => unreachable!("Not an object instruction: {:?}", other),
        }
        Ok(OpcodeResult::Continue)
    }

    /// Resolve a field reference from `class`'s constant pool
    fn resolve_field_ref(&self, class: &Class, index: u16, is_static: bool) -> VmResult<(Arc<Class>, Field)> {
        let member = class
            .constant_pool()
            .member_ref(index)
            .ok_or_else(|| VmError::MalformedCode(format!("constant #{} is not a field reference", index)))?;
        let target = self.runtime.load_class(member.class_name)?;
        let (owner, field) = target
            .resolve_field(member.name, member.descriptor)
            .ok_or_else(|| VmError::NoSuchField {
                class: member.class_name.to_string(),
                name: member.name.to_string(),
                descriptor: member.descriptor.to_string(),
            })?;
        if field.is_static() != is_static {
            return Err(VmError::IncompatibleClassChange(format!(
                "expected {} field {}.{}",
                if is_static { "static" } else { "non-static" },
                owner.name(),
                field.name()
            )));
        }
        Ok((owner, field))
    }
}

fn check_holder(class: &Class, owner: &Class) -> VmResult<()> {
    if class.is_assignable_to(owner) {
        Ok(())
    } else {
        Err(VmError::IncompatibleClassChange(format!(
            "{} has no field declared by {}",
            class.name(),
            owner.name()
        )))
    }
}
