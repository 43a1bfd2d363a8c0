use crate::class::{Class, Method};
use crate::frame::Frame;
use crate::interpreter::core::current;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::instruction::InvokeKind;
use crate::interpreter::Interpreter;
use crate::thread::Thread;
use crate::value::Slot;
use crate::{VmError, VmResult};
use gvm_classfile::{ConstantInfo, MethodDescriptor};
use std::sync::Arc;

type Target = (Arc<Class>, Arc<Method>);

impl<'a> Interpreter<'a> {
    /// Resolve and select the callee, then push its frame
    ///
    /// - `invokestatic` runs the owner's initialization gate first.
    /// - `invokespecial` binds exactly, except for superclass calls from a
    ///   subclass, which select from the caller's superclass.
    /// - `invokevirtual` and `invokeinterface` select on the receiver's
    ///   runtime class, falling back to default interface methods.
    pub(in crate::interpreter) fn exec_invoke(
        &mut self,
        thread: &mut Thread,
        kind: InvokeKind,
        index: u16,
    ) -> VmResult<OpcodeResult> {
        let caller = current(thread)?.class().clone();
        let member = caller
            .constant_pool()
            .member_ref(index)
            .ok_or_else(|| VmError::MalformedCode(format!("constant #{} is not a method reference", index)))?;
        let referenced = self.runtime.load_class(member.class_name)?;
        let (resolved_owner, resolved) = resolve_method(&referenced, member.name, member.descriptor)?;

        if kind == InvokeKind::Static {
            if !resolved.is_static() {
                return Err(VmError::IncompatibleClassChange(format!(
                    "{} is not static",
                    resolved.qualified_name()
                )));
            }
            if let Some(result) = self.init_gate(thread, &resolved_owner)? {
                return Ok(result);
            }
            return self.push_invocation(thread, resolved_owner, resolved);
        }

        if resolved.is_static() {
            return Err(VmError::IncompatibleClassChange(format!(
                "{} is static",
                resolved.qualified_name()
            )));
        }

        let receiver = receiver_class(current(thread)?, &resolved.signature)?;
        let (owner, method) = match kind {
            InvokeKind::Special => {
                let super_call = member.name != "<init>"
                    && !resolved.is_private()
                    && !referenced.is_interface()
                    && caller.name() != referenced.name()
                    && caller.is_subclass_of(referenced.name());
                match caller.super_class() {
                    Some(parent) if super_call => parent
                        .find_method(member.name, member.descriptor)
                        .unwrap_or((resolved_owner, resolved)),
                    _ => (resolved_owner, resolved),
                }
            }
            _ if resolved.is_private() => (resolved_owner, resolved),
            _ => {
                if kind == InvokeKind::Interface && !receiver.is_assignable_to(&referenced) {
                    return Err(VmError::IncompatibleClassChange(format!(
                        "{} does not implement {}",
                        receiver.name(),
                        referenced.name()
                    )));
                }
                select_method(&receiver, member.name, member.descriptor)?
            }
        };

        if method.is_abstract() {
            return Err(VmError::AbstractMethod(method.qualified_name()));
        }
        self.push_invocation(thread, owner, method)
    }

    /// Move the arguments off the caller's stack into a new frame
    fn push_invocation(
        &mut self,
        thread: &mut Thread,
        owner: Arc<Class>,
        method: Arc<Method>,
    ) -> VmResult<OpcodeResult> {
        let args = current(thread)?.take_slots(method.arg_slots())?;
        let mut frame = Frame::new(owner, method.clone());
        frame.set_args(args)?;
        if let Some(profiler) = self.runtime.profiler() {
            profiler.record_call(&method);
        }
        thread.push_frame(frame)?;
        Ok(OpcodeResult::Invoke)
    }

    /// Call sites are never bootstrapped
    pub(in crate::interpreter) fn exec_invoke_dynamic(
        &mut self,
        frame: &mut Frame,
        index: u16,
    ) -> VmResult<OpcodeResult> {
        let pool = frame.class().constant_pool();
        let (name, descriptor) = match pool.get(index) {
            Some(ConstantInfo::InvokeDynamic {
                name_and_type_index, ..
            }) => pool.name_and_type(*name_and_type_index),
            _ => {
                return Err(VmError::MalformedCode(format!(
                    "constant #{} is not an invokedynamic call site",
                    index
                )))
            }
        };
        Err(VmError::UnresolvedDynamic {
            class: frame.class().name().to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }
}

/// Method resolution against the referenced class or interface
fn resolve_method(class: &Arc<Class>, name: &str, descriptor: &str) -> VmResult<Target> {
    class
        .find_method(name, descriptor)
        .or_else(|| class.find_interface_method(name, descriptor))
        .ok_or_else(|| VmError::NoSuchMethod {
            class: class.name().to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
}

/// Virtual selection: the superclass chain first, then default methods
fn select_method(receiver: &Arc<Class>, name: &str, descriptor: &str) -> VmResult<Target> {
    let selected = receiver
        .find_method(name, descriptor)
        .filter(|(_, method)| !method.is_static())
        .or_else(|| receiver.find_interface_method(name, descriptor));
    selected.ok_or_else(|| VmError::NoSuchMethod {
        class: receiver.name().to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    })
}

/// Runtime class of the receiver sitting below the arguments
fn receiver_class(frame: &Frame, signature: &MethodDescriptor) -> VmResult<Arc<Class>> {
    match frame.peek(signature.arg_slots())? {
        Slot::Reference(Some(object)) => Ok(object.class().clone()),
        Slot::Reference(None) => Err(VmError::NullPointer),
        other => Err(other.mismatch("reference")),
    }
}
