use crate::frame::Frame;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::Interpreter;
use crate::native::NativeContext;
use crate::{VmError, VmResult};

impl<'a> Interpreter<'a> {
    /// Body of every native method: call the registered host function and
    /// leave its result on the stack for the typed return that follows
    pub(in crate::interpreter) fn exec_native(&mut self, frame: &mut Frame) -> VmResult<OpcodeResult> {
        let method = frame.method().clone();
        let function = self
            .runtime
            .natives()
            .lookup(&method.class_name, &method.name, &method.descriptor)
            .ok_or_else(|| VmError::UnsatisfiedLink {
                class: method.class_name.clone(),
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
            })?;
        log::trace!("native {}", method.qualified_name());

        let result = {
            let mut context = NativeContext::new(self.runtime, frame);
            function(&mut context)?
        };

        match (result, &method.signature.ret) {
            (None, None) => {}
            (Some(value), Some(ty)) if value.matches(ty) => frame.push_value(value)?,
            (result, _) => {
                return Err(VmError::TypeMismatch {
                    expected: "native result matching the method descriptor",
                    found: format!("{:?} from {}", result, method.qualified_name()),
                })
            }
        }
        Ok(OpcodeResult::Continue)
    }
}
