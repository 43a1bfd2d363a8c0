use crate::frame::Frame;
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::instruction::Instruction;
use crate::interpreter::Interpreter;
use crate::{VmError, VmResult};

const THROWABLE: &str = "java/lang/Throwable";

impl<'a> Interpreter<'a> {
    /// `athrow` hands the exception to the unwinder; monitors only check
    /// for null since threads share no lock state
    pub(in crate::interpreter) fn exec_exception_ops(
        &mut self,
        frame: &mut Frame,
        instruction: Instruction,
    ) -> VmResult<OpcodeResult> {
        match instruction {
            Instruction::AThrow => {
                let exception = frame.pop_object()?;
                if !exception.class().is_subclass_of(THROWABLE) {
                    return Err(VmError::TypeMismatch {
                        expected: "java/lang/Throwable",
                        found: exception.class().name().to_string(),
                    });
                }
                Ok(OpcodeResult::Throw(exception))
            }

            Instruction::MonitorEnter | Instruction::MonitorExit => {
                frame.pop_object()?;
                Ok(OpcodeResult::Continue)
            }

            other => unreachable!("Not an exception instruction: {:?}", other),
        }
    }
}
