//! Dispatch loop
//!
//! The interpreter executes the current frame of a [`Thread`] one instruction
//! at a time. Shared state (classes, strings, natives) lives in the
//! [`Runtime`]; everything mutable per invocation lives in the thread's
//! frames, so any number of interpreters may run against one runtime.
//!
//! PC protocol:
//! - `Continue` advances to `next_pc` if a handler set one, else past the
//!   instruction.
//! - `Invoke` leaves the caller's `pc` on the invoke (exception tables are
//!   searched at that offset) and records the resume offset in `next_pc`.
//! - `Retry` and `Yield` leave `pc` untouched so the instruction re-executes.

use super::execution::{InitStatus, OpcodeResult, Step};
use super::instruction::Instruction;
use crate::class::{Class, ClassState};
use crate::frame::Frame;
use crate::heap::ObjectRef;
use crate::runtime::Runtime;
use crate::thread::Thread;
use crate::value::Value;
use crate::{VmError, VmResult};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Bytecode interpreter bound to one runtime
pub struct Interpreter<'a> {
    pub(in crate::interpreter) runtime: &'a Runtime,
    deadline: Option<Instant>,
    trace: bool,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter; the configured timeout starts now
    pub fn new(runtime: &'a Runtime) -> Self {
        let options = runtime.options();
        Self {
            runtime,
            deadline: options.timeout.map(|t| Instant::now() + t),
            trace: options.trace_instructions,
        }
    }

    /// Owning runtime
    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    /// Execute one instruction of the thread's current frame
    pub fn step(&mut self, thread: &mut Thread) -> VmResult<Step> {
        let Some(frame) = thread.current_frame() else {
            return Ok(Step::Finished(None));
        };
        let pc = frame.pc;
        let code = &frame.method().code;
        let (instruction, size) = Instruction::decode(code, pc)?;

        if let Some(profiler) = self.runtime.profiler() {
            profiler.record_opcode(code[pc]);
        }
        if self.trace {
            log::trace!(
                "[{}] {}.{} {:>5}: {:?} stack={}",
                thread.id(),
                frame.method().class_name,
                frame.method().name,
                pc,
                instruction,
                frame.stack_depth()
            );
        }

        match self.execute(thread, instruction)? {
            OpcodeResult::Continue => {
                let frame = current(thread)?;
                frame.pc = frame.next_pc.take().unwrap_or(pc + size);
                Ok(Step::Continue)
            }
            OpcodeResult::Invoke => {
                if let Some(caller) = thread.caller_frame_mut() {
                    caller.next_pc = Some(pc + size);
                }
                Ok(Step::Continue)
            }
            OpcodeResult::Retry => Ok(Step::Continue),
            OpcodeResult::Yield => Ok(Step::Yield),
            OpcodeResult::Return(value) => self.return_from_frame(thread, value),
            OpcodeResult::Throw(exception) => self.throw(thread, exception),
        }
    }

    fn execute(&mut self, thread: &mut Thread, instruction: Instruction) -> VmResult<OpcodeResult> {
        use Instruction as I;
        match instruction {
            I::Nop => Ok(OpcodeResult::Continue),
            I::Const(_) | I::Ldc(_) | I::Ldc2(_) => self.exec_constant_ops(current(thread)?, instruction),
            I::Load(..) | I::Store(..) | I::Iinc { .. } => self.exec_variable_ops(current(thread)?, instruction),
            I::Stack(op) => self.exec_stack_ops(current(thread)?, op),
            I::Arith(op) => self.exec_arithmetic_ops(current(thread)?, op),
            I::Convert(op) => self.exec_conversion_ops(current(thread)?, op),
            I::Compare(op) => self.exec_comparison_ops(current(thread)?, op),
            I::If(..)
            | I::IfICmp(..)
            | I::IfACmp(..)
            | I::IfNull(..)
            | I::Goto(_)
            | I::Jsr(..)
            | I::Ret(_)
            | I::TableSwitch { .. }
            | I::LookupSwitch { .. }
            | I::Return(_) => self.exec_control_flow_ops(current(thread)?, instruction),
            I::ArrayLoad(_)
            | I::ArrayStore(_)
            | I::NewArray(_)
            | I::ANewArray(_)
            | I::MultiANewArray(..)
            | I::ArrayLength => self.exec_array_ops(current(thread)?, instruction),
            I::GetStatic(_) | I::PutStatic(_) | I::GetField(_) | I::PutField(_) | I::New(_) => {
                self.exec_object_ops(thread, instruction)
            }
            I::CheckCast(_) | I::InstanceOf(_) => self.exec_type_ops(current(thread)?, instruction),
            I::Invoke(kind, index) => self.exec_invoke(thread, kind, index),
            I::InvokeDynamic(index) => self.exec_invoke_dynamic(current(thread)?, index),
            I::InvokeNative => self.exec_native(current(thread)?),
            I::AThrow | I::MonitorEnter | I::MonitorExit => {
                self.exec_exception_ops(current(thread)?, instruction)
            }
        }
    }

    fn return_from_frame(&mut self, thread: &mut Thread, value: Option<Value>) -> VmResult<Step> {
        let finished = thread.pop_frame().ok_or(VmError::StackUnderflow)?;
        if finished.initializes {
            finished.class().advance_state(ClassState::Initialized);
            log::debug!("[{}] initialized {}", thread.id(), finished.class().name());
        }
        match thread.current_frame_mut() {
            None => Ok(Step::Finished(value)),
            Some(caller) => {
                if let Some(value) = value {
                    caller.push_value(value)?;
                }
                caller.pc = caller.next_pc.take().unwrap_or(caller.pc);
                Ok(Step::Continue)
            }
        }
    }

    /// Unwind to the nearest handler whose catch type matches `exception`
    fn throw(&mut self, thread: &mut Thread, exception: ObjectRef) -> VmResult<Step> {
        let backtrace = thread.backtrace();
        while let Some(frame) = thread.current_frame_mut() {
            if let Some(handler) = self.find_handler(frame, &exception)? {
                frame.clear_stack();
                frame.push_ref(Some(exception))?;
                frame.pc = handler;
                frame.next_pc = None;
                return Ok(Step::Continue);
            }
            if let Some(frame) = thread.pop_frame() {
                if frame.initializes {
                    frame.class().advance_state(ClassState::Failed);
                    log::warn!("[{}] initializer of {} threw", thread.id(), frame.class().name());
                }
            }
        }
        let mut message = self.describe_exception(&exception);
        for line in backtrace {
            message.push_str("\n\t");
            message.push_str(&line);
        }
        Err(VmError::UncaughtException(message))
    }

    fn find_handler(&self, frame: &Frame, exception: &ObjectRef) -> VmResult<Option<usize>> {
        for entry in &frame.method().exception_table {
            if !entry.covers(frame.pc) {
                continue;
            }
            if entry.catch_type == 0 {
                return Ok(Some(entry.handler_pc as usize));
            }
            let name = frame.class().constant_pool().class_name(entry.catch_type);
            let catch = self.runtime.load_class(name)?;
            if exception.class().is_assignable_to(&catch) {
                return Ok(Some(entry.handler_pc as usize));
            }
        }
        Ok(None)
    }

    fn describe_exception(&self, exception: &ObjectRef) -> String {
        let class_name = exception.class().name().replace('/', ".");
        let message = exception
            .class()
            .resolve_field("detailMessage", "Ljava/lang/String;")
            .and_then(|(_, field)| exception.get_field(&field).ok())
            .and_then(|value| match value {
                Value::Reference(Some(text)) => self.runtime.string_value(&text).ok(),
                _ => None,
            });
        match message {
            Some(message) => format!("{}: {}", class_name, message),
            None => class_name,
        }
    }

    /// Initialization gate for `new`, `getstatic`, `putstatic` and
    /// `invokestatic`
    pub(crate) fn ensure_initialized(
        &mut self,
        thread: &mut Thread,
        class: &Arc<Class>,
    ) -> VmResult<InitStatus> {
        match class.state() {
            ClassState::Initialized => return Ok(InitStatus::Ready),
            ClassState::Failed => return Err(VmError::ClassInitFailed(class.name().to_string())),
            _ => {}
        }
        if let Some(super_class) = class.super_class() {
            match self.ensure_initialized(thread, super_class)? {
                InitStatus::Ready => {}
                pending => return Ok(pending),
            }
        }

        {
            let mut state = class.lock_state();
            match *state {
                ClassState::Initialized => return Ok(InitStatus::Ready),
                ClassState::Failed => return Err(VmError::ClassInitFailed(class.name().to_string())),
                ClassState::Initializing(owner) if owner == thread.id() => return Ok(InitStatus::Ready),
                ClassState::Initializing(_) => return Ok(InitStatus::Pending),
                ClassState::Loaded | ClassState::Linked => {}
            }
            *state = ClassState::Initializing(thread.id());
        }
        log::debug!("[{}] initializing {}", thread.id(), class.name());

        if let Err(e) = self.runtime.apply_constant_values(class) {
            class.advance_state(ClassState::Failed);
            return Err(e);
        }
        let Some(clinit) = class.declared_method("<clinit>", "()V") else {
            class.advance_state(ClassState::Initialized);
            return Ok(InitStatus::Ready);
        };

        let mut frame = Frame::new(class.clone(), clinit.clone());
        frame.initializes = true;
        if let Err(e) = thread.push_frame(frame) {
            class.advance_state(ClassState::Failed);
            return Err(e);
        }
        if let Some(profiler) = self.runtime.profiler() {
            profiler.record_call(clinit);
        }
        Ok(InitStatus::Started)
    }

    /// Map the initialization gate onto an opcode result; `None` means proceed
    pub(in crate::interpreter) fn init_gate(
        &mut self,
        thread: &mut Thread,
        class: &Arc<Class>,
    ) -> VmResult<Option<OpcodeResult>> {
        Ok(match self.ensure_initialized(thread, class)? {
            InitStatus::Ready => None,
            InitStatus::Started => Some(OpcodeResult::Retry),
            InitStatus::Pending => Some(OpcodeResult::Yield),
        })
    }

    fn check_limits(&self) -> VmResult<()> {
        if let Some(abort) = &self.runtime.options().abort {
            if abort.load(Ordering::Relaxed) {
                return Err(VmError::Aborted);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(VmError::Timeout);
            }
        }
        Ok(())
    }

    /// Run until the thread's outermost frame returns
    ///
    /// Any error is fatal to the thread: its frames are discarded and
    /// classes whose initializers were interrupted are marked failed.
    pub fn run(&mut self, thread: &mut Thread) -> VmResult<Option<Value>> {
        loop {
            let step = self.check_limits().and_then(|_| self.step(thread));
            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Yield) => std::thread::yield_now(),
                Ok(Step::Finished(value)) => return Ok(value),
                Err(e) => {
                    self.abandon(thread, &e);
                    return Err(e);
                }
            }
        }
    }

    fn abandon(&self, thread: &mut Thread, error: &VmError) {
        log::error!("[{}] fatal: {}", thread.id(), error);
        for line in thread.backtrace() {
            log::error!("[{}]     {}", thread.id(), line);
        }
        for frame in thread.unwind() {
            if frame.initializes {
                frame.class().advance_state(ClassState::Failed);
            }
        }
    }

    /// Run `<clinit>` of `class` (and its superclasses) to completion
    pub fn initialize_class(&mut self, thread: &mut Thread, class: &Arc<Class>) -> VmResult<()> {
        loop {
            match self.ensure_initialized(thread, class)? {
                InitStatus::Ready => return Ok(()),
                InitStatus::Started => {
                    self.run(thread)?;
                }
                InitStatus::Pending => {
                    self.check_limits()?;
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Initialize `class_name` and run a static method on an idle thread
    pub fn invoke_static(
        &mut self,
        thread: &mut Thread,
        class_name: &str,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> VmResult<Option<Value>> {
        if !thread.is_finished() {
            return Err(VmError::ThreadBusy);
        }
        let class = self.runtime.load_class(class_name)?;
        let (owner, method) = class
            .find_method(name, descriptor)
            .ok_or_else(|| VmError::NoSuchMethod {
                class: class_name.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            })?;
        if !method.is_static() {
            return Err(VmError::IncompatibleClassChange(format!(
                "{} is not static",
                method.qualified_name()
            )));
        }

        let params = &method.signature.params;
        if params.len() != args.len() || params.iter().zip(args).any(|(ty, arg)| !arg.matches(ty)) {
            return Err(VmError::TypeMismatch {
                expected: "arguments matching the method descriptor",
                found: format!("{:?}", args),
            });
        }

        self.initialize_class(thread, &owner)?;

        let mut frame = Frame::new(owner, method.clone());
        frame.set_arg_values(args)?;
        thread.push_frame(frame)?;
        if let Some(profiler) = self.runtime.profiler() {
            profiler.record_call(&method);
        }
        self.run(thread)
    }
}

/// Current frame of a thread that is known to be running
pub(in crate::interpreter) fn current(thread: &mut Thread) -> VmResult<&mut Frame> {
    thread.current_frame_mut().ok_or(VmError::StackUnderflow)
}
