//! Activation frames
//!
//! A frame owns the operand stack and local variables of one method
//! invocation. All accessors are typed: popping a slot of the wrong kind is a
//! `TypeMismatch`, and a single-slot pop that would split a long or double is
//! a `SplitWideValue`.

use crate::class::{Class, Method};
use crate::heap::ObjectRef;
use crate::value::{Slot, Value};
use crate::{VmError, VmResult};
use gvm_classfile::FieldType;
use std::sync::Arc;

/// One method activation
#[derive(Debug)]
pub struct Frame {
    class: Arc<Class>,
    method: Arc<Method>,
    stack: Vec<Slot>,
    locals: Vec<Slot>,
    /// Offset of the instruction being executed
    pub pc: usize,
    /// One-shot override of `pc + size` for the next pc; cleared once the
    /// instruction completes
    pub(crate) next_pc: Option<usize>,
    /// Set on `<clinit>` frames; completion marks the class initialized
    pub(crate) initializes: bool,
}

impl Frame {
    /// Create a frame with an empty stack and unset locals
    pub fn new(class: Arc<Class>, method: Arc<Method>) -> Self {
        let stack = Vec::with_capacity(method.max_stack);
        let locals = vec![Slot::Top; method.max_locals];
        Self {
            class,
            method,
            stack,
            locals,
            pc: 0,
            next_pc: None,
            initializes: false,
        }
    }

    /// Declaring class of the executing method
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    /// Executing method
    pub fn method(&self) -> &Arc<Method> {
        &self.method
    }

    /// Operand stack, bottom first
    pub fn stack(&self) -> &[Slot] {
        &self.stack
    }

    /// Local variables
    pub fn locals(&self) -> &[Slot] {
        &self.locals
    }

    /// Current operand stack depth in slots
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Discard the operand stack
    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    // ===== Operand stack =====

    /// Push a raw slot
    pub fn push(&mut self, slot: Slot) -> VmResult<()> {
        if self.stack.len() >= self.method.max_stack {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(slot);
        Ok(())
    }

    /// Push a value; longs and doubles take two slots
    pub fn push_value(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() + value.slot_count() > self.method.max_stack {
            return Err(VmError::StackOverflow);
        }
        let wide = value.slot_count() == 2;
        self.stack.push(value.to_slot());
        if wide {
            self.stack.push(Slot::Top);
        }
        Ok(())
    }

    /// Push an int
    pub fn push_int(&mut self, v: i32) -> VmResult<()> {
        self.push(Slot::Int(v))
    }

    /// Push a float
    pub fn push_float(&mut self, v: f32) -> VmResult<()> {
        self.push(Slot::Float(v))
    }

    /// Push a long
    pub fn push_long(&mut self, v: i64) -> VmResult<()> {
        self.push_value(Value::Long(v))
    }

    /// Push a double
    pub fn push_double(&mut self, v: f64) -> VmResult<()> {
        self.push_value(Value::Double(v))
    }

    /// Push a reference
    pub fn push_ref(&mut self, r: Option<ObjectRef>) -> VmResult<()> {
        self.push(Slot::Reference(r))
    }

    /// Pop a raw slot, which may be half of a two-slot value
    pub fn pop(&mut self) -> VmResult<Slot> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pop a single-slot value
    pub fn pop_single(&mut self) -> VmResult<Slot> {
        match self.pop()? {
            Slot::Top => Err(VmError::SplitWideValue),
            slot => Ok(slot),
        }
    }

    fn pop_wide(&mut self, expected: &'static str) -> VmResult<Slot> {
        let upper = self.pop()?;
        if upper != Slot::Top {
            return Err(upper.mismatch(expected));
        }
        let value = self.pop()?;
        if !value.is_wide() {
            return Err(value.mismatch(expected));
        }
        Ok(value)
    }

    /// Pop an int
    pub fn pop_int(&mut self) -> VmResult<i32> {
        match self.pop_single()? {
            Slot::Int(v) => Ok(v),
            other => Err(other.mismatch("int")),
        }
    }

    /// Pop a float
    pub fn pop_float(&mut self) -> VmResult<f32> {
        match self.pop_single()? {
            Slot::Float(v) => Ok(v),
            other => Err(other.mismatch("float")),
        }
    }

    /// Pop a long
    pub fn pop_long(&mut self) -> VmResult<i64> {
        match self.pop_wide("long")? {
            Slot::Long(v) => Ok(v),
            other => Err(other.mismatch("long")),
        }
    }

    /// Pop a double
    pub fn pop_double(&mut self) -> VmResult<f64> {
        match self.pop_wide("double")? {
            Slot::Double(v) => Ok(v),
            other => Err(other.mismatch("double")),
        }
    }

    /// Pop a possibly-null reference
    pub fn pop_ref(&mut self) -> VmResult<Option<ObjectRef>> {
        match self.pop_single()? {
            Slot::Reference(r) => Ok(r),
            other => Err(other.mismatch("reference")),
        }
    }

    /// Pop a reference that must not be null
    pub fn pop_object(&mut self) -> VmResult<ObjectRef> {
        self.pop_ref()?.ok_or(VmError::NullPointer)
    }

    /// Pop a value of the given field type
    pub fn pop_typed(&mut self, ty: &FieldType) -> VmResult<Value> {
        Ok(match ty {
            FieldType::Long => Value::Long(self.pop_long()?),
            FieldType::Double => Value::Double(self.pop_double()?),
            FieldType::Float => Value::Float(self.pop_float()?),
            FieldType::Object(_) | FieldType::Array(_) => Value::Reference(self.pop_ref()?),
            _ => Value::Int(self.pop_int()?),
        })
    }

    /// Slot `depth` positions below the top (0 is the top)
    pub fn peek(&self, depth: usize) -> VmResult<&Slot> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or(VmError::StackUnderflow)
    }

    /// Remove the top `count` slots, bottom first
    pub fn take_slots(&mut self, count: usize) -> VmResult<Vec<Slot>> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(VmError::StackUnderflow)?;
        if self.stack.get(start) == Some(&Slot::Top) {
            return Err(VmError::SplitWideValue);
        }
        Ok(self.stack.split_off(start))
    }

    // ===== Locals =====

    fn check_local(&self, index: usize, width: usize) -> VmResult<()> {
        if index + width > self.locals.len() {
            return Err(VmError::LocalIndexOutOfRange(index));
        }
        Ok(())
    }

    /// Raw local slot
    pub fn local(&self, index: usize) -> VmResult<&Slot> {
        self.locals
            .get(index)
            .ok_or(VmError::LocalIndexOutOfRange(index))
    }

    /// Store a raw slot into a local
    pub fn set_local(&mut self, index: usize, slot: Slot) -> VmResult<()> {
        self.check_local(index, 1)?;
        self.invalidate_wide_before(index);
        self.locals[index] = slot;
        Ok(())
    }

    /// Store a value; longs and doubles occupy `index` and `index + 1`
    pub fn store_local(&mut self, index: usize, value: Value) -> VmResult<()> {
        self.check_local(index, value.slot_count())?;
        self.invalidate_wide_before(index);
        value.write_to(&mut self.locals, index);
        Ok(())
    }

    fn invalidate_wide_before(&mut self, index: usize) {
        if index > 0 && self.locals[index - 1].is_wide() {
            self.locals[index - 1] = Slot::Top;
        }
    }

    /// Read a local as a value of the given kind
    pub fn load_local(&self, index: usize, expected: &'static str) -> VmResult<Value> {
        let slot = self.local(index)?;
        let value = Value::from_slot(slot).map_err(|_| slot.mismatch(expected))?;
        let kind = value.to_slot().kind();
        if kind != expected {
            return Err(slot.mismatch(expected));
        }
        Ok(value)
    }

    /// Copy invocation arguments into the first locals
    pub fn set_args(&mut self, args: Vec<Slot>) -> VmResult<()> {
        self.check_local(0, args.len())?;
        for (local, arg) in self.locals.iter_mut().zip(args) {
            *local = arg;
        }
        Ok(())
    }

    /// Write typed arguments into the first locals
    pub fn set_arg_values(&mut self, args: &[Value]) -> VmResult<()> {
        let mut index = 0;
        for arg in args {
            self.store_local(index, arg.clone())?;
            index += arg.slot_count();
        }
        Ok(())
    }
}
