//! gvm core runtime
//!
//! This crate provides the process virtual machine that executes class files:
//! - Class loading, linking and lazy initialization
//! - Object, array and string model on a reference-counted heap
//! - Per-thread frame stacks with typed 32/64-bit slots
//! - Instruction decoding and dispatch
//! - Native method bridge keyed by (class, name, descriptor)

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bootstrap;
pub mod class;
pub mod frame;
pub mod heap;
pub mod interpreter;
pub mod loader;
pub mod native;
pub mod profiler;
pub mod runtime;
pub mod thread;
pub mod value;
pub mod vm;

pub use class::{Class, ClassState, Field, Method};
pub use frame::Frame;
pub use heap::{ArrayData, ArrayKind, Object, ObjectBody, ObjectRef};
pub use interpreter::{Interpreter, Step};
pub use loader::{ClassLoader, ClassSource, MemoryClassSource};
pub use native::{NativeContext, NativeFn, NativeRegistry};
pub use profiler::{Profile, Profiler};
pub use runtime::Runtime;
pub use thread::{Thread, ThreadId};
pub use value::{Slot, Value};
pub use vm::{Vm, VmBuilder, VmOptions};

use gvm_classfile::ClassFileError;

/// VM errors
///
/// Every variant is fatal to the thread that raised it.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Class bytes failed to decode
    #[error("Class format error: {0}")]
    ClassFormat(#[from] ClassFileError),

    /// A class source failed to read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No source provides the class
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Field resolution failed
    #[error("No such field: {class}.{name}:{descriptor}")]
    NoSuchField {
        /// Referenced class
        class: String,
        /// Field name
        name: String,
        /// Field descriptor
        descriptor: String,
    },

    /// Method resolution failed
    #[error("No such method: {class}.{name}{descriptor}")]
    NoSuchMethod {
        /// Referenced class
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// A resolved member does not match how it is used
    #[error("Incompatible class change: {0}")]
    IncompatibleClassChange(String),

    /// `new` on an abstract class or interface
    #[error("Cannot instantiate {0}")]
    Instantiation(String),

    /// Operand stack exceeded the method's max-stack
    #[error("Stack overflow")]
    StackOverflow,

    /// Pop from an empty operand stack
    #[error("Stack underflow")]
    StackUnderflow,

    /// Thread frame stack exceeded its limit
    #[error("Frame stack overflow (limit {0})")]
    FrameStackOverflow(usize),

    /// Local variable index outside max-locals
    #[error("Local variable index {0} out of range")]
    LocalIndexOutOfRange(usize),

    /// A single-slot pop hit half of a long/double
    #[error("Attempt to split a two-slot value")]
    SplitWideValue,

    /// A slot did not hold the expected kind of value
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected kind
        expected: &'static str,
        /// Found kind
        found: String,
    },

    /// Unassigned opcode byte
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    /// Truncated operands or a branch outside the code array
    #[error("Malformed code: {0}")]
    MalformedCode(String),

    /// No native function is registered for the method
    #[error("Unsatisfied link: {class}.{name}{descriptor}")]
    UnsatisfiedLink {
        /// Declaring class
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// `invokedynamic` or a dynamic constant could not be bound
    #[error("Unresolved dynamic call site {name}{descriptor} in {class}")]
    UnresolvedDynamic {
        /// Class containing the call site
        class: String,
        /// Call site name
        name: String,
        /// Call site descriptor
        descriptor: String,
    },

    /// Null reference used where an object is required
    #[error("Null pointer")]
    NullPointer,

    /// Integer division by zero
    #[error("Arithmetic exception: {0}")]
    ArithmeticException(&'static str),

    /// Array index outside `0..length`
    #[error("Array index {index} out of bounds for length {length}")]
    ArrayIndexOutOfBounds {
        /// Requested index
        index: i32,
        /// Array length
        length: usize,
    },

    /// Array created with a negative length
    #[error("Negative array size: {0}")]
    NegativeArraySize(i32),

    /// Array element type does not accept the stored value
    #[error("Array store: {0}")]
    ArrayStore(String),

    /// An allocation exceeded the array size limit or could not be reserved
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// `checkcast` failed
    #[error("Class cast: {from} cannot be cast to {to}")]
    ClassCast {
        /// Runtime class
        from: String,
        /// Target class
        to: String,
    },

    /// Invocation selected an abstract method
    #[error("Abstract method: {0}")]
    AbstractMethod(String),

    /// `athrow` found no handler on the thread
    #[error("Uncaught exception: {0}")]
    UncaughtException(String),

    /// The class initializer previously failed
    #[error("Class initialization failed: {0}")]
    ClassInitFailed(String),

    /// A host invocation was started on a thread that still has frames
    #[error("Thread already has frames")]
    ThreadBusy,

    /// The host abort flag was raised
    #[error("Execution aborted")]
    Aborted,

    /// The configured timeout elapsed
    #[error("Execution timed out")]
    Timeout,
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
