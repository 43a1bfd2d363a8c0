//! Execution result types
//!
//! Opcode handlers report what the dispatch loop must do next through
//! [`OpcodeResult`]; the loop itself reports progress to its caller through
//! [`Step`].

use crate::heap::ObjectRef;
use crate::value::Value;

/// Result of executing a single instruction
#[derive(Debug)]
pub enum OpcodeResult {
    /// Advance to `next_pc`, or past the instruction
    Continue,

    /// A callee frame was pushed; the caller resumes after the instruction
    Invoke,

    /// A class initializer frame was pushed; re-execute the instruction
    /// once it returns
    Retry,

    /// Another thread is initializing a needed class; re-execute later
    Yield,

    /// Pop the current frame, passing the value to the caller
    Return(Option<Value>),

    /// Unwind to the nearest matching exception handler
    Throw(ObjectRef),
}

/// Outcome of one interpreter step
#[derive(Debug, PartialEq)]
pub enum Step {
    /// More instructions remain
    Continue,
    /// The thread is waiting on another thread; give up the CPU
    Yield,
    /// The outermost frame returned
    Finished(Option<Value>),
}

/// Class initialization gate result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitStatus {
    /// The class may be used
    Ready,
    /// An initializer frame was pushed on this thread
    Started,
    /// Another thread is running the initializer
    Pending,
}
