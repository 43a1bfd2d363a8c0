//! Bytecode interpreter
//!
//! - [`instruction`]: one-time decoding of opcodes and operands
//! - [`execution`]: results exchanged between handlers and the dispatch loop
//! - `core`: the dispatch loop, class initialization and exception unwinding
//! - [`opcodes`]: handlers grouped by instruction category

mod core;
pub mod execution;
pub mod instruction;
pub mod opcodes;

pub use self::core::Interpreter;
pub use execution::{OpcodeResult, Step};
pub use instruction::{Cond, Instruction, InvokeKind, ValueKind};
