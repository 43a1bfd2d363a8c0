//! Opcode handler modules for the interpreter
//!
//! Each module implements a category of opcode handlers as methods on `Interpreter`.

pub mod arithmetic;
pub mod arrays;
pub mod calls;
pub mod comparison;
pub mod constants;
pub mod control_flow;
pub mod exceptions;
pub mod native;
pub mod objects;
pub mod stack;
pub mod types;
pub mod variables;
