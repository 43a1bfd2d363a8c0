//! gvm class-file definitions
//!
//! This crate provides the binary class-file format consumed by the gvm
//! interpreter:
//! - Big-endian reader and the versioned class-file parser
//! - Constant pool with lenient index-based lookups
//! - Attributes (`Code`, `ConstantValue`, `BootstrapMethods`, ...)
//! - Field and method descriptors
//! - The instruction set opcodes
//! - A class-file writer with a label-aware code assembler

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod access;
pub mod attribute;
pub mod class_file;
pub mod constant_pool;
pub mod descriptor;
pub mod mutf8;
pub mod opcode;
pub mod reader;
pub mod writer;

pub use attribute::{Attribute, CodeAttribute, ExceptionTableEntry};
pub use class_file::{ClassFile, ClassFileError, MemberInfo};
pub use constant_pool::{ConstantInfo, ConstantPool};
pub use descriptor::{FieldType, MethodDescriptor, ReturnWidth};
pub use opcode::Opcode;
pub use reader::ClassReader;
pub use writer::{ClassBuilder, CodeBuilder, Label, WriteError};

/// Class-file result
pub type Result<T> = std::result::Result<T, ClassFileError>;
