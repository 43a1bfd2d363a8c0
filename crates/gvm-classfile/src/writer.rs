//! Class-file writer and code assembler
//!
//! `ClassBuilder` interns constants and emits a complete class file;
//! `CodeBuilder` assembles a method body with labels. Forward references are
//! recorded as fixups and patched when the body is finished.
//!
//! ```
//! use gvm_classfile::{ClassBuilder, CodeBuilder, Opcode};
//! use gvm_classfile::access::{ACC_PUBLIC, ACC_STATIC};
//!
//! let mut class = ClassBuilder::new("Answer", Some("java/lang/Object"));
//! let mut code = CodeBuilder::new(1, 0);
//! code.op_u8(Opcode::Bipush, 42).op(Opcode::Ireturn);
//! class.method(ACC_PUBLIC | ACC_STATIC, "get", "()I", Some(code.finish().unwrap()));
//! let bytes = class.build();
//! assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
//! ```

use crate::access::{ACC_PUBLIC, ACC_SUPER};
use crate::attribute::{CodeAttribute, ExceptionTableEntry};
use crate::constant_pool::tag;
use crate::mutf8;
use crate::opcode::Opcode;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Assembler errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    /// A label was referenced but never bound
    #[error("Undefined label {0}")]
    UndefinedLabel(usize),

    /// A label was bound twice
    #[error("Label {0} bound twice")]
    DuplicateLabel(usize),

    /// A 16-bit branch cannot reach its target
    #[error("Branch from {from} to {to} does not fit in 16 bits")]
    BranchOutOfRange {
        /// Instruction offset
        from: usize,
        /// Target offset
        to: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Constant {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    InvokeDynamic(u16, u16),
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Constant::Utf8(text) => {
                let bytes = mutf8::encode(text);
                out.push(tag::UTF8);
                out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(&bytes);
            }
            Constant::Integer(v) => {
                out.push(tag::INTEGER);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Constant::Float(bits) => {
                out.push(tag::FLOAT);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Long(v) => {
                out.push(tag::LONG);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Constant::Double(bits) => {
                out.push(tag::DOUBLE);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Constant::Class(i) => push_u16_entry(out, tag::CLASS, &[*i]),
            Constant::String(i) => push_u16_entry(out, tag::STRING, &[*i]),
            Constant::FieldRef(c, n) => push_u16_entry(out, tag::FIELD_REF, &[*c, *n]),
            Constant::MethodRef(c, n) => push_u16_entry(out, tag::METHOD_REF, &[*c, *n]),
            Constant::InterfaceMethodRef(c, n) => {
                push_u16_entry(out, tag::INTERFACE_METHOD_REF, &[*c, *n])
            }
            Constant::NameAndType(n, d) => push_u16_entry(out, tag::NAME_AND_TYPE, &[*n, *d]),
            Constant::MethodHandle(kind, i) => {
                out.push(tag::METHOD_HANDLE);
                out.push(*kind);
                out.extend_from_slice(&i.to_be_bytes());
            }
            Constant::MethodType(i) => push_u16_entry(out, tag::METHOD_TYPE, &[*i]),
            Constant::InvokeDynamic(b, n) => push_u16_entry(out, tag::INVOKE_DYNAMIC, &[*b, *n]),
        }
    }
}

fn push_u16_entry(out: &mut Vec<u8>, tag: u8, values: &[u16]) {
    out.push(tag);
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

struct Member {
    access: u16,
    name: u16,
    descriptor: u16,
    constant_value: Option<u16>,
    code: Option<CodeAttribute>,
}

/// Builder for a complete class file
pub struct ClassBuilder {
    major: u16,
    minor: u16,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    constants: Vec<Constant>,
    next_index: u16,
    lookup: FxHashMap<Constant, u16>,
    fields: Vec<Member>,
    methods: Vec<Member>,
    source_file: Option<u16>,
    bootstrap_methods: Vec<(u16, Vec<u16>)>,
}

impl ClassBuilder {
    /// Start a public class; `super_name` is `None` only for the root class
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        let mut builder = Self {
            major: 52,
            minor: 0,
            access: ACC_PUBLIC | ACC_SUPER,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            constants: Vec::new(),
            next_index: 1,
            lookup: FxHashMap::default(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
            bootstrap_methods: Vec::new(),
        };
        builder.this_class = builder.class(name);
        if let Some(super_name) = super_name {
            builder.super_class = builder.class(super_name);
        }
        builder
    }

    /// Set the class access flags
    pub fn access(&mut self, flags: u16) -> &mut Self {
        self.access = flags;
        self
    }

    /// Set the class-file version
    pub fn version(&mut self, major: u16, minor: u16) -> &mut Self {
        self.major = major;
        self.minor = minor;
        self
    }

    /// Add a direct superinterface
    pub fn interface(&mut self, name: &str) -> &mut Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    /// Record a `SourceFile` attribute
    pub fn source_file(&mut self, name: &str) -> &mut Self {
        self.utf8("SourceFile");
        self.source_file = Some(self.utf8(name));
        self
    }

    fn intern(&mut self, constant: Constant) -> u16 {
        if let Some(&index) = self.lookup.get(&constant) {
            return index;
        }
        let index = self.next_index;
        self.next_index += if constant.is_wide() { 2 } else { 1 };
        self.lookup.insert(constant.clone(), index);
        self.constants.push(constant);
        index
    }

    /// Intern a `Utf8` entry
    pub fn utf8(&mut self, text: &str) -> u16 {
        self.intern(Constant::Utf8(text.to_string()))
    }

    /// Intern a `Class` entry
    pub fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.intern(Constant::Class(name))
    }

    /// Intern a `String` literal
    pub fn string(&mut self, text: &str) -> u16 {
        let text = self.utf8(text);
        self.intern(Constant::String(text))
    }

    /// Intern an `Integer` literal
    pub fn integer(&mut self, value: i32) -> u16 {
        self.intern(Constant::Integer(value))
    }

    /// Intern a `Float` literal
    pub fn float(&mut self, value: f32) -> u16 {
        self.intern(Constant::Float(value.to_bits()))
    }

    /// Intern a `Long` literal (takes two indices)
    pub fn long(&mut self, value: i64) -> u16 {
        self.intern(Constant::Long(value))
    }

    /// Intern a `Double` literal (takes two indices)
    pub fn double(&mut self, value: f64) -> u16 {
        self.intern(Constant::Double(value.to_bits()))
    }

    /// Intern a `NameAndType` entry
    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.intern(Constant::NameAndType(name, descriptor))
    }

    /// Intern a field reference
    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.intern(Constant::FieldRef(class, nat))
    }

    /// Intern a class method reference
    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.intern(Constant::MethodRef(class, nat))
    }

    /// Intern an interface method reference
    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        self.intern(Constant::InterfaceMethodRef(class, nat))
    }

    /// Intern a `MethodHandle`
    pub fn method_handle(&mut self, kind: u8, reference: u16) -> u16 {
        self.intern(Constant::MethodHandle(kind, reference))
    }

    /// Intern a `MethodType`
    pub fn method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor = self.utf8(descriptor);
        self.intern(Constant::MethodType(descriptor))
    }

    /// Add a bootstrap method, returning its attribute index
    pub fn bootstrap_method(&mut self, handle: u16, arguments: Vec<u16>) -> u16 {
        self.utf8("BootstrapMethods");
        self.bootstrap_methods.push((handle, arguments));
        (self.bootstrap_methods.len() - 1) as u16
    }

    /// Intern an `InvokeDynamic` call site
    pub fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let nat = self.name_and_type(name, descriptor);
        self.intern(Constant::InvokeDynamic(bootstrap, nat))
    }

    /// Declare a field
    pub fn field(&mut self, access: u16, name: &str, descriptor: &str) -> &mut Self {
        let member = Member {
            access,
            name: self.utf8(name),
            descriptor: self.utf8(descriptor),
            constant_value: None,
            code: None,
        };
        self.fields.push(member);
        self
    }

    /// Declare a field with a `ConstantValue` attribute
    pub fn constant_field(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        value: u16,
    ) -> &mut Self {
        self.utf8("ConstantValue");
        self.field(access, name, descriptor);
        if let Some(field) = self.fields.last_mut() {
            field.constant_value = Some(value);
        }
        self
    }

    /// Declare a method; `code` is `None` for abstract and native methods
    pub fn method(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        code: Option<CodeAttribute>,
    ) -> &mut Self {
        if code.is_some() {
            self.utf8("Code");
        }
        let member = Member {
            access,
            name: self.utf8(name),
            descriptor: self.utf8(descriptor),
            constant_value: None,
            code,
        };
        self.methods.push(member);
        self
    }

    fn lookup_utf8(&self, text: &str) -> u16 {
        self.lookup
            .get(&Constant::Utf8(text.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn encode_member(&self, member: &Member, out: &mut Vec<u8>) {
        push_u16(out, member.access);
        push_u16(out, member.name);
        push_u16(out, member.descriptor);

        let count = member.constant_value.is_some() as u16 + member.code.is_some() as u16;
        push_u16(out, count);

        if let Some(value) = member.constant_value {
            push_u16(out, self.lookup_utf8("ConstantValue"));
            push_u32(out, 2);
            push_u16(out, value);
        }

        if let Some(code) = &member.code {
            let mut body = Vec::with_capacity(code.code.len() + 12);
            push_u16(&mut body, code.max_stack);
            push_u16(&mut body, code.max_locals);
            push_u32(&mut body, code.code.len() as u32);
            body.extend_from_slice(&code.code);
            push_u16(&mut body, code.exception_table.len() as u16);
            for entry in &code.exception_table {
                push_u16(&mut body, entry.start_pc);
                push_u16(&mut body, entry.end_pc);
                push_u16(&mut body, entry.handler_pc);
                push_u16(&mut body, entry.catch_type);
            }
            push_u16(&mut body, 0);

            push_u16(out, self.lookup_utf8("Code"));
            push_u32(out, body.len() as u32);
            out.extend_from_slice(&body);
        }
    }

    /// Emit the class file
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, crate::class_file::MAGIC);
        push_u16(&mut out, self.minor);
        push_u16(&mut out, self.major);

        push_u16(&mut out, self.next_index);
        for constant in &self.constants {
            constant.encode(&mut out);
        }

        push_u16(&mut out, self.access);
        push_u16(&mut out, self.this_class);
        push_u16(&mut out, self.super_class);
        push_u16(&mut out, self.interfaces.len() as u16);
        for &i in &self.interfaces {
            push_u16(&mut out, i);
        }

        push_u16(&mut out, self.fields.len() as u16);
        for field in &self.fields {
            self.encode_member(field, &mut out);
        }
        push_u16(&mut out, self.methods.len() as u16);
        for method in &self.methods {
            self.encode_member(method, &mut out);
        }

        let count = self.source_file.is_some() as u16 + !self.bootstrap_methods.is_empty() as u16;
        push_u16(&mut out, count);
        if let Some(source) = self.source_file {
            push_u16(&mut out, self.lookup_utf8("SourceFile"));
            push_u32(&mut out, 2);
            push_u16(&mut out, source);
        }
        if !self.bootstrap_methods.is_empty() {
            let mut body = Vec::new();
            push_u16(&mut body, self.bootstrap_methods.len() as u16);
            for (handle, args) in &self.bootstrap_methods {
                push_u16(&mut body, *handle);
                push_u16(&mut body, args.len() as u16);
                for &a in args {
                    push_u16(&mut body, a);
                }
            }
            push_u16(&mut out, self.lookup_utf8("BootstrapMethods"));
            push_u32(&mut out, body.len() as u32);
            out.extend_from_slice(&body);
        }

        out
    }
}

/// A code position bound with [`CodeBuilder::label`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
enum FixupKind {
    /// i16 offset relative to the instruction start
    Relative16,
    /// i32 offset relative to the instruction start
    Relative32,
    /// u16 absolute code offset
    Absolute16,
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    at: usize,
    base: usize,
    label: Label,
    kind: FixupKind,
}

/// Method body assembler
pub struct CodeBuilder {
    max_stack: u16,
    max_locals: u16,
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    handlers: Vec<(Label, Label, Label, u16)>,
    error: Option<WriteError>,
}

impl CodeBuilder {
    /// Start a body with the declared frame sizes
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Self {
            max_stack,
            max_locals,
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            handlers: Vec::new(),
            error: None,
        }
    }

    /// Current code offset
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Emit an instruction without operands
    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    /// Emit an instruction with a one-byte operand
    pub fn op_u8(&mut self, op: Opcode, operand: u8) -> &mut Self {
        self.code.push(op as u8);
        self.code.push(operand);
        self
    }

    /// Emit an instruction with a two-byte operand
    pub fn op_u16(&mut self, op: Opcode, operand: u16) -> &mut Self {
        self.code.push(op as u8);
        self.code.extend_from_slice(&operand.to_be_bytes());
        self
    }

    /// Emit raw bytes
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    /// Push an int constant using the shortest encoding
    pub fn push_int(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => self.op(match value {
                -1 => Opcode::IconstM1,
                0 => Opcode::Iconst0,
                1 => Opcode::Iconst1,
                2 => Opcode::Iconst2,
                3 => Opcode::Iconst3,
                4 => Opcode::Iconst4,
                _ => Opcode::Iconst5,
            }),
            v if i8::try_from(v).is_ok() => self.op_u8(Opcode::Bipush, v as i8 as u8),
            v => self.op_u16(Opcode::Sipush, v as i16 as u16),
        }
    }

    /// `iinc index delta`
    pub fn iinc(&mut self, index: u8, delta: i8) -> &mut Self {
        self.code.extend_from_slice(&[Opcode::Iinc as u8, index, delta as u8]);
        self
    }

    /// `wide` form of a load, store or `ret`
    pub fn wide(&mut self, op: Opcode, index: u16) -> &mut Self {
        self.code.push(Opcode::Wide as u8);
        self.op_u16(op, index)
    }

    /// `wide iinc index delta`
    pub fn wide_iinc(&mut self, index: u16, delta: i16) -> &mut Self {
        self.code.push(Opcode::Wide as u8);
        self.op_u16(Opcode::Iinc, index);
        self.code.extend_from_slice(&delta.to_be_bytes());
        self
    }

    /// `invokeinterface index count 0`
    pub fn invokeinterface(&mut self, index: u16, count: u8) -> &mut Self {
        self.op_u16(Opcode::Invokeinterface, index);
        self.code.extend_from_slice(&[count, 0]);
        self
    }

    /// `invokedynamic index 0 0`
    pub fn invokedynamic(&mut self, index: u16) -> &mut Self {
        self.op_u16(Opcode::Invokedynamic, index);
        self.code.extend_from_slice(&[0, 0]);
        self
    }

    /// `multianewarray index dimensions`
    pub fn multianewarray(&mut self, index: u16, dimensions: u8) -> &mut Self {
        self.op_u16(Opcode::Multianewarray, index);
        self.code.push(dimensions);
        self
    }

    /// Allocate an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset
    pub fn label(&mut self, label: Label) -> &mut Self {
        let position = self.code.len();
        match self.labels.get_mut(label.0) {
            Some(slot) if slot.is_none() => *slot = Some(position),
            _ => {
                self.error.get_or_insert(WriteError::DuplicateLabel(label.0));
            }
        }
        self
    }

    fn fixup(&mut self, base: usize, label: Label, kind: FixupKind) {
        let at = self.code.len();
        let width = match kind {
            FixupKind::Relative32 => 4,
            FixupKind::Relative16 | FixupKind::Absolute16 => 2,
        };
        self.code.extend(std::iter::repeat(0).take(width));
        self.fixups.push(Fixup {
            at,
            base,
            label,
            kind,
        });
    }

    /// Emit a branch to `label`; `goto_w`/`jsr_w` take a 32-bit offset
    pub fn branch(&mut self, op: Opcode, label: Label) -> &mut Self {
        let base = self.code.len();
        self.code.push(op as u8);
        let kind = match op {
            Opcode::GotoW | Opcode::JsrW => FixupKind::Relative32,
            _ => FixupKind::Relative16,
        };
        self.fixup(base, label, kind);
        self
    }

    /// Push the absolute code offset of `label` (`sipush <offset>`)
    pub fn push_label_address(&mut self, label: Label) -> &mut Self {
        let base = self.code.len();
        self.code.push(Opcode::Sipush as u8);
        self.fixup(base, label, FixupKind::Absolute16);
        self
    }

    fn align_switch(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    /// `tableswitch` over `low..low + targets.len()`
    pub fn tableswitch(&mut self, default: Label, low: i32, targets: &[Label]) -> &mut Self {
        let base = self.code.len();
        self.code.push(Opcode::Tableswitch as u8);
        self.align_switch();
        self.fixup(base, default, FixupKind::Relative32);
        let high = low + targets.len() as i32 - 1;
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code.extend_from_slice(&high.to_be_bytes());
        for &target in targets {
            self.fixup(base, target, FixupKind::Relative32);
        }
        self
    }

    /// `lookupswitch` over `(key, target)` pairs, sorted by key on emission
    pub fn lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> &mut Self {
        let base = self.code.len();
        self.code.push(Opcode::Lookupswitch as u8);
        self.align_switch();
        self.fixup(base, default, FixupKind::Relative32);
        let mut pairs = pairs.to_vec();
        pairs.sort_by_key(|(key, _)| *key);
        self.code.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
        for (key, target) in pairs {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.fixup(base, target, FixupKind::Relative32);
        }
        self
    }

    /// Register an exception handler for `[start, end)`; `catch_type` 0 catches all
    pub fn handler(&mut self, start: Label, end: Label, handler: Label, catch_type: u16) -> &mut Self {
        self.handlers.push((start, end, handler, catch_type));
        self
    }

    fn resolve(&self, label: Label) -> Result<usize, WriteError> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or(WriteError::UndefinedLabel(label.0))
    }

    /// Patch all label references and produce the `Code` attribute
    pub fn finish(mut self) -> Result<CodeAttribute, WriteError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        for fixup in std::mem::take(&mut self.fixups) {
            let target = self.resolve(fixup.label)?;
            match fixup.kind {
                FixupKind::Relative16 => {
                    let offset = target as i64 - fixup.base as i64;
                    let offset = i16::try_from(offset).map_err(|_| WriteError::BranchOutOfRange {
                        from: fixup.base,
                        to: target,
                    })?;
                    self.code[fixup.at..fixup.at + 2].copy_from_slice(&offset.to_be_bytes());
                }
                FixupKind::Relative32 => {
                    let offset = (target as i64 - fixup.base as i64) as i32;
                    self.code[fixup.at..fixup.at + 4].copy_from_slice(&offset.to_be_bytes());
                }
                FixupKind::Absolute16 => {
                    let address = u16::try_from(target).map_err(|_| WriteError::BranchOutOfRange {
                        from: fixup.base,
                        to: target,
                    })?;
                    self.code[fixup.at..fixup.at + 2].copy_from_slice(&address.to_be_bytes());
                }
            }
        }

        let mut exception_table = Vec::with_capacity(self.handlers.len());
        for &(start, end, handler, catch_type) in &self.handlers {
            exception_table.push(ExceptionTableEntry {
                start_pc: self.resolve(start)? as u16,
                end_pc: self.resolve(end)? as u16,
                handler_pc: self.resolve(handler)? as u16,
                catch_type,
            });
        }

        Ok(CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code: self.code,
            exception_table,
            attributes: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_file::ClassFile;

    #[test]
    fn test_forward_label_address_then_branch() {
        let mut code = CodeBuilder::new(1, 0);
        let target = code.new_label();
        code.push_label_address(target);
        code.branch(Opcode::Goto, target);
        code.label(target);
        code.op(Opcode::Return);
        let attr = code.finish().unwrap();
        // sipush 6; goto +3; return
        assert_eq!(attr.code, vec![0x11, 0x00, 0x06, 0xa7, 0x00, 0x03, 0xb1]);
    }

    #[test]
    fn test_backward_branch() {
        let mut code = CodeBuilder::new(0, 0);
        let top = code.new_label();
        code.label(top).op(Opcode::Nop).branch(Opcode::Goto, top);
        let attr = code.finish().unwrap();
        assert_eq!(attr.code, vec![0x00, 0xa7, 0xff, 0xff]);
    }

    #[test]
    fn test_undefined_and_duplicate_labels() {
        let mut code = CodeBuilder::new(0, 0);
        let missing = code.new_label();
        code.branch(Opcode::Goto, missing);
        assert_eq!(code.finish().unwrap_err(), WriteError::UndefinedLabel(0));

        let mut code = CodeBuilder::new(0, 0);
        let twice = code.new_label();
        code.label(twice).label(twice);
        assert_eq!(code.finish().unwrap_err(), WriteError::DuplicateLabel(0));
    }

    #[test]
    fn test_tableswitch_padding() {
        let mut code = CodeBuilder::new(1, 0);
        let (a, b, default) = (code.new_label(), code.new_label(), code.new_label());
        code.op(Opcode::Iconst0);
        code.tableswitch(default, 0, &[a, b]);
        code.label(a).label(b).label(default).op(Opcode::Return);
        let attr = code.finish().unwrap();
        // opcode at 1, padding to 4, then default/low/high/2 targets
        assert_eq!(attr.code[1], Opcode::Tableswitch as u8);
        assert_eq!(&attr.code[2..4], &[0, 0]);
        let default_offset = i32::from_be_bytes([attr.code[4], attr.code[5], attr.code[6], attr.code[7]]);
        assert_eq!(default_offset, 24 - 1);
    }

    #[test]
    fn test_constants_are_deduplicated_and_wide() {
        let mut class = ClassBuilder::new("A", Some("java/lang/Object"));
        let a = class.long(7);
        let b = class.integer(1);
        assert_eq!(b, a + 2);
        assert_eq!(class.long(7), a);
        assert_eq!(class.class("A"), class.class("A"));

        let bytes = class.build();
        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.this_class_name(), "A");
        assert_eq!(parsed.super_class_name(), "java/lang/Object");
        assert_eq!(parsed.constant_pool.long(a), 7);
        assert!(parsed.constant_pool.get(a + 1).is_none());
        assert_eq!(parsed.constant_pool.integer(b), 1);
    }
}
