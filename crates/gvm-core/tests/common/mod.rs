//! Shared helpers for assembling test classes

#![allow(dead_code)]

use gvm_classfile::access::{ACC_PUBLIC, ACC_STATIC};
use gvm_classfile::{ClassBuilder, CodeBuilder, Opcode};
use gvm_core::{MemoryClassSource, Vm, VmOptions};

pub const OBJECT: &str = "java/lang/Object";
pub const PUBLIC_STATIC: u16 = ACC_PUBLIC | ACC_STATIC;

/// Add a method whose body is produced by `emit`
pub fn method(
    class: &mut ClassBuilder,
    access: u16,
    name: &str,
    descriptor: &str,
    max_stack: u16,
    max_locals: u16,
    emit: impl FnOnce(&mut CodeBuilder),
) {
    let mut code = CodeBuilder::new(max_stack, max_locals);
    emit(&mut code);
    class.method(access, name, descriptor, Some(code.finish().unwrap()));
}

/// Add `<init>()V` calling the superclass constructor
pub fn default_init(class: &mut ClassBuilder, super_name: &str) {
    let init = class.method_ref(super_name, "<init>", "()V");
    method(class, ACC_PUBLIC, "<init>", "()V", 1, 1, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, init);
        c.op(Opcode::Return);
    });
}

/// A class extending `java/lang/Object` with a default constructor
pub fn class(name: &str) -> ClassBuilder {
    let mut class = ClassBuilder::new(name, Some(OBJECT));
    default_init(&mut class, OBJECT);
    class
}

/// A VM whose application class path holds `classes`
pub fn vm(classes: &[&ClassBuilder]) -> Vm {
    vm_with(VmOptions::default(), classes)
}

/// Route VM logs through the test harness; `RUST_LOG` selects the level
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).format_timestamp_millis().try_init();
}

/// Like [`vm`], with explicit options
pub fn vm_with(options: VmOptions, classes: &[&ClassBuilder]) -> Vm {
    init_logging();
    Vm::builder().options(options).source(source(classes)).build()
}

/// In-memory source holding `classes`
pub fn source(classes: &[&ClassBuilder]) -> MemoryClassSource {
    let mut source = MemoryClassSource::new();
    for class in classes {
        source.add(class.build()).unwrap();
    }
    source
}
