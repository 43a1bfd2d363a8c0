//! Class initialization tests
//!
//! The static initializer of a class must run exactly once, before the first
//! `new`, static field access or static call, including when several threads
//! race to trigger it.

mod common;

use common::{class, method, vm, PUBLIC_STATIC};
use gvm_classfile::access::{ACC_PUBLIC, ACC_STATIC};
use gvm_classfile::{ClassBuilder, Opcode};
use gvm_core::{ClassState, Value, VmError};

/// `Counter.<clinit>` spins for a while, then bumps `Tally.runs` and sets
/// `Counter.value` to 42
fn counter() -> (ClassBuilder, ClassBuilder) {
    let mut tally = class("Tally");
    tally.field(ACC_PUBLIC | ACC_STATIC, "runs", "I");

    let mut counter = class("Counter");
    counter.field(ACC_PUBLIC | ACC_STATIC, "value", "I");
    let runs = counter.field_ref("Tally", "runs", "I");
    let value = counter.field_ref("Counter", "value", "I");
    method(&mut counter, ACC_STATIC, "<clinit>", "()V", 2, 1, |c| {
        let spin = c.new_label();
        let done = c.new_label();
        c.push_int(20000).op(Opcode::Istore0);
        c.label(spin);
        c.op(Opcode::Iload0).branch(Opcode::Ifle, done);
        c.iinc(0, -1);
        c.branch(Opcode::Goto, spin);
        c.label(done);
        c.op_u16(Opcode::Getstatic, runs).op(Opcode::Iconst1).op(Opcode::Iadd);
        c.op_u16(Opcode::Putstatic, runs);
        c.push_int(42).op_u16(Opcode::Putstatic, value);
        c.op(Opcode::Return);
    });
    method(&mut counter, PUBLIC_STATIC, "get", "()I", 1, 0, |c| {
        c.op_u16(Opcode::Getstatic, value).op(Opcode::Ireturn);
    });
    (tally, counter)
}

fn main_class() -> ClassBuilder {
    let mut main = class("Main");
    let value = main.field_ref("Counter", "value", "I");
    let get = main.method_ref("Counter", "get", "()I");
    let runs = main.field_ref("Tally", "runs", "I");
    // Two triggers of the same initializer on one path
    method(&mut main, PUBLIC_STATIC, "run", "()I", 2, 0, |c| {
        c.op_u16(Opcode::Getstatic, value);
        c.op_u16(Opcode::Invokestatic, get);
        c.op(Opcode::Iadd).op(Opcode::Ireturn);
    });
    method(&mut main, PUBLIC_STATIC, "runs", "()I", 1, 0, |c| {
        c.op_u16(Opcode::Getstatic, runs).op(Opcode::Ireturn);
    });
    main
}

#[test]
fn test_initializer_runs_once() {
    let (tally, counter) = counter();
    let main = main_class();
    let vm = vm(&[&tally, &counter, &main]);

    assert_eq!(vm.load_class("Counter").unwrap().state(), ClassState::Linked);
    assert_eq!(vm.invoke_static("Main", "run", "()I", &[]).unwrap(), Some(Value::Int(84)));
    assert_eq!(vm.invoke_static("Main", "run", "()I", &[]).unwrap(), Some(Value::Int(84)));
    assert_eq!(vm.invoke_static("Main", "runs", "()I", &[]).unwrap(), Some(Value::Int(1)));
    assert_eq!(vm.load_class("Counter").unwrap().state(), ClassState::Initialized);
}

#[test]
fn test_concurrent_initialization_runs_once() {
    let (tally, counter) = counter();
    let main = main_class();
    let vm = vm(&[&tally, &counter, &main]);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let vm = vm.clone();
                scope.spawn(move || vm.invoke_static("Main", "run", "()I", &[]))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for result in results {
        assert_eq!(result.unwrap(), Some(Value::Int(84)));
    }
    assert_eq!(vm.invoke_static("Main", "runs", "()I", &[]).unwrap(), Some(Value::Int(1)));
}

#[test]
fn test_superclass_initialized_first() {
    // Parent.<clinit> sets order = order * 10 + 1, Child.<clinit> sets
    // order = order * 10 + 2
    let mut parent = class("Parent");
    parent.field(ACC_PUBLIC | ACC_STATIC, "order", "I");
    let order = parent.field_ref("Parent", "order", "I");
    method(&mut parent, ACC_STATIC, "<clinit>", "()V", 2, 0, |c| {
        c.op_u16(Opcode::Getstatic, order).push_int(10).op(Opcode::Imul);
        c.op(Opcode::Iconst1).op(Opcode::Iadd).op_u16(Opcode::Putstatic, order);
        c.op(Opcode::Return);
    });

    let mut child = ClassBuilder::new("Child", Some("Parent"));
    let order = child.field_ref("Parent", "order", "I");
    method(&mut child, ACC_STATIC, "<clinit>", "()V", 2, 0, |c| {
        c.op_u16(Opcode::Getstatic, order).push_int(10).op(Opcode::Imul);
        c.op(Opcode::Iconst2).op(Opcode::Iadd).op_u16(Opcode::Putstatic, order);
        c.op(Opcode::Return);
    });
    method(&mut child, PUBLIC_STATIC, "order", "()I", 1, 0, |c| {
        c.op_u16(Opcode::Getstatic, order).op(Opcode::Ireturn);
    });

    let vm = vm(&[&parent, &child]);
    assert_eq!(vm.invoke_static("Child", "order", "()I", &[]).unwrap(), Some(Value::Int(12)));
}

#[test]
fn test_constant_values_applied_at_initialization() {
    let mut config = class("Config");
    let limit = config.integer(1024);
    let greeting = config.string("hi");
    config.constant_field(ACC_PUBLIC | ACC_STATIC, "LIMIT", "I", limit);
    config.constant_field(ACC_PUBLIC | ACC_STATIC, "GREETING", "Ljava/lang/String;", greeting);

    let mut main = class("Main");
    let limit = main.field_ref("Config", "LIMIT", "I");
    let greeting = main.field_ref("Config", "GREETING", "Ljava/lang/String;");
    let length = main.method_ref("java/lang/String", "length", "()I");
    method(&mut main, PUBLIC_STATIC, "run", "()I", 2, 0, |c| {
        c.op_u16(Opcode::Getstatic, limit);
        c.op_u16(Opcode::Getstatic, greeting).op_u16(Opcode::Invokevirtual, length);
        c.op(Opcode::Iadd).op(Opcode::Ireturn);
    });

    let vm = vm(&[&config, &main]);
    assert_eq!(vm.invoke_static("Main", "run", "()I", &[]).unwrap(), Some(Value::Int(1026)));
}

#[test]
fn test_failed_initializer_is_not_retried() {
    let mut broken = class("Broken");
    broken.field(ACC_PUBLIC | ACC_STATIC, "value", "I");
    let value = broken.field_ref("Broken", "value", "I");
    method(&mut broken, ACC_STATIC, "<clinit>", "()V", 2, 0, |c| {
        c.op(Opcode::Iconst1).op(Opcode::Iconst0).op(Opcode::Idiv);
        c.op_u16(Opcode::Putstatic, value).op(Opcode::Return);
    });

    let mut main = class("Main");
    let value = main.field_ref("Broken", "value", "I");
    method(&mut main, PUBLIC_STATIC, "run", "()I", 1, 0, |c| {
        c.op_u16(Opcode::Getstatic, value).op(Opcode::Ireturn);
    });

    let vm = vm(&[&broken, &main]);
    assert!(matches!(
        vm.invoke_static("Main", "run", "()I", &[]),
        Err(VmError::ArithmeticException(_))
    ));
    assert_eq!(vm.load_class("Broken").unwrap().state(), ClassState::Failed);
    assert!(matches!(
        vm.invoke_static("Main", "run", "()I", &[]),
        Err(VmError::ClassInitFailed(name)) if name == "Broken"
    ));
}
