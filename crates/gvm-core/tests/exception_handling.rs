//! Exception handling tests
//!
//! - Handlers matched by catch type, including catch-all
//! - Propagation through callers
//! - Uncaught exceptions reported with the message and a backtrace
//! - `invokedynamic` call sites are never bound

mod common;

use common::{class, method, vm, PUBLIC_STATIC};
use gvm_classfile::{ClassBuilder, Opcode};
use gvm_core::{Value, VmError};

const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";

/// `Thrower.fail(String)` throws a RuntimeException carrying the argument
fn thrower() -> ClassBuilder {
    let mut thrower = class("Thrower");
    thrower.source_file("Thrower.java");
    let exception = thrower.class(RUNTIME_EXCEPTION);
    let init = thrower.method_ref(RUNTIME_EXCEPTION, "<init>", "(Ljava/lang/String;)V");
    method(&mut thrower, PUBLIC_STATIC, "fail", "(Ljava/lang/String;)V", 3, 1, |c| {
        c.op_u16(Opcode::New, exception).op(Opcode::Dup).op(Opcode::Aload0);
        c.op_u16(Opcode::Invokespecial, init);
        c.op(Opcode::Athrow);
    });
    thrower
}

#[test]
fn test_handler_catches_exception_from_callee() {
    let mut main = class("Main");
    let message = main.string("boom");
    let fail = main.method_ref("Thrower", "fail", "(Ljava/lang/String;)V");
    let catch_type = main.class(RUNTIME_EXCEPTION);
    let get_message = main.method_ref("java/lang/Throwable", "getMessage", "()Ljava/lang/String;");
    let length = main.method_ref("java/lang/String", "length", "()I");
    method(&mut main, PUBLIC_STATIC, "run", "()I", 2, 1, |c| {
        let (start, end, handler) = (c.new_label(), c.new_label(), c.new_label());
        c.label(start);
        c.op_u8(Opcode::Ldc, message as u8).op_u16(Opcode::Invokestatic, fail);
        c.op(Opcode::Iconst0).op(Opcode::Ireturn);
        c.label(end);
        c.label(handler);
        // The handler starts with only the exception on the stack
        c.op(Opcode::Astore0);
        c.op(Opcode::Aload0).op_u16(Opcode::Invokevirtual, get_message);
        c.op_u16(Opcode::Invokevirtual, length);
        c.op(Opcode::Ireturn);
        c.handler(start, end, handler, catch_type);
    });

    let vm = vm(&[&thrower(), &main]);
    assert_eq!(vm.invoke_static("Main", "run", "()I", &[]).unwrap(), Some(Value::Int(4)));
}

#[test]
fn test_handler_type_must_match() {
    let mut main = class("Main");
    let message = main.string("boom");
    let fail = main.method_ref("Thrower", "fail", "(Ljava/lang/String;)V");
    let error = main.class("java/lang/Error");
    method(&mut main, PUBLIC_STATIC, "run", "()I", 2, 0, |c| {
        let (start, end, handler, any) = (c.new_label(), c.new_label(), c.new_label(), c.new_label());
        c.label(start);
        c.op_u8(Opcode::Ldc, message as u8).op_u16(Opcode::Invokestatic, fail);
        c.op(Opcode::Iconst0).op(Opcode::Ireturn);
        c.label(end);
        c.label(handler);
        c.op(Opcode::Pop).op(Opcode::Iconst1).op(Opcode::Ireturn);
        c.label(any);
        c.op(Opcode::Pop).op(Opcode::Iconst2).op(Opcode::Ireturn);
        c.handler(start, end, handler, error);
        c.handler(start, end, any, 0);
    });

    let vm = vm(&[&thrower(), &main]);
    assert_eq!(vm.invoke_static("Main", "run", "()I", &[]).unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_uncaught_exception_reports_message_and_trace() {
    let mut main = class("Main");
    let message = main.string("no handler");
    let fail = main.method_ref("Thrower", "fail", "(Ljava/lang/String;)V");
    method(&mut main, PUBLIC_STATIC, "run", "()V", 1, 0, |c| {
        c.op_u8(Opcode::Ldc, message as u8).op_u16(Opcode::Invokestatic, fail);
        c.op(Opcode::Return);
    });

    let vm = vm(&[&thrower(), &main]);
    match vm.invoke_static("Main", "run", "()V", &[]) {
        Err(VmError::UncaughtException(report)) => {
            let mut lines = report.lines();
            assert_eq!(lines.next(), Some("java.lang.RuntimeException: no handler"));
            assert_eq!(lines.next().map(str::trim), Some("at Thrower.fail(Thrower.java)"));
            assert_eq!(lines.next().map(str::trim), Some("at Main.run(pc 2)"));
        }
        other => panic!("expected an uncaught exception, got {:?}", other),
    }
}

#[test]
fn test_throwing_non_throwable_fails() {
    let mut main = class("Main");
    let text = main.string("not an exception");
    method(&mut main, PUBLIC_STATIC, "run", "()V", 1, 0, |c| {
        c.op_u8(Opcode::Ldc, text as u8).op(Opcode::Athrow);
    });
    method(&mut main, PUBLIC_STATIC, "throwNull", "()V", 1, 0, |c| {
        c.op(Opcode::AconstNull).op(Opcode::Athrow);
    });

    let vm = vm(&[&main]);
    assert!(matches!(
        vm.invoke_static("Main", "run", "()V", &[]),
        Err(VmError::TypeMismatch { .. })
    ));
    assert!(matches!(
        vm.invoke_static("Main", "throwNull", "()V", &[]),
        Err(VmError::NullPointer)
    ));
}

#[test]
fn test_invokedynamic_is_unresolved() {
    let mut main = class("Main");
    let target = main.method_ref("Main", "factory", "()Ljava/lang/Object;");
    let handle = main.method_handle(6, target);
    let bootstrap = main.bootstrap_method(handle, Vec::new());
    let site = main.invoke_dynamic(bootstrap, "make", "()Ljava/lang/Runnable;");
    method(&mut main, PUBLIC_STATIC, "run", "()V", 1, 0, |c| {
        c.invokedynamic(site).op(Opcode::Pop).op(Opcode::Return);
    });

    let vm = vm(&[&main]);
    match vm.invoke_static("Main", "run", "()V", &[]) {
        Err(VmError::UnresolvedDynamic { class, name, descriptor }) => {
            assert_eq!(class, "Main");
            assert_eq!(name, "make");
            assert_eq!(descriptor, "()Ljava/lang/Runnable;");
        }
        other => panic!("expected an unresolved call site, got {:?}", other),
    }
}
