//! Native method bridge tests

mod common;

use common::{class, method, source, PUBLIC_STATIC};
use gvm_classfile::access::{ACC_NATIVE, ACC_PUBLIC, ACC_STATIC};
use gvm_classfile::opcode::array_type;
use gvm_classfile::{ClassBuilder, Opcode};
use gvm_core::{ArrayData, ObjectRef, Value, Vm, VmError};

fn natives_class() -> ClassBuilder {
    let mut main = class("Main");
    main.method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, "twice", "(J)J", None);
    main.method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, "missing", "(I)I", None);
    main.method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, "liar", "()I", None);
    main.method(ACC_PUBLIC | ACC_NATIVE, "greet", "(Ljava/lang/String;)Ljava/lang/String;", None);

    let twice = main.method_ref("Main", "twice", "(J)J");
    method(&mut main, PUBLIC_STATIC, "callTwice", "()J", 2, 0, |c| {
        c.op(Opcode::Lconst1).op_u16(Opcode::Invokestatic, twice);
        c.op_u16(Opcode::Invokestatic, twice).op(Opcode::Lreturn);
    });
    main
}

fn native_vm() -> Vm {
    Vm::builder()
        .source(source(&[&natives_class()]))
        .native("Main", "twice", "(J)J", |ctx| {
            Ok(Some(Value::Long(ctx.long_arg(0)? * 2)))
        })
        .native("Main", "liar", "()I", |_| Ok(Some(Value::Long(1))))
        .native(
            "Main",
            "greet",
            "(Ljava/lang/String;)Ljava/lang/String;",
            |ctx| {
                let this = ctx.this()?;
                let name = ctx.string_value(&ctx.object_arg(1)?)?;
                let text = format!("hello {} from {}", name, this.class().name());
                Ok(Some(ctx.new_string(&text)?.into()))
            },
        )
        .build()
}

#[test]
fn test_registered_native_is_called() {
    let vm = native_vm();
    assert_eq!(
        vm.invoke_static("Main", "callTwice", "()J", &[]).unwrap(),
        Some(Value::Long(4))
    );
}

#[test]
fn test_unregistered_native_is_fatal() {
    let vm = native_vm();
    match vm.invoke_static("Main", "missing", "(I)I", &[Value::Int(3)]) {
        Err(VmError::UnsatisfiedLink { class, name, descriptor }) => {
            assert_eq!(class, "Main");
            assert_eq!(name, "missing");
            assert_eq!(descriptor, "(I)I");
        }
        other => panic!("expected an unsatisfied link, got {:?}", other),
    }
}

#[test]
fn test_native_result_must_match_descriptor() {
    let vm = native_vm();
    assert!(matches!(
        vm.invoke_static("Main", "liar", "()I", &[]),
        Err(VmError::TypeMismatch { .. })
    ));
}

#[test]
fn test_instance_native_sees_receiver() {
    let mut caller = class("Caller");
    let main_class = caller.class("Main");
    let main_init = caller.method_ref("Main", "<init>", "()V");
    let greet = caller.method_ref("Main", "greet", "(Ljava/lang/String;)Ljava/lang/String;");
    let name = caller.string("gvm");
    method(&mut caller, PUBLIC_STATIC, "run", "()Ljava/lang/String;", 3, 0, |c| {
        c.op_u16(Opcode::New, main_class).op(Opcode::Dup);
        c.op_u16(Opcode::Invokespecial, main_init);
        c.op_u8(Opcode::Ldc, name as u8).op_u16(Opcode::Invokevirtual, greet);
        c.op(Opcode::Areturn);
    });

    let vm = Vm::builder()
        .source(source(&[&natives_class(), &caller]))
        .native(
            "Main",
            "greet",
            "(Ljava/lang/String;)Ljava/lang/String;",
            |ctx| {
                let this = ctx.this()?;
                let name = ctx.string_value(&ctx.object_arg(1)?)?;
                let text = format!("hello {} from {}", name, this.class().name());
                Ok(Some(ctx.new_string(&text)?.into()))
            },
        )
        .build();
    match vm.invoke_static("Caller", "run", "()Ljava/lang/String;", &[]) {
        Ok(Some(Value::Reference(Some(s)))) => {
            assert_eq!(vm.string_value(&s).unwrap(), "hello gvm from Main");
        }
        other => panic!("expected a string, got {:?}", other),
    }
}

#[test]
fn test_default_natives() {
    let mut main = class("Main");
    let arraycopy = main.method_ref(
        "java/lang/System",
        "arraycopy",
        "(Ljava/lang/Object;ILjava/lang/Object;II)V",
    );
    let bits = main.method_ref("java/lang/Float", "floatToRawIntBits", "(F)I");
    let hash = main.method_ref("java/lang/Object", "hashCode", "()I");
    let identity = main.method_ref("java/lang/System", "identityHashCode", "(Ljava/lang/Object;)I");
    // int[] a = {0, 1, 2, 3, 4}; System.arraycopy(a, 0, a, 1, 4); return a[4]
    method(&mut main, PUBLIC_STATIC, "shift", "()I", 5, 1, |c| {
        let (top, done) = (c.new_label(), c.new_label());
        c.op(Opcode::Iconst5).op_u8(Opcode::Newarray, array_type::T_INT).op(Opcode::Astore0);
        c.op(Opcode::Iconst0);
        c.label(top);
        c.op(Opcode::Dup).op(Opcode::Iconst5).branch(Opcode::IfIcmpge, done);
        c.op(Opcode::Dup).op(Opcode::Aload0).op(Opcode::Swap).op(Opcode::Dup).op(Opcode::Iastore);
        c.op(Opcode::Iconst1).op(Opcode::Iadd);
        c.branch(Opcode::Goto, top);
        c.label(done);
        c.op(Opcode::Pop);
        c.op(Opcode::Aload0).op(Opcode::Iconst0).op(Opcode::Aload0).op(Opcode::Iconst1).op(Opcode::Iconst4);
        c.op_u16(Opcode::Invokestatic, arraycopy);
        c.op(Opcode::Aload0).op(Opcode::Iconst4).op(Opcode::Iaload).op(Opcode::Ireturn);
    });
    method(&mut main, PUBLIC_STATIC, "bits", "()I", 1, 0, |c| {
        c.op(Opcode::Fconst1).op_u16(Opcode::Invokestatic, bits).op(Opcode::Ireturn);
    });
    // hashCode() and identityHashCode() agree
    method(&mut main, PUBLIC_STATIC, "hashes", "(Ljava/lang/Object;)I", 2, 1, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Invokevirtual, hash);
        c.op(Opcode::Aload0).op_u16(Opcode::Invokestatic, identity);
        c.op(Opcode::Isub).op(Opcode::Ireturn);
    });

    let vm = Vm::builder().source(source(&[&main])).build();
    assert_eq!(vm.invoke_static("Main", "shift", "()I", &[]).unwrap(), Some(Value::Int(3)));
    assert_eq!(
        vm.invoke_static("Main", "bits", "()I", &[]).unwrap(),
        Some(Value::Int(1.0f32.to_bits() as i32))
    );
    let text = vm.new_string("hash me").unwrap();
    assert_eq!(
        vm.invoke_static("Main", "hashes", "(Ljava/lang/Object;)I", &[text.into()]).unwrap(),
        Some(Value::Int(0))
    );
}

/// `Main.copy(src, dst, n)` calls `System.arraycopy(src, 0, dst, 0, n)`
fn copy_vm() -> Vm {
    let mut main = class("Main");
    let arraycopy = main.method_ref(
        "java/lang/System",
        "arraycopy",
        "(Ljava/lang/Object;ILjava/lang/Object;II)V",
    );
    let descriptor = "(Ljava/lang/Object;Ljava/lang/Object;I)V";
    method(&mut main, PUBLIC_STATIC, "copy", descriptor, 5, 3, |c| {
        c.op(Opcode::Aload0).op(Opcode::Iconst0).op(Opcode::Aload1).op(Opcode::Iconst0).op(Opcode::Iload2);
        c.op_u16(Opcode::Invokestatic, arraycopy).op(Opcode::Return);
    });
    Vm::builder().source(source(&[&main])).build()
}

fn reference_array(vm: &Vm, class: &str, elements: Vec<Option<ObjectRef>>) -> ObjectRef {
    let class = vm.runtime().array_class(class).unwrap();
    ObjectRef::with_array(class, ArrayData::Reference(elements))
}

fn elements(array: &ObjectRef) -> Vec<Option<ObjectRef>> {
    array
        .with_array_data(|data| match data {
            ArrayData::Reference(elements) => Ok(elements.clone()),
            other => panic!("expected a reference array, got {:?}", other.kind()),
        })
        .unwrap()
}

fn copy(vm: &Vm, src: &ObjectRef, dst: &ObjectRef, n: i32) -> Result<Option<Value>, VmError> {
    vm.invoke_static(
        "Main",
        "copy",
        "(Ljava/lang/Object;Ljava/lang/Object;I)V",
        &[src.clone().into(), dst.clone().into(), Value::Int(n)],
    )
}

#[test]
fn test_arraycopy_object_array_of_strings_into_string_array() {
    let vm = copy_vm();
    let (a, b) = (vm.new_string("a").unwrap(), vm.new_string("b").unwrap());
    let src = reference_array(&vm, "[Ljava/lang/Object;", vec![Some(a.clone()), None, Some(b.clone())]);
    let dst = reference_array(&vm, "[Ljava/lang/String;", vec![None; 3]);

    copy(&vm, &src, &dst, 3).unwrap();
    assert_eq!(elements(&dst), vec![Some(a), None, Some(b)]);
}

#[test]
fn test_arraycopy_stops_at_first_incompatible_element() {
    let vm = copy_vm();
    let object = ObjectRef::new_instance(vm.load_class("java/lang/Object").unwrap());
    let (a, b) = (vm.new_string("a").unwrap(), vm.new_string("b").unwrap());
    let src = reference_array(&vm, "[Ljava/lang/Object;", vec![Some(a.clone()), Some(object), Some(b)]);
    let dst = reference_array(&vm, "[Ljava/lang/String;", vec![None; 3]);

    assert!(matches!(copy(&vm, &src, &dst, 3), Err(VmError::ArrayStore(_))));
    assert_eq!(elements(&dst), vec![Some(a), None, None]);
}

#[test]
fn test_arraycopy_rejects_mismatched_kinds_and_ranges() {
    let vm = copy_vm();
    let strings = reference_array(&vm, "[Ljava/lang/String;", vec![None; 2]);
    let ints = vm.runtime().new_primitive_array(gvm_core::ArrayKind::Int, 2).unwrap();

    assert!(matches!(copy(&vm, &strings, &ints, 1), Err(VmError::ArrayStore(_))));
    assert!(matches!(copy(&vm, &ints, &strings, 0), Err(VmError::ArrayStore(_))));
    assert!(matches!(
        copy(&vm, &strings, &strings, 3),
        Err(VmError::ArrayIndexOutOfBounds { index: 3, length: 2 })
    ));
}
