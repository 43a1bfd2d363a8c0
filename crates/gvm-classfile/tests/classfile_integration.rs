//! Integration tests for the class-file reader and writer

use gvm_classfile::access::{ACC_FINAL, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC};
use gvm_classfile::attribute::Attribute;
use gvm_classfile::{
    ClassBuilder, ClassFile, ClassFileError, CodeBuilder, ConstantInfo, MethodDescriptor, Opcode,
    ReturnWidth,
};

fn sample_class() -> Vec<u8> {
    let mut class = ClassBuilder::new("demo/Counter", Some("java/lang/Object"));
    class.interface("java/lang/Runnable").source_file("Counter.java");

    let limit = class.integer(100_000);
    let big = class.long(1 << 40);
    class.constant_field(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "LIMIT", "I", limit);
    class.field(ACC_PUBLIC, "count", "J");

    let mut code = CodeBuilder::new(4, 1);
    code.op_u16(Opcode::Ldc2W, big).op(Opcode::Lreturn);
    class.method(ACC_PUBLIC | ACC_STATIC, "big", "()J", Some(code.finish().unwrap()));
    class.method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, "now", "()J", None);

    class.build()
}

#[test]
fn test_parse_builder_output() {
    let bytes = sample_class();
    let class = ClassFile::parse(&bytes).expect("valid class");

    assert_eq!(class.major_version, 52);
    assert_eq!(class.this_class_name(), "demo/Counter");
    assert_eq!(class.super_class_name(), "java/lang/Object");
    assert_eq!(class.interface_names(), vec!["java/lang/Runnable"]);
    assert_eq!(class.source_file(), Some("Counter.java"));

    assert_eq!(class.fields.len(), 2);
    let limit = &class.fields[0];
    assert_eq!(limit.name, "LIMIT");
    let value = limit.constant_value().expect("ConstantValue");
    assert_eq!(class.constant_pool.integer(value), 100_000);
    assert_eq!(class.fields[1].constant_value(), None);

    let big = class.method("big", "()J").expect("method");
    let code = big.code().expect("Code attribute");
    assert_eq!(code.max_stack, 4);
    assert_eq!(code.code[0], Opcode::Ldc2W as u8);

    let native = class.method("now", "()J").expect("native method");
    assert!(native.has_flag(ACC_NATIVE));
    assert!(native.code().is_none());
}

#[test]
fn test_long_constant_skips_following_index() {
    let bytes = sample_class();
    let class = ClassFile::parse(&bytes).unwrap();

    let wide: Vec<u16> = class
        .constant_pool
        .iter()
        .filter(|(_, c)| c.is_wide())
        .map(|(i, _)| i)
        .collect();
    assert!(!wide.is_empty());
    for index in wide {
        assert!(class.constant_pool.get(index + 1).is_none());
        assert!(matches!(
            class.constant_pool.get(index),
            Some(ConstantInfo::Long(_))
        ));
    }
}

#[test]
fn test_magic_mismatch() {
    let mut bytes = sample_class();
    bytes[0] = 0xCB;
    match ClassFile::parse(&bytes) {
        Err(ClassFileError::BadMagic(magic)) => assert_eq!(magic, 0xCBFE_BABE),
        other => panic!("expected BadMagic, got {:?}", other),
    }
}

#[test]
fn test_version_checks() {
    let mut class = ClassBuilder::new("Old", Some("java/lang/Object"));
    class.version(45, 3);
    assert!(ClassFile::parse(&class.build()).is_ok());

    class.version(50, 3);
    assert!(matches!(
        ClassFile::parse(&class.build()),
        Err(ClassFileError::UnsupportedVersion { major: 50, minor: 3 })
    ));
}

#[test]
fn test_truncated_input() {
    let bytes = sample_class();
    for cut in [3, 9, bytes.len() / 2, bytes.len() - 1] {
        assert!(
            matches!(ClassFile::parse(&bytes[..cut]), Err(ClassFileError::Truncated(_))),
            "cut at {cut}"
        );
    }
}

#[test]
fn test_bootstrap_methods_attribute() {
    let mut class = ClassBuilder::new("Indy", Some("java/lang/Object"));
    let target = class.method_ref("Indy", "bsm", "()V");
    let handle = class.method_handle(6, target);
    let bsm = class.bootstrap_method(handle, vec![]);
    let site = class.invoke_dynamic(bsm, "run", "()V");

    let parsed = ClassFile::parse(&class.build()).unwrap();
    let methods = parsed.bootstrap_methods().expect("BootstrapMethods");
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].method_ref, handle);
    assert!(matches!(
        parsed.constant_pool.get(site),
        Some(ConstantInfo::InvokeDynamic { bootstrap_method_attr_index: 0, .. })
    ));
    assert!(parsed
        .attributes
        .iter()
        .any(|a| matches!(a, Attribute::BootstrapMethods(_))));
}

#[test]
fn test_method_descriptor_widths() {
    let desc = MethodDescriptor::parse("(JD[I)J").unwrap();
    assert_eq!(desc.arg_slots(), 5);
    assert_eq!(desc.return_width(), ReturnWidth::Double);
}
