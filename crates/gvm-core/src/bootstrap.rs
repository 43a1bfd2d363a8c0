//! Synthetic bootstrap classes
//!
//! When no boot class path provides them, the core `java/lang` classes are
//! generated here with the class-file writer. They carry just enough to run
//! plain programs: constructors, the string layout (`value:[C`), throwable
//! messages, and native declarations bound by the default native registry.

use crate::loader::ClassSource;
use gvm_classfile::access::{
    ACC_ABSTRACT, ACC_FINAL, ACC_INTERFACE, ACC_NATIVE, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC,
};
use gvm_classfile::opcode::array_type;
use gvm_classfile::{ClassBuilder, CodeAttribute, CodeBuilder, Opcode, WriteError};
use std::io;

const OBJECT: &str = "java/lang/Object";
const STRING: &str = "java/lang/String";
const THROWABLE: &str = "java/lang/Throwable";

/// Class source generating the minimal `java/lang` classes
#[derive(Debug, Default, Clone, Copy)]
pub struct BootstrapSource;

impl BootstrapSource {
    /// Names of every class this source can generate
    pub const CLASSES: &'static [&'static str] = &[
        OBJECT,
        STRING,
        "java/lang/Class",
        THROWABLE,
        "java/lang/Exception",
        "java/lang/RuntimeException",
        "java/lang/Error",
        "java/lang/System",
        "java/lang/Float",
        "java/lang/Double",
        "java/lang/Cloneable",
        "java/io/Serializable",
    ];
}

impl ClassSource for BootstrapSource {
    fn read_class(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        synthesize(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn describe(&self) -> String {
        "bootstrap".to_string()
    }
}

fn code(
    max_stack: u16,
    max_locals: u16,
    emit: impl FnOnce(&mut CodeBuilder),
) -> Result<Option<CodeAttribute>, WriteError> {
    let mut builder = CodeBuilder::new(max_stack, max_locals);
    emit(&mut builder);
    builder.finish().map(Some)
}

fn synthesize(name: &str) -> Result<Option<Vec<u8>>, WriteError> {
    let class = match name {
        OBJECT => object()?,
        STRING => string()?,
        "java/lang/Class" => class()?,
        THROWABLE => throwable()?,
        "java/lang/Exception" => throwable_subclass(name, THROWABLE)?,
        "java/lang/RuntimeException" => throwable_subclass(name, "java/lang/Exception")?,
        "java/lang/Error" => throwable_subclass(name, THROWABLE)?,
        "java/lang/System" => natives_only(
            name,
            &[
                ("registerNatives", "()V"),
                ("arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V"),
                ("nanoTime", "()J"),
                ("currentTimeMillis", "()J"),
                ("identityHashCode", "(Ljava/lang/Object;)I"),
            ],
        ),
        "java/lang/Float" => natives_only(
            name,
            &[("floatToRawIntBits", "(F)I"), ("intBitsToFloat", "(I)F")],
        ),
        "java/lang/Double" => natives_only(
            name,
            &[("doubleToRawLongBits", "(D)J"), ("longBitsToDouble", "(J)D")],
        ),
        "java/lang/Cloneable" | "java/io/Serializable" => {
            let mut iface = ClassBuilder::new(name, Some(OBJECT));
            iface.access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
            iface
        }
        _ => return Ok(None),
    };
    Ok(Some(class.build()))
}

/// Method ref for `super_name.<init>(descriptor)`
fn super_init(class: &mut ClassBuilder, super_name: &str, descriptor: &str) -> u16 {
    class.method_ref(super_name, "<init>", descriptor)
}

fn object() -> Result<ClassBuilder, WriteError> {
    let mut class = ClassBuilder::new(OBJECT, None);
    class.method(ACC_PUBLIC, "<init>", "()V", code(0, 1, |c| {
        c.op(Opcode::Return);
    })?);
    class.method(ACC_PRIVATE | ACC_STATIC | ACC_NATIVE, "registerNatives", "()V", None);
    class.method(ACC_PUBLIC | ACC_NATIVE, "hashCode", "()I", None);
    class.method(ACC_PUBLIC | ACC_FINAL | ACC_NATIVE, "getClass", "()Ljava/lang/Class;", None);
    Ok(class)
}

fn string() -> Result<ClassBuilder, WriteError> {
    let mut class = ClassBuilder::new(STRING, Some(OBJECT));
    class.access(ACC_PUBLIC | ACC_FINAL);
    class.interface("java/io/Serializable");
    class.field(ACC_PRIVATE | ACC_FINAL, "value", "[C");
    let init = super_init(&mut class, OBJECT, "()V");
    let value = class.field_ref(STRING, "value", "[C");

    class.method(ACC_PUBLIC, "<init>", "()V", code(2, 1, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, init);
        c.op(Opcode::Aload0).op(Opcode::Iconst0);
        c.op_u8(Opcode::Newarray, array_type::T_CHAR);
        c.op_u16(Opcode::Putfield, value).op(Opcode::Return);
    })?);
    class.method(ACC_PUBLIC, "<init>", "([C)V", code(2, 2, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, init);
        c.op(Opcode::Aload0).op(Opcode::Aload1);
        c.op_u16(Opcode::Putfield, value).op(Opcode::Return);
    })?);
    class.method(ACC_PUBLIC, "length", "()I", code(1, 1, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Getfield, value);
        c.op(Opcode::Arraylength).op(Opcode::Ireturn);
    })?);
    class.method(ACC_PUBLIC, "charAt", "(I)C", code(2, 2, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Getfield, value);
        c.op(Opcode::Iload1).op(Opcode::Caload).op(Opcode::Ireturn);
    })?);
    Ok(class)
}

fn class() -> Result<ClassBuilder, WriteError> {
    let mut class = ClassBuilder::new("java/lang/Class", Some(OBJECT));
    class.access(ACC_PUBLIC | ACC_FINAL);
    let get_name0 = class.method_ref("java/lang/Class", "getName0", "()Ljava/lang/String;");
    class.method(ACC_PRIVATE | ACC_STATIC | ACC_NATIVE, "registerNatives", "()V", None);
    class.method(ACC_PRIVATE | ACC_NATIVE, "getName0", "()Ljava/lang/String;", None);
    class.method(ACC_PUBLIC, "getName", "()Ljava/lang/String;", code(1, 1, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, get_name0);
        c.op(Opcode::Areturn);
    })?);
    Ok(class)
}

fn throwable() -> Result<ClassBuilder, WriteError> {
    let mut class = ClassBuilder::new(THROWABLE, Some(OBJECT));
    class.interface("java/io/Serializable");
    class.field(ACC_PRIVATE, "detailMessage", "Ljava/lang/String;");
    let init = super_init(&mut class, OBJECT, "()V");
    let message = class.field_ref(THROWABLE, "detailMessage", "Ljava/lang/String;");

    class.method(ACC_PUBLIC, "<init>", "()V", code(1, 1, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, init);
        c.op(Opcode::Return);
    })?);
    class.method(ACC_PUBLIC, "<init>", "(Ljava/lang/String;)V", code(2, 2, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, init);
        c.op(Opcode::Aload0).op(Opcode::Aload1);
        c.op_u16(Opcode::Putfield, message).op(Opcode::Return);
    })?);
    class.method(ACC_PUBLIC, "getMessage", "()Ljava/lang/String;", code(1, 1, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Getfield, message);
        c.op(Opcode::Areturn);
    })?);
    Ok(class)
}

fn throwable_subclass(name: &str, super_name: &str) -> Result<ClassBuilder, WriteError> {
    let mut class = ClassBuilder::new(name, Some(super_name));
    let init = super_init(&mut class, super_name, "()V");
    let init_message = super_init(&mut class, super_name, "(Ljava/lang/String;)V");

    class.method(ACC_PUBLIC, "<init>", "()V", code(1, 1, |c| {
        c.op(Opcode::Aload0).op_u16(Opcode::Invokespecial, init);
        c.op(Opcode::Return);
    })?);
    class.method(ACC_PUBLIC, "<init>", "(Ljava/lang/String;)V", code(2, 2, |c| {
        c.op(Opcode::Aload0).op(Opcode::Aload1);
        c.op_u16(Opcode::Invokespecial, init_message);
        c.op(Opcode::Return);
    })?);
    Ok(class)
}

fn natives_only(name: &str, methods: &[(&str, &str)]) -> ClassBuilder {
    let mut class = ClassBuilder::new(name, Some(OBJECT));
    class.access(ACC_PUBLIC | ACC_FINAL);
    for (method, descriptor) in methods {
        class.method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, method, descriptor, None);
    }
    class
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeRegistry;
    use gvm_classfile::ClassFile;

    #[test]
    fn test_every_class_parses() {
        for name in BootstrapSource::CLASSES {
            let bytes = BootstrapSource.read_class(name).unwrap().unwrap();
            let class = ClassFile::parse(&bytes).unwrap();
            assert_eq!(class.this_class_name(), *name);
        }
        assert!(BootstrapSource.read_class("java/util/List").unwrap().is_none());
    }

    #[test]
    fn test_declared_natives_are_registered() {
        let registry = NativeRegistry::with_defaults();
        for name in BootstrapSource::CLASSES {
            let bytes = BootstrapSource.read_class(name).unwrap().unwrap();
            let class = ClassFile::parse(&bytes).unwrap();
            for method in class.methods.iter().filter(|m| m.has_flag(ACC_NATIVE)) {
                assert!(
                    registry.contains(name, &method.name, &method.descriptor),
                    "{}.{}{}",
                    name,
                    method.name,
                    method.descriptor
                );
            }
        }
    }
}
