//! Linked runtime classes
//!
//! A [`Class`] is produced from a parsed [`ClassFile`] once its superclass and
//! interfaces are loaded. Linking assigns field offsets (inherited fields
//! first) and builds the method table; initialization is driven by the
//! interpreter through the [`ClassState`] machine.

use crate::heap::{ArrayKind, ObjectRef};
use crate::thread::ThreadId;
use crate::value::{Slot, Value};
use crate::{VmError, VmResult};
use gvm_classfile::access::{ACC_ABSTRACT, ACC_FINAL, ACC_INTERFACE, ACC_NATIVE, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC};
use gvm_classfile::attribute::{Attribute, CodeAttribute, ExceptionTableEntry, LineNumber};
use gvm_classfile::{ClassFile, ConstantPool, FieldType, MemberInfo, MethodDescriptor, Opcode};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// Class lifecycle state; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassState {
    /// Parsed, not yet linked
    Loaded,
    /// Superclass resolved and layout assigned
    Linked,
    /// Static initializer running on the given thread
    Initializing(ThreadId),
    /// Static initializer completed
    Initialized,
    /// Static initializer failed; the class is unusable
    Failed,
}

impl ClassState {
    fn rank(self) -> u8 {
        match self {
            ClassState::Loaded => 0,
            ClassState::Linked => 1,
            ClassState::Initializing(_) => 2,
            ClassState::Initialized => 3,
            ClassState::Failed => 4,
        }
    }
}

/// A declared field
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    descriptor: String,
    access_flags: u16,
    ty: FieldType,
    offset: usize,
    constant_value: Option<u16>,
}

impl Field {
    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field descriptor
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Parsed field type
    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    /// Access flags
    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    /// Whether the field is static
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// Slot offset in the instance layout or static storage
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// `ConstantValue` pool index, if any
    pub fn constant_value(&self) -> Option<u16> {
        self.constant_value
    }
}

/// A method with its code
#[derive(Debug, Clone)]
pub struct Method {
    /// Internal name of the declaring class
    pub class_name: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Access flags
    pub access_flags: u16,
    /// Parsed descriptor
    pub signature: MethodDescriptor,
    /// Maximum operand stack depth
    pub max_stack: usize,
    /// Number of local slots
    pub max_locals: usize,
    /// Bytecode; `[invokenative, xreturn]` for native methods
    pub code: Vec<u8>,
    /// Exception handlers
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Source line table
    pub line_numbers: Vec<LineNumber>,
}

impl Method {
    /// Whether the method is static
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// Whether the method is implemented by the host
    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }

    /// Whether the method has no body
    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    /// Whether the method binds without virtual selection
    pub fn is_private(&self) -> bool {
        self.access_flags & ACC_PRIVATE != 0
    }

    /// Argument slots including the receiver
    pub fn arg_slots(&self) -> usize {
        self.signature.arg_slots() + usize::from(!self.is_static())
    }

    /// Source line for a code offset
    pub fn line_number(&self, pc: usize) -> Option<u16> {
        self.line_numbers
            .iter()
            .filter(|e| e.start_pc as usize <= pc)
            .max_by_key(|e| e.start_pc)
            .map(|e| e.line_number)
    }

    /// `class.name(descriptor)` identity string
    pub fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.class_name, self.name, self.descriptor)
    }

    fn from_member(class_name: &str, info: MemberInfo) -> VmResult<Self> {
        let signature = MethodDescriptor::parse(&info.descriptor)?;
        let is_static = info.access_flags & ACC_STATIC != 0;

        let mut method = Method {
            class_name: class_name.to_string(),
            name: info.name,
            descriptor: info.descriptor,
            access_flags: info.access_flags,
            signature,
            max_stack: 0,
            max_locals: 0,
            code: Vec::new(),
            exception_table: Vec::new(),
            line_numbers: Vec::new(),
        };

        if method.is_native() {
            method.code = vec![Opcode::Invokenative as u8, return_opcode(&method.signature) as u8];
            method.max_stack = method.signature.return_width().slots();
            method.max_locals = method.signature.arg_slots() + usize::from(!is_static);
            return Ok(method);
        }

        let code = info.attributes.into_iter().find_map(|a| match a {
            Attribute::Code(code) => Some(code),
            _ => None,
        });
        if let Some(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        }) = code
        {
            method.max_stack = max_stack as usize;
            method.max_locals = max_locals as usize;
            method.code = code;
            method.exception_table = exception_table;
            method.line_numbers = attributes
                .into_iter()
                .filter_map(|a| match a {
                    Attribute::LineNumberTable(table) => Some(table),
                    _ => None,
                })
                .flatten()
                .collect();
        }
        Ok(method)
    }
}

fn return_opcode(signature: &MethodDescriptor) -> Opcode {
    match &signature.ret {
        None => Opcode::Return,
        Some(FieldType::Long) => Opcode::Lreturn,
        Some(FieldType::Double) => Opcode::Dreturn,
        Some(FieldType::Float) => Opcode::Freturn,
        Some(FieldType::Object(_) | FieldType::Array(_)) => Opcode::Areturn,
        Some(_) => Opcode::Ireturn,
    }
}

#[derive(Debug)]
struct ArrayInfo {
    kind: ArrayKind,
    component: Option<Arc<Class>>,
}

/// A linked class
pub struct Class {
    name: String,
    access_flags: u16,
    super_class: Option<Arc<Class>>,
    interfaces: Vec<Arc<Class>>,
    constant_pool: ConstantPool,
    source_file: Option<String>,
    fields: Vec<Field>,
    methods: Vec<Arc<Method>>,
    instance_template: Vec<Slot>,
    statics: Mutex<Vec<Slot>>,
    state: Mutex<ClassState>,
    array: Option<ArrayInfo>,
    mirror: OnceCell<ObjectRef>,
}

impl Class {
    /// Link a parsed class against its loaded superclass and interfaces
    pub fn link(
        class_file: ClassFile,
        super_class: Option<Arc<Class>>,
        interfaces: Vec<Arc<Class>>,
    ) -> VmResult<Self> {
        let name = class_file.this_class_name().to_string();
        let source_file = class_file.source_file().map(str::to_string);
        let ClassFile {
            constant_pool,
            access_flags,
            fields: field_infos,
            methods: method_infos,
            ..
        } = class_file;

        let mut instance_template = super_class
            .as_ref()
            .map(|s| s.instance_template.clone())
            .unwrap_or_default();
        let mut statics = Vec::new();

        let mut fields = Vec::with_capacity(field_infos.len());
        for info in field_infos {
            let ty = FieldType::parse(&info.descriptor)?;
            let storage = if info.has_flag(ACC_STATIC) {
                &mut statics
            } else {
                &mut instance_template
            };
            let offset = storage.len();
            let zero = Value::default_for(&ty);
            storage.push(zero.to_slot());
            if zero.slot_count() == 2 {
                storage.push(Slot::Top);
            }
            fields.push(Field {
                constant_value: info.constant_value(),
                name: info.name,
                descriptor: info.descriptor,
                access_flags: info.access_flags,
                ty,
                offset,
            });
        }

        let methods = method_infos
            .into_iter()
            .map(|info| Method::from_member(&name, info).map(Arc::new))
            .collect::<VmResult<Vec<_>>>()?;

        Ok(Self {
            name,
            access_flags,
            super_class,
            interfaces,
            constant_pool,
            source_file,
            fields,
            methods,
            instance_template,
            statics: Mutex::new(statics),
            state: Mutex::new(ClassState::Loaded),
            array: None,
            mirror: OnceCell::new(),
        })
    }

    /// Create an array class; arrays need no initialization
    pub fn new_array(
        name: String,
        object_class: Arc<Class>,
        kind: ArrayKind,
        component: Option<Arc<Class>>,
    ) -> Self {
        Self {
            name,
            access_flags: ACC_PUBLIC | ACC_FINAL | ACC_ABSTRACT,
            super_class: Some(object_class),
            interfaces: Vec::new(),
            constant_pool: ConstantPool::default(),
            source_file: None,
            fields: Vec::new(),
            methods: Vec::new(),
            instance_template: Vec::new(),
            statics: Mutex::new(Vec::new()),
            state: Mutex::new(ClassState::Initialized),
            array: Some(ArrayInfo { kind, component }),
            mirror: OnceCell::new(),
        }
    }

    /// Internal name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access flags
    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    /// Whether this class cannot be instantiated
    pub fn is_abstract(&self) -> bool {
        self.access_flags & (ACC_ABSTRACT | ACC_INTERFACE) != 0
    }

    /// Direct superclass
    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.super_class.as_ref()
    }

    /// Direct superinterfaces
    pub fn interfaces(&self) -> &[Arc<Class>] {
        &self.interfaces
    }

    /// Constant pool (empty for array classes)
    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    /// `SourceFile` attribute
    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    /// Declared fields
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Declared methods
    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    /// Zeroed instance field slots, inherited fields first
    pub fn instance_template(&self) -> &[Slot] {
        &self.instance_template
    }

    /// Element kind, for array classes
    pub fn array_kind(&self) -> Option<ArrayKind> {
        self.array.as_ref().map(|a| a.kind)
    }

    /// Component class, for reference array classes
    pub fn component(&self) -> Option<&Arc<Class>> {
        self.array.as_ref().and_then(|a| a.component.as_ref())
    }

    /// Whether this is an array class
    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    /// This class followed by its superclasses
    pub fn ancestors(&self) -> impl Iterator<Item = &Class> {
        std::iter::successors(Some(self), |c| c.super_class.as_deref())
    }

    /// Method declared directly on this class
    pub fn declared_method(&self, name: &str, descriptor: &str) -> Option<&Arc<Method>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Field declared directly on this class
    pub fn declared_field(&self, name: &str, descriptor: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)
    }

    /// Search this class, then its superclass chain; first match wins
    pub fn find_method(
        self: &Arc<Self>,
        name: &str,
        descriptor: &str,
    ) -> Option<(Arc<Class>, Arc<Method>)> {
        let mut current = Some(self.clone());
        while let Some(class) = current {
            if let Some(method) = class.declared_method(name, descriptor) {
                let method = method.clone();
                return Some((class, method));
            }
            current = class.super_class.clone();
        }
        None
    }

    /// Search all superinterfaces breadth-first, preferring a default
    /// (non-abstract) method over an abstract declaration
    pub fn find_interface_method(
        self: &Arc<Self>,
        name: &str,
        descriptor: &str,
    ) -> Option<(Arc<Class>, Arc<Method>)> {
        let mut pending: Vec<Arc<Class>> = Vec::new();
        if self.is_interface() {
            pending.push(self.clone());
        }
        for class in self.ancestors() {
            pending.extend(class.interfaces.iter().cloned());
        }

        let mut fallback = None;
        let mut i = 0;
        while i < pending.len() {
            let iface = pending[i].clone();
            if let Some(method) = iface.declared_method(name, descriptor) {
                if !method.is_abstract() {
                    let method = method.clone();
                    return Some((iface, method));
                }
                if fallback.is_none() {
                    fallback = Some((iface.clone(), method.clone()));
                }
            }
            pending.extend(iface.interfaces.iter().cloned());
            i += 1;
        }
        fallback
    }

    /// Field resolution: this class, then superinterfaces, then superclass
    pub fn resolve_field(self: &Arc<Self>, name: &str, descriptor: &str) -> Option<(Arc<Class>, Field)> {
        if let Some(field) = self.declared_field(name, descriptor) {
            return Some((self.clone(), field.clone()));
        }
        for iface in &self.interfaces {
            if let Some(found) = iface.resolve_field(name, descriptor) {
                return Some(found);
            }
        }
        self.super_class.as_ref()?.resolve_field(name, descriptor)
    }

    /// Whether `name` is this class or one of its superclasses
    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.ancestors().any(|c| c.name == name)
    }

    /// Whether this class or a superclass implements interface `name`
    pub fn implements(&self, name: &str) -> bool {
        self.ancestors().any(|c| {
            c.interfaces
                .iter()
                .any(|i| i.name == name || i.implements(name))
        })
    }

    /// Whether an instance of this class may be used as `target`
    pub fn is_assignable_to(&self, target: &Class) -> bool {
        if self.name == target.name {
            return true;
        }
        if let Some(info) = &self.array {
            if let Some(target_info) = &target.array {
                return match (&info.component, &target_info.component) {
                    (Some(a), Some(b)) => a.is_assignable_to(b),
                    _ => false,
                };
            }
            return matches!(
                target.name.as_str(),
                "java/lang/Object" | "java/lang/Cloneable" | "java/io/Serializable"
            );
        }
        if target.is_interface() {
            return self.implements(&target.name);
        }
        self.is_subclass_of(&target.name)
    }

    /// Read a static field declared on this class
    pub fn get_static(&self, field: &Field) -> VmResult<Value> {
        let statics = self.statics.lock();
        let slot = statics
            .get(field.offset)
            .ok_or_else(|| VmError::IncompatibleClassChange(format!("{}.{} is not static", self.name, field.name)))?;
        Value::from_slot(slot)
    }

    /// Write a static field declared on this class
    pub fn set_static(&self, field: &Field, value: Value) -> VmResult<()> {
        let mut statics = self.statics.lock();
        if field.offset + value.slot_count() > statics.len() {
            return Err(VmError::IncompatibleClassChange(format!(
                "{}.{} is not static",
                self.name, field.name
            )));
        }
        value.write_to(&mut statics, field.offset);
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> ClassState {
        *self.state.lock()
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ClassState> {
        self.state.lock()
    }

    /// Move to `next` if it is later in the lifecycle; returns whether it moved
    pub(crate) fn advance_state(&self, next: ClassState) -> bool {
        let mut state = self.state.lock();
        if next.rank() > state.rank() {
            *state = next;
            true
        } else {
            false
        }
    }

    pub(crate) fn mirror_cell(&self) -> &OnceCell<ObjectRef> {
        &self.mirror
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvm_classfile::{ClassBuilder, CodeBuilder};

    fn link(builder: &ClassBuilder, super_class: Option<Arc<Class>>) -> Arc<Class> {
        let cf = ClassFile::parse(&builder.build()).unwrap();
        let class = Class::link(cf, super_class, Vec::new()).unwrap();
        Arc::new(class)
    }

    fn body(op: Opcode) -> CodeAttribute {
        let mut code = CodeBuilder::new(1, 1);
        code.op(op);
        code.finish().unwrap()
    }

    #[test]
    fn test_inherited_fields_come_first() {
        let mut base = ClassBuilder::new("Base", None);
        base.field(ACC_PUBLIC, "a", "I").field(ACC_PUBLIC, "b", "J");
        base.field(ACC_PUBLIC | ACC_STATIC, "s", "I");
        let base = link(&base, None);

        let mut derived = ClassBuilder::new("Derived", Some("Base"));
        derived.field(ACC_PUBLIC, "c", "I");
        let derived = link(&derived, Some(base.clone()));

        assert_eq!(base.instance_template().len(), 3);
        assert_eq!(derived.instance_template().len(), 4);
        assert_eq!(derived.declared_field("c", "I").unwrap().offset(), 3);
        let (owner, field) = derived.resolve_field("b", "J").unwrap();
        assert_eq!(owner.name(), "Base");
        assert_eq!(field.offset(), 1);
        assert_eq!(base.declared_field("s", "I").unwrap().offset(), 0);
    }

    #[test]
    fn test_subclass_override_wins() {
        let mut base = ClassBuilder::new("Base", None);
        base.method(ACC_PUBLIC, "speak", "()I", Some(body(Opcode::Iconst1)));
        base.method(ACC_PUBLIC, "only", "()V", Some(body(Opcode::Return)));
        let base = link(&base, None);

        let mut derived = ClassBuilder::new("Derived", Some("Base"));
        derived.method(ACC_PUBLIC, "speak", "()I", Some(body(Opcode::Iconst2)));
        let derived = link(&derived, Some(base));

        let (owner, method) = derived.find_method("speak", "()I").unwrap();
        assert_eq!(owner.name(), "Derived");
        assert_eq!(method.code, vec![Opcode::Iconst2 as u8]);
        let (owner, _) = derived.find_method("only", "()V").unwrap();
        assert_eq!(owner.name(), "Base");
        assert!(derived.find_method("missing", "()V").is_none());
    }

    #[test]
    fn test_native_method_gets_bridge_code() {
        let mut class = ClassBuilder::new("N", None);
        class.method(ACC_PUBLIC | ACC_STATIC | ACC_NATIVE, "twice", "(J)J", None);
        let class = link(&class, None);
        let method = class.declared_method("twice", "(J)J").unwrap();
        assert_eq!(method.code, vec![Opcode::Invokenative as u8, Opcode::Lreturn as u8]);
        assert_eq!(method.max_locals, 2);
        assert_eq!(method.max_stack, 2);
    }

    #[test]
    fn test_state_is_monotonic() {
        let class = link(&ClassBuilder::new("S", None), None);
        assert_eq!(class.state(), ClassState::Loaded);
        assert!(class.advance_state(ClassState::Linked));
        assert!(class.advance_state(ClassState::Initialized));
        assert!(!class.advance_state(ClassState::Linked));
        assert_eq!(class.state(), ClassState::Initialized);
    }
}
