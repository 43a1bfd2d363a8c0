//! Shared runtime state
//!
//! One [`Runtime`] backs a VM instance and is shared by all of its threads:
//! - the bootstrap and application class loaders
//! - the native registry, fixed at construction
//! - interned string literals and class mirrors
//! - optional profiling counters

use crate::bootstrap::BootstrapSource;
use crate::class::{Class, Field};
use crate::heap::{ArrayData, ArrayKind, ObjectRef};
use crate::loader::{ClassLoader, ClassSource};
use crate::native::NativeRegistry;
use crate::profiler::Profiler;
use crate::value::Value;
use crate::vm::VmOptions;
use crate::{VmError, VmResult};
use gvm_classfile::{ConstantInfo, FieldType};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Internal name of the string class
pub const STRING_CLASS: &str = "java/lang/String";

/// State shared by every thread of one VM
pub struct Runtime {
    options: VmOptions,
    bootstrap: Arc<ClassLoader>,
    app: Arc<ClassLoader>,
    natives: NativeRegistry,
    strings: Mutex<FxHashMap<String, ObjectRef>>,
    profiler: Option<Profiler>,
    started: Instant,
}

impl Runtime {
    /// Create a runtime; `boot_sources` are searched before the synthetic
    /// bootstrap classes, `app_sources` after the bootstrap loader
    pub fn new(
        options: VmOptions,
        boot_sources: Vec<Arc<dyn ClassSource>>,
        app_sources: Vec<Arc<dyn ClassSource>>,
        natives: NativeRegistry,
    ) -> Self {
        let mut boot = boot_sources;
        boot.push(Arc::new(BootstrapSource));
        let bootstrap = Arc::new(ClassLoader::new("bootstrap", None, boot));
        let app = Arc::new(ClassLoader::new("app", Some(bootstrap.clone()), app_sources));
        let profiler = options.profile.then(Profiler::new);

        Self {
            options,
            bootstrap,
            app,
            natives,
            strings: Mutex::new(FxHashMap::default()),
            profiler,
            started: Instant::now(),
        }
    }

    /// Configuration
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Native function table
    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    /// Profiling counters, when enabled
    pub fn profiler(&self) -> Option<&Profiler> {
        self.profiler.as_ref()
    }

    /// Time since the runtime was created
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Application class loader
    pub fn class_loader(&self) -> &Arc<ClassLoader> {
        &self.app
    }

    /// Load and link a class or array class by internal name
    pub fn load_class(&self, name: &str) -> VmResult<Arc<Class>> {
        if name.starts_with('[') {
            return self.array_class(name);
        }
        self.app.load(name)
    }

    /// Array class for a descriptor such as `[I` or `[[Ljava/lang/String;`
    pub fn array_class(&self, name: &str) -> VmResult<Arc<Class>> {
        if let Some(class) = self.bootstrap.find_loaded(name) {
            return Ok(class);
        }
        let component = name
            .strip_prefix('[')
            .ok_or_else(|| VmError::ClassNotFound(name.to_string()))?;
        let kind = ArrayKind::from_component(component)
            .ok_or_else(|| VmError::ClassNotFound(name.to_string()))?;

        let component_class = match kind {
            ArrayKind::Reference => Some(self.component_class(component)?),
            _ if component.len() == 1 => None,
            _ => return Err(VmError::ClassNotFound(name.to_string())),
        };
        let object = self.load_class("java/lang/Object")?;
        let class = Class::new_array(name.to_string(), object, kind, component_class);
        Ok(self.bootstrap.define(class))
    }

    fn component_class(&self, component: &str) -> VmResult<Arc<Class>> {
        if component.starts_with('[') {
            return self.array_class(component);
        }
        let inner = component
            .strip_prefix('L')
            .and_then(|c| c.strip_suffix(';'))
            .ok_or_else(|| VmError::ClassNotFound(component.to_string()))?;
        self.load_class(inner)
    }

    /// Array class whose elements are instances of `component`
    pub fn array_class_of(&self, component: &Class) -> VmResult<Arc<Class>> {
        let name = if component.is_array() {
            format!("[{}", component.name())
        } else {
            format!("[L{};", component.name())
        };
        self.array_class(&name)
    }

    /// Allocate an array of `length` elements of `kind`
    pub fn new_primitive_array(&self, kind: ArrayKind, length: i32) -> VmResult<ObjectRef> {
        let name = kind
            .class_name()
            .ok_or_else(|| VmError::TypeMismatch {
                expected: "primitive array kind",
                found: "reference".to_string(),
            })?;
        ObjectRef::new_array(self.array_class(name)?, length)
    }

    /// Allocate a `java/lang/String`
    pub fn new_string(&self, text: &str) -> VmResult<ObjectRef> {
        let string_class = self.load_class(STRING_CLASS)?;
        let chars = ArrayData::Char(text.encode_utf16().collect());
        let array = ObjectRef::with_array(self.array_class("[C")?, chars);
        let string = ObjectRef::new_instance(string_class.clone());
        string.set_field(&string_value_field(&string_class)?, array.into())?;
        Ok(string)
    }

    /// Canonical string for `text`; equal literals share one object
    pub fn intern(&self, text: &str) -> VmResult<ObjectRef> {
        if let Some(string) = self.strings.lock().get(text) {
            return Ok(string.clone());
        }
        let created = self.new_string(text)?;
        let mut strings = self.strings.lock();
        Ok(strings.entry(text.to_string()).or_insert(created).clone())
    }

    /// Contents of a `java/lang/String`
    pub fn string_value(&self, string: &ObjectRef) -> VmResult<String> {
        let field = string_value_field(string.class())?;
        match string.get_field(&field)? {
            Value::Reference(Some(chars)) => chars.with_array_data(|data| match data {
                ArrayData::Char(units) => Ok(String::from_utf16_lossy(units)),
                other => Err(VmError::TypeMismatch {
                    expected: "char[]",
                    found: format!("{:?}[]", other.kind()),
                }),
            }),
            _ => Ok(String::new()),
        }
    }

    /// `String[]` holding `items`
    pub fn new_string_array(&self, items: &[String]) -> VmResult<ObjectRef> {
        let class = self.array_class("[Ljava/lang/String;")?;
        let strings = items
            .iter()
            .map(|s| self.new_string(s).map(Some))
            .collect::<VmResult<Vec<_>>>()?;
        Ok(ObjectRef::with_array(class, ArrayData::Reference(strings)))
    }

    /// The `java/lang/Class` object for `class`, created once
    pub fn class_mirror(&self, class: &Arc<Class>) -> VmResult<ObjectRef> {
        class
            .mirror_cell()
            .get_or_try_init(|| {
                let class_class = self.load_class("java/lang/Class")?;
                Ok::<_, VmError>(ObjectRef::new_mirror(class_class, class.clone()))
            })
            .cloned()
    }

    /// Store `ConstantValue` initializers of a class's static fields
    pub fn apply_constant_values(&self, class: &Class) -> VmResult<()> {
        let pool = class.constant_pool();
        for field in class.fields().iter().filter(|f| f.is_static()) {
            let Some(index) = field.constant_value() else {
                continue;
            };
            let value = match (pool.get(index), field.field_type()) {
                (Some(ConstantInfo::Integer(v)), _) => Value::Int(*v),
                (Some(ConstantInfo::Long(v)), FieldType::Long) => Value::Long(*v),
                (Some(ConstantInfo::Float(v)), FieldType::Float) => Value::Float(*v),
                (Some(ConstantInfo::Double(v)), FieldType::Double) => Value::Double(*v),
                (Some(ConstantInfo::String { .. }), FieldType::Object(name)) if name == STRING_CLASS => {
                    self.intern(pool.string(index))?.into()
                }
                _ => {
                    return Err(VmError::IncompatibleClassChange(format!(
                        "bad ConstantValue for {}.{}",
                        class.name(),
                        field.name()
                    )))
                }
            };
            if !value.matches(field.field_type()) {
                return Err(VmError::IncompatibleClassChange(format!(
                    "ConstantValue type mismatch for {}.{}",
                    class.name(),
                    field.name()
                )));
            }
            class.set_static(field, value)?;
        }
        Ok(())
    }
}

fn string_value_field(class: &Arc<Class>) -> VmResult<Field> {
    class
        .resolve_field("value", "[C")
        .map(|(_, field)| field)
        .ok_or_else(|| VmError::NoSuchField {
            class: class.name().to_string(),
            name: "value".to_string(),
            descriptor: "[C".to_string(),
        })
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("bootstrap", &self.bootstrap)
            .field("app", &self.app)
            .field("natives", &self.natives)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Runtime {
        Runtime::new(VmOptions::default(), Vec::new(), Vec::new(), NativeRegistry::with_defaults())
    }

    #[test]
    fn test_bootstrap_classes_load() {
        let rt = runtime();
        let string = rt.load_class(STRING_CLASS).unwrap();
        assert_eq!(string.super_class().unwrap().name(), "java/lang/Object");
        assert!(string.implements("java/io/Serializable"));
    }

    #[test]
    fn test_strings_round_trip_and_intern() {
        let rt = runtime();
        let s = rt.new_string("héllo ✓").unwrap();
        assert_eq!(rt.string_value(&s).unwrap(), "héllo ✓");

        let a = rt.intern("k").unwrap();
        let b = rt.intern("k").unwrap();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&rt.new_string("k").unwrap()));
    }

    #[test]
    fn test_array_classes() {
        let rt = runtime();
        let ints = rt.array_class("[I").unwrap();
        assert_eq!(ints.array_kind(), Some(ArrayKind::Int));
        assert!(ints.component().is_none());

        let nested = rt.array_class("[[Ljava/lang/String;").unwrap();
        let inner = nested.component().unwrap();
        assert_eq!(inner.name(), "[Ljava/lang/String;");
        assert_eq!(inner.component().unwrap().name(), STRING_CLASS);

        let objects = rt.array_class("[[Ljava/lang/Object;").unwrap();
        assert!(nested.is_assignable_to(&objects));
        assert!(!objects.is_assignable_to(&nested));
        assert!(ints.is_assignable_to(&rt.load_class("java/lang/Object").unwrap()));
        assert!(Arc::ptr_eq(&ints, &rt.array_class("[I").unwrap()));
        assert!(rt.array_class("[Q").is_err());
    }

    #[test]
    fn test_mirror_is_unique() {
        let rt = runtime();
        let object = rt.load_class("java/lang/Object").unwrap();
        let a = rt.class_mirror(&object).unwrap();
        let b = rt.class_mirror(&object).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.mirror_target().unwrap().name(), "java/lang/Object");
    }
}
