//! Class loading
//!
//! A [`ClassLoader`] turns class bytes from its [`ClassSource`]s into linked
//! [`Class`]es. Loading delegates to the parent loader first, loads the
//! superclass and interfaces before linking, and caches a class only once it
//! has linked successfully. Concurrent loads of one name resolve to the first
//! class inserted.

use crate::class::{Class, ClassState};
use crate::{VmError, VmResult};
use gvm_classfile::{ClassFile, ClassFileError};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Provider of class bytes by internal name
pub trait ClassSource: Send + Sync {
    /// Bytes of `name` (e.g. `java/lang/Object`), or `None` if not provided
    fn read_class(&self, name: &str) -> std::io::Result<Option<Vec<u8>>>;

    /// Short description used in logs
    fn describe(&self) -> String {
        "source".to_string()
    }
}

/// In-memory class source
#[derive(Debug, Default, Clone)]
pub struct MemoryClassSource {
    classes: FxHashMap<String, Vec<u8>>,
}

impl MemoryClassSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes under an explicit name
    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> &mut Self {
        self.classes.insert(name.into(), bytes);
        self
    }

    /// Register class bytes under the name they declare
    pub fn add(&mut self, bytes: Vec<u8>) -> Result<&mut Self, ClassFileError> {
        let name = ClassFile::parse(&bytes)?.this_class_name().to_string();
        Ok(self.insert(name, bytes))
    }

    /// Number of classes held
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no classes are held
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassSource for MemoryClassSource {
    fn read_class(&self, name: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.classes.get(name).cloned())
    }

    fn describe(&self) -> String {
        format!("memory ({} classes)", self.classes.len())
    }
}

/// A class loader with parent-first delegation
pub struct ClassLoader {
    name: &'static str,
    parent: Option<Arc<ClassLoader>>,
    sources: Vec<Arc<dyn ClassSource>>,
    classes: RwLock<FxHashMap<String, Arc<Class>>>,
}

impl ClassLoader {
    /// Create a loader searching `sources` in order
    pub fn new(
        name: &'static str,
        parent: Option<Arc<ClassLoader>>,
        sources: Vec<Arc<dyn ClassSource>>,
    ) -> Self {
        Self {
            name,
            parent,
            sources,
            classes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Loader name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parent loader
    pub fn parent(&self) -> Option<&Arc<ClassLoader>> {
        self.parent.as_ref()
    }

    /// Already-defined class, in this loader or its parents
    pub fn find_loaded(&self, name: &str) -> Option<Arc<Class>> {
        if let Some(class) = self.classes.read().get(name) {
            return Some(class.clone());
        }
        self.parent.as_ref()?.find_loaded(name)
    }

    /// Number of classes defined by this loader
    pub fn loaded_count(&self) -> usize {
        self.classes.read().len()
    }

    /// Insert a class; the first definition of a name wins
    pub fn define(&self, class: Class) -> Arc<Class> {
        let mut classes = self.classes.write();
        classes
            .entry(class.name().to_string())
            .or_insert_with(|| Arc::new(class))
            .clone()
    }

    /// Load, link and cache a class
    pub fn load(&self, name: &str) -> VmResult<Arc<Class>> {
        let mut path = Vec::new();
        self.load_inner(name, &mut path)
    }

    fn load_inner(&self, name: &str, path: &mut Vec<String>) -> VmResult<Arc<Class>> {
        if let Some(class) = self.classes.read().get(name) {
            return Ok(class.clone());
        }
        if let Some(parent) = &self.parent {
            match parent.load_inner(name, path) {
                Err(VmError::ClassNotFound(_)) => {}
                other => return other,
            }
        }

        let (bytes, source) = self
            .read_bytes(name)?
            .ok_or_else(|| VmError::ClassNotFound(name.to_string()))?;

        if path.iter().any(|p| p == name) {
            return Err(VmError::IncompatibleClassChange(format!(
                "circular superclass or interface: {}",
                name
            )));
        }
        path.push(name.to_string());
        let result = self.define_from_bytes(name, &bytes, path);
        path.pop();
        let class = result?;

        log::debug!("[{}] loaded {} from {}", self.name, name, source);
        Ok(class)
    }

    fn read_bytes(&self, name: &str) -> VmResult<Option<(Vec<u8>, String)>> {
        for source in &self.sources {
            if let Some(bytes) = source.read_class(name)? {
                return Ok(Some((bytes, source.describe())));
            }
        }
        Ok(None)
    }

    fn define_from_bytes(&self, name: &str, bytes: &[u8], path: &mut Vec<String>) -> VmResult<Arc<Class>> {
        let class_file = ClassFile::parse(bytes)?;
        if class_file.this_class_name() != name {
            return Err(VmError::ClassNotFound(format!(
                "{} (wrong name: {})",
                name,
                class_file.this_class_name()
            )));
        }

        let super_class = match class_file.super_class_name() {
            "" => None,
            super_name => Some(self.load_inner(super_name, path)?),
        };
        if let Some(super_class) = &super_class {
            if super_class.is_interface() {
                return Err(VmError::IncompatibleClassChange(format!(
                    "class {} has interface {} as super class",
                    name,
                    super_class.name()
                )));
            }
        }

        let interfaces = class_file
            .interface_names()
            .into_iter()
            .map(|iface| self.load_inner(iface, path))
            .collect::<VmResult<Vec<_>>>()?;
        if let Some(not_interface) = interfaces.iter().find(|i| !i.is_interface()) {
            return Err(VmError::IncompatibleClassChange(format!(
                "class {} implements non-interface {}",
                name,
                not_interface.name()
            )));
        }

        let class = Class::link(class_file, super_class, interfaces)?;
        class.advance_state(ClassState::Linked);
        Ok(self.define(class))
    }
}

impl std::fmt::Debug for ClassLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassLoader")
            .field("name", &self.name)
            .field("sources", &self.sources.len())
            .field("classes", &self.loaded_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvm_classfile::access::{ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC};
    use gvm_classfile::ClassBuilder;

    fn source(builders: &[ClassBuilder]) -> Arc<dyn ClassSource> {
        let mut source = MemoryClassSource::new();
        for b in builders {
            source.add(b.build()).unwrap();
        }
        Arc::new(source)
    }

    #[test]
    fn test_loads_superclass_first() {
        let base = ClassBuilder::new("Base", None);
        let derived = ClassBuilder::new("Derived", Some("Base"));
        let loader = ClassLoader::new("app", None, vec![source(&[base, derived])]);

        let class = loader.load("Derived").unwrap();
        assert_eq!(class.super_class().unwrap().name(), "Base");
        assert_eq!(class.state(), ClassState::Linked);
        assert_eq!(loader.loaded_count(), 2);
        assert!(Arc::ptr_eq(&class, &loader.load("Derived").unwrap()));
    }

    #[test]
    fn test_parent_first_delegation() {
        let mut shadow = ClassBuilder::new("Shared", None);
        shadow.field(ACC_PUBLIC, "parent", "I");
        let parent = Arc::new(ClassLoader::new("boot", None, vec![source(&[shadow])]));

        let child_copy = ClassBuilder::new("Shared", None);
        let child = ClassLoader::new("app", Some(parent.clone()), vec![source(&[child_copy])]);

        let class = child.load("Shared").unwrap();
        assert!(class.declared_field("parent", "I").is_some());
        assert_eq!(child.loaded_count(), 0);
        assert_eq!(parent.loaded_count(), 1);
    }

    #[test]
    fn test_missing_class() {
        let derived = ClassBuilder::new("Orphan", Some("Missing"));
        let loader = ClassLoader::new("app", None, vec![source(&[derived])]);
        assert!(matches!(loader.load("Orphan"), Err(VmError::ClassNotFound(n)) if n == "Missing"));
        assert!(loader.find_loaded("Orphan").is_none());
    }

    #[test]
    fn test_circular_superclass() {
        let a = ClassBuilder::new("A", Some("B"));
        let b = ClassBuilder::new("B", Some("A"));
        let loader = ClassLoader::new("app", None, vec![source(&[a, b])]);
        assert!(matches!(loader.load("A"), Err(VmError::IncompatibleClassChange(_))));
    }

    #[test]
    fn test_interface_must_be_interface() {
        let mut iface = ClassBuilder::new("Shape", None);
        iface.access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
        let mut square = ClassBuilder::new("Square", None);
        square.interface("Shape");
        let mut bad = ClassBuilder::new("Bad", None);
        bad.interface("Square");
        let loader = ClassLoader::new("app", None, vec![source(&[iface, square, bad])]);

        let square = loader.load("Square").unwrap();
        assert!(square.implements("Shape"));
        assert!(matches!(loader.load("Bad"), Err(VmError::IncompatibleClassChange(_))));
    }
}
