//! Native method bridge
//!
//! A [`NativeRegistry`] maps a (class, name, descriptor) triple to a host
//! function. Each runtime owns its registry: it is populated once at
//! construction with [`NativeRegistry::with_defaults`] plus whatever the
//! embedder registers, and never changes after the VM starts.
//!
//! Natives see the VM only through [`NativeContext`]: arguments by local
//! index, heap allocation helpers and class loading. Their return value is
//! pushed by the interpreter's typed return instruction.

use crate::class::{Class, Method};
use crate::frame::Frame;
use crate::heap::{ArrayData, ObjectRef};
use crate::runtime::Runtime;
use crate::value::Value;
use crate::{VmError, VmResult};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Host function bound to a native method
pub type NativeFn = Arc<dyn Fn(&mut NativeContext<'_>) -> VmResult<Option<Value>> + Send + Sync>;

/// Native functions keyed by `class.name` + descriptor
#[derive(Clone, Default)]
pub struct NativeRegistry {
    functions: FxHashMap<String, NativeFn>,
}

fn key(class: &str, name: &str, descriptor: &str) -> String {
    format!("{}.{}{}", class, name, descriptor)
}

impl NativeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in `java/lang` natives
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        register_object(&mut registry);
        register_class(&mut registry);
        register_system(&mut registry);
        register_float_bits(&mut registry);
        registry
    }

    /// Bind a function; a later registration of the same triple replaces it
    pub fn register<F>(&mut self, class: &str, name: &str, descriptor: &str, f: F) -> &mut Self
    where
        F: Fn(&mut NativeContext<'_>) -> VmResult<Option<Value>> + Send + Sync + 'static,
    {
        self.functions.insert(key(class, name, descriptor), Arc::new(f));
        self
    }

    /// Function bound to a triple
    pub fn lookup(&self, class: &str, name: &str, descriptor: &str) -> Option<NativeFn> {
        self.functions.get(&key(class, name, descriptor)).cloned()
    }

    /// Whether a triple is bound
    pub fn contains(&self, class: &str, name: &str, descriptor: &str) -> bool {
        self.functions.contains_key(&key(class, name, descriptor))
    }

    /// Number of bound functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Merge another registry; its entries take precedence
    pub fn extend(&mut self, other: NativeRegistry) {
        self.functions.extend(other.functions);
    }
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("count", &self.functions.len())
            .finish()
    }
}

/// View of the VM handed to a native function
pub struct NativeContext<'a> {
    runtime: &'a Runtime,
    frame: &'a Frame,
}

impl<'a> NativeContext<'a> {
    pub(crate) fn new(runtime: &'a Runtime, frame: &'a Frame) -> Self {
        Self { runtime, frame }
    }

    /// Owning runtime
    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }

    /// The native method being executed
    pub fn method(&self) -> &Method {
        self.frame.method()
    }

    /// Argument at a local index (the receiver is local 0 of instance methods)
    pub fn local(&self, index: usize) -> VmResult<Value> {
        Value::from_slot(self.frame.local(index)?)
    }

    /// Arguments in declaration order, excluding the receiver
    pub fn args(&self) -> VmResult<Vec<Value>> {
        let method = self.frame.method();
        let mut index = usize::from(!method.is_static());
        let mut args = Vec::with_capacity(method.signature.params.len());
        for param in &method.signature.params {
            args.push(self.local(index)?);
            index += param.slot_count();
        }
        Ok(args)
    }

    /// Int argument at a local index
    pub fn int_arg(&self, index: usize) -> VmResult<i32> {
        self.local(index)?.as_int()
    }

    /// Long argument at a local index
    pub fn long_arg(&self, index: usize) -> VmResult<i64> {
        self.local(index)?.as_long()
    }

    /// Float argument at a local index
    pub fn float_arg(&self, index: usize) -> VmResult<f32> {
        self.local(index)?.as_float()
    }

    /// Double argument at a local index
    pub fn double_arg(&self, index: usize) -> VmResult<f64> {
        self.local(index)?.as_double()
    }

    /// Possibly-null reference argument at a local index
    pub fn ref_arg(&self, index: usize) -> VmResult<Option<ObjectRef>> {
        Ok(self.local(index)?.as_reference()?.cloned())
    }

    /// Non-null reference argument at a local index
    pub fn object_arg(&self, index: usize) -> VmResult<ObjectRef> {
        self.ref_arg(index)?.ok_or(VmError::NullPointer)
    }

    /// Receiver of an instance native
    pub fn this(&self) -> VmResult<ObjectRef> {
        self.object_arg(0)
    }

    /// Allocate a `java/lang/String`
    pub fn new_string(&self, text: &str) -> VmResult<ObjectRef> {
        self.runtime.new_string(text)
    }

    /// Interned `java/lang/String`
    pub fn intern(&self, text: &str) -> VmResult<ObjectRef> {
        self.runtime.intern(text)
    }

    /// Contents of a `java/lang/String`
    pub fn string_value(&self, string: &ObjectRef) -> VmResult<String> {
        self.runtime.string_value(string)
    }

    /// Load (but do not initialize) a class
    pub fn load_class(&self, name: &str) -> VmResult<Arc<Class>> {
        self.runtime.load_class(name)
    }

    /// `java/lang/Class` mirror of a class
    pub fn class_mirror(&self, class: &Arc<Class>) -> VmResult<ObjectRef> {
        self.runtime.class_mirror(class)
    }
}

fn none(_: &mut NativeContext<'_>) -> VmResult<Option<Value>> {
    Ok(None)
}

fn register_object(registry: &mut NativeRegistry) {
    const OBJECT: &str = "java/lang/Object";
    registry
        .register(OBJECT, "registerNatives", "()V", none)
        .register(OBJECT, "hashCode", "()I", |ctx| {
            Ok(Some(Value::Int(ctx.this()?.identity_hash())))
        })
        .register(OBJECT, "getClass", "()Ljava/lang/Class;", |ctx| {
            let this = ctx.this()?;
            Ok(Some(ctx.class_mirror(this.class())?.into()))
        });
}

fn register_class(registry: &mut NativeRegistry) {
    const CLASS: &str = "java/lang/Class";
    registry
        .register(CLASS, "registerNatives", "()V", none)
        .register(CLASS, "getName0", "()Ljava/lang/String;", |ctx| {
            let this = ctx.this()?;
            let target = this
                .mirror_target()
                .ok_or_else(|| VmError::IncompatibleClassChange("not a class mirror".to_string()))?;
            let name = target.name().replace('/', ".");
            Ok(Some(ctx.intern(&name)?.into()))
        });
}

fn register_system(registry: &mut NativeRegistry) {
    const SYSTEM: &str = "java/lang/System";
    registry
        .register(SYSTEM, "registerNatives", "()V", none)
        .register(
            SYSTEM,
            "arraycopy",
            "(Ljava/lang/Object;ILjava/lang/Object;II)V",
            arraycopy,
        )
        .register(SYSTEM, "nanoTime", "()J", |ctx| {
            let nanos = ctx.runtime().uptime().as_nanos();
            Ok(Some(Value::Long(nanos as i64)))
        })
        .register(SYSTEM, "currentTimeMillis", "()J", |_| {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            Ok(Some(Value::Long(millis)))
        })
        .register(SYSTEM, "identityHashCode", "(Ljava/lang/Object;)I", |ctx| {
            let hash = ctx.ref_arg(0)?.map_or(0, |o| o.identity_hash());
            Ok(Some(Value::Int(hash)))
        });
}

fn arraycopy(ctx: &mut NativeContext<'_>) -> VmResult<Option<Value>> {
    let src = ctx.object_arg(0)?;
    let src_pos = ctx.int_arg(1)?;
    let dst = ctx.object_arg(2)?;
    let dst_pos = ctx.int_arg(3)?;
    let length = ctx.int_arg(4)?;

    // Snapshot first so overlapping copies within one array see the old contents
    let source = src.with_array_data(|data| Ok(data.clone()))?;
    let dst_length = dst.array_length()?;
    check_range(src_pos, length, source.len())?;
    check_range(dst_pos, length, dst_length)?;
    let (src_pos, dst_pos, length) = (src_pos as usize, dst_pos as usize, length as usize);

    // Reference elements are checked one by one; the prefix before a
    // rejected element stays copied
    let mut copied = length;
    let mut rejected = None;
    if let (ArrayData::Reference(elements), Some(component)) = (&source, dst.class().component()) {
        let range = &elements[src_pos..src_pos + length];
        if let Some(offset) = range
            .iter()
            .position(|e| matches!(e, Some(o) if !o.class().is_assignable_to(component)))
        {
            copied = offset;
            rejected = range[offset].as_ref().map(|o| o.class().name().to_string());
        }
    }

    dst.with_array_data(|data| data.copy_from(&source, src_pos, dst_pos, copied))?;
    match rejected {
        Some(element) => Err(VmError::ArrayStore(format!(
            "element {} of type {} into {}",
            src_pos + copied,
            element,
            dst.class().name()
        ))),
        None => Ok(None),
    }
}

fn check_range(pos: i32, length: i32, array_length: usize) -> VmResult<()> {
    if pos < 0 || length < 0 || pos as usize + length as usize > array_length {
        return Err(VmError::ArrayIndexOutOfBounds {
            index: if pos < 0 || length < 0 { pos.min(length) } else { pos.saturating_add(length) },
            length: array_length,
        });
    }
    Ok(())
}

fn register_float_bits(registry: &mut NativeRegistry) {
    registry
        .register("java/lang/Float", "floatToRawIntBits", "(F)I", |ctx| {
            Ok(Some(Value::Int(ctx.float_arg(0)?.to_bits() as i32)))
        })
        .register("java/lang/Float", "intBitsToFloat", "(I)F", |ctx| {
            Ok(Some(Value::Float(f32::from_bits(ctx.int_arg(0)? as u32))))
        })
        .register("java/lang/Double", "doubleToRawLongBits", "(D)J", |ctx| {
            Ok(Some(Value::Long(ctx.double_arg(0)?.to_bits() as i64)))
        })
        .register("java/lang/Double", "longBitsToDouble", "(J)D", |ctx| {
            Ok(Some(Value::Double(f64::from_bits(ctx.long_arg(0)? as u64))))
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_registered() {
        let registry = NativeRegistry::with_defaults();
        assert!(registry.contains("java/lang/Object", "hashCode", "()I"));
        assert!(registry.contains(
            "java/lang/System",
            "arraycopy",
            "(Ljava/lang/Object;ILjava/lang/Object;II)V"
        ));
        assert!(!registry.contains("java/lang/Object", "hashCode", "()J"));
        assert_eq!(registry.len(), 14);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = NativeRegistry::new();
        registry.register("A", "f", "()I", |_| Ok(Some(Value::Int(1))));
        registry.register("A", "f", "()I", |_| Ok(Some(Value::Int(2))));
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("A", "f", "()I").is_some());
        assert!(registry.lookup("A", "g", "()I").is_none());
    }
}
