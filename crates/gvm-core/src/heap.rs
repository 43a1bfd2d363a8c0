//! Heap objects
//!
//! Objects are owned by the VM instance through reference-counted handles;
//! an object is reclaimed when its last [`ObjectRef`] is dropped. Instance
//! field storage is a slot vector laid out with inherited fields first.

use crate::class::{Class, Field};
use crate::value::{Slot, Value};
use crate::{VmError, VmResult};
use gvm_classfile::opcode::array_type;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Element kind of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    /// `[Z`
    Boolean,
    /// `[B`
    Byte,
    /// `[C`
    Char,
    /// `[S`
    Short,
    /// `[I`
    Int,
    /// `[J`
    Long,
    /// `[F`
    Float,
    /// `[D`
    Double,
    /// `[L...;` and nested arrays
    Reference,
}

impl ArrayKind {
    /// Element width in bytes; references are pointer-width
    pub fn element_width(self) -> usize {
        match self {
            ArrayKind::Boolean | ArrayKind::Byte => 1,
            ArrayKind::Char | ArrayKind::Short => 2,
            ArrayKind::Int | ArrayKind::Float => 4,
            ArrayKind::Long | ArrayKind::Double => 8,
            ArrayKind::Reference => std::mem::size_of::<usize>(),
        }
    }

    /// Kind for a `newarray` type code
    pub fn from_type_code(code: u8) -> Option<Self> {
        Some(match code {
            array_type::T_BOOLEAN => ArrayKind::Boolean,
            array_type::T_CHAR => ArrayKind::Char,
            array_type::T_FLOAT => ArrayKind::Float,
            array_type::T_DOUBLE => ArrayKind::Double,
            array_type::T_BYTE => ArrayKind::Byte,
            array_type::T_SHORT => ArrayKind::Short,
            array_type::T_INT => ArrayKind::Int,
            array_type::T_LONG => ArrayKind::Long,
            _ => return None,
        })
    }

    /// Kind for the component descriptor following `[`
    pub fn from_component(descriptor: &str) -> Option<Self> {
        Some(match descriptor.as_bytes().first()? {
            b'Z' => ArrayKind::Boolean,
            b'B' => ArrayKind::Byte,
            b'C' => ArrayKind::Char,
            b'S' => ArrayKind::Short,
            b'I' => ArrayKind::Int,
            b'J' => ArrayKind::Long,
            b'F' => ArrayKind::Float,
            b'D' => ArrayKind::Double,
            b'L' | b'[' => ArrayKind::Reference,
            _ => return None,
        })
    }

    /// Array class name for a primitive kind
    pub fn class_name(self) -> Option<&'static str> {
        Some(match self {
            ArrayKind::Boolean => "[Z",
            ArrayKind::Byte => "[B",
            ArrayKind::Char => "[C",
            ArrayKind::Short => "[S",
            ArrayKind::Int => "[I",
            ArrayKind::Long => "[J",
            ArrayKind::Float => "[F",
            ArrayKind::Double => "[D",
            ArrayKind::Reference => return None,
        })
    }
}

/// Largest element storage a single array may occupy
pub const MAX_ARRAY_BYTES: usize = 1 << 30;

fn zeroed<T: Clone>(kind: ArrayKind, zero: T, length: usize) -> VmResult<Vec<T>> {
    let mut elements = Vec::new();
    elements
        .try_reserve_exact(length)
        .map_err(|e| VmError::OutOfMemory(format!("{:?}[{}]: {}", kind, length, e)))?;
    elements.resize(length, zero);
    Ok(elements)
}

/// Contiguous, typed array storage
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// `boolean[]`
    Boolean(Vec<i8>),
    /// `byte[]`
    Byte(Vec<i8>),
    /// `char[]`
    Char(Vec<u16>),
    /// `short[]`
    Short(Vec<i16>),
    /// `int[]`
    Int(Vec<i32>),
    /// `long[]`
    Long(Vec<i64>),
    /// `float[]`
    Float(Vec<f32>),
    /// `double[]`
    Double(Vec<f64>),
    /// Reference arrays
    Reference(Vec<Option<ObjectRef>>),
}

impl ArrayData {
    /// Zero-filled storage; fails when the elements would exceed
    /// [`MAX_ARRAY_BYTES`] or the host refuses the reservation
    pub fn new(kind: ArrayKind, length: usize) -> VmResult<Self> {
        let bytes = length.saturating_mul(kind.element_width());
        if bytes > MAX_ARRAY_BYTES {
            return Err(VmError::OutOfMemory(format!(
                "{:?}[{}] needs {} bytes, limit is {}",
                kind, length, bytes, MAX_ARRAY_BYTES
            )));
        }
        Ok(match kind {
            ArrayKind::Boolean => ArrayData::Boolean(zeroed(kind, 0, length)?),
            ArrayKind::Byte => ArrayData::Byte(zeroed(kind, 0, length)?),
            ArrayKind::Char => ArrayData::Char(zeroed(kind, 0, length)?),
            ArrayKind::Short => ArrayData::Short(zeroed(kind, 0, length)?),
            ArrayKind::Int => ArrayData::Int(zeroed(kind, 0, length)?),
            ArrayKind::Long => ArrayData::Long(zeroed(kind, 0, length)?),
            ArrayKind::Float => ArrayData::Float(zeroed(kind, 0.0, length)?),
            ArrayKind::Double => ArrayData::Double(zeroed(kind, 0.0, length)?),
            ArrayKind::Reference => ArrayData::Reference(zeroed(kind, None, length)?),
        })
    }

    /// Element kind
    pub fn kind(&self) -> ArrayKind {
        match self {
            ArrayData::Boolean(_) => ArrayKind::Boolean,
            ArrayData::Byte(_) => ArrayKind::Byte,
            ArrayData::Char(_) => ArrayKind::Char,
            ArrayData::Short(_) => ArrayKind::Short,
            ArrayData::Int(_) => ArrayKind::Int,
            ArrayData::Long(_) => ArrayKind::Long,
            ArrayData::Float(_) => ArrayKind::Float,
            ArrayData::Double(_) => ArrayKind::Double,
            ArrayData::Reference(_) => ArrayKind::Reference,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Boolean(v) | ArrayData::Byte(v) => v.len(),
            ArrayData::Char(v) => v.len(),
            ArrayData::Short(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Long(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Double(v) => v.len(),
            ArrayData::Reference(v) => v.len(),
        }
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the element storage in bytes
    pub fn byte_size(&self) -> usize {
        self.len() * self.kind().element_width()
    }

    fn check_index(&self, index: i32) -> VmResult<usize> {
        let length = self.len();
        if index < 0 || index as usize >= length {
            return Err(VmError::ArrayIndexOutOfBounds { index, length });
        }
        Ok(index as usize)
    }

    /// Load an element, widening sub-int types to int
    pub fn load(&self, index: i32) -> VmResult<Value> {
        let i = self.check_index(index)?;
        Ok(match self {
            ArrayData::Boolean(v) | ArrayData::Byte(v) => Value::Int(v[i] as i32),
            ArrayData::Char(v) => Value::Int(v[i] as i32),
            ArrayData::Short(v) => Value::Int(v[i] as i32),
            ArrayData::Int(v) => Value::Int(v[i]),
            ArrayData::Long(v) => Value::Long(v[i]),
            ArrayData::Float(v) => Value::Float(v[i]),
            ArrayData::Double(v) => Value::Double(v[i]),
            ArrayData::Reference(v) => Value::Reference(v[i].clone()),
        })
    }

    /// Store an element, narrowing ints to the element type
    pub fn store(&mut self, index: i32, value: Value) -> VmResult<()> {
        let i = self.check_index(index)?;
        match (self, value) {
            (ArrayData::Boolean(v), Value::Int(x)) => v[i] = (x & 1) as i8,
            (ArrayData::Byte(v), Value::Int(x)) => v[i] = x as i8,
            (ArrayData::Char(v), Value::Int(x)) => v[i] = x as u16,
            (ArrayData::Short(v), Value::Int(x)) => v[i] = x as i16,
            (ArrayData::Int(v), Value::Int(x)) => v[i] = x,
            (ArrayData::Long(v), Value::Long(x)) => v[i] = x,
            (ArrayData::Float(v), Value::Float(x)) => v[i] = x,
            (ArrayData::Double(v), Value::Double(x)) => v[i] = x,
            (ArrayData::Reference(v), Value::Reference(x)) => v[i] = x,
            (data, value) => {
                return Err(VmError::ArrayStore(format!(
                    "{:?} value into {:?} array",
                    value.to_slot().kind(),
                    data.kind()
                )))
            }
        }
        Ok(())
    }

    /// Copy `length` elements from `src[src_pos..]` into `self[dst_pos..]`
    pub fn copy_from(
        &mut self,
        src: &ArrayData,
        src_pos: usize,
        dst_pos: usize,
        length: usize,
    ) -> VmResult<()> {
        if src_pos + length > src.len() {
            return Err(VmError::ArrayIndexOutOfBounds {
                index: (src_pos + length) as i32,
                length: src.len(),
            });
        }
        if dst_pos + length > self.len() {
            return Err(VmError::ArrayIndexOutOfBounds {
                index: (dst_pos + length) as i32,
                length: self.len(),
            });
        }
        match (self, src) {
            (ArrayData::Boolean(d), ArrayData::Boolean(s)) | (ArrayData::Byte(d), ArrayData::Byte(s)) => {
                d[dst_pos..dst_pos + length].copy_from_slice(&s[src_pos..src_pos + length])
            }
            (ArrayData::Char(d), ArrayData::Char(s)) => {
                d[dst_pos..dst_pos + length].copy_from_slice(&s[src_pos..src_pos + length])
            }
            (ArrayData::Short(d), ArrayData::Short(s)) => {
                d[dst_pos..dst_pos + length].copy_from_slice(&s[src_pos..src_pos + length])
            }
            (ArrayData::Int(d), ArrayData::Int(s)) => {
                d[dst_pos..dst_pos + length].copy_from_slice(&s[src_pos..src_pos + length])
            }
            (ArrayData::Long(d), ArrayData::Long(s)) => {
                d[dst_pos..dst_pos + length].copy_from_slice(&s[src_pos..src_pos + length])
            }
            (ArrayData::Float(d), ArrayData::Float(s)) => {
                d[dst_pos..dst_pos + length].copy_from_slice(&s[src_pos..src_pos + length])
            }
            (ArrayData::Double(d), ArrayData::Double(s)) => {
                d[dst_pos..dst_pos + length].copy_from_slice(&s[src_pos..src_pos + length])
            }
            (ArrayData::Reference(d), ArrayData::Reference(s)) => {
                d[dst_pos..dst_pos + length].clone_from_slice(&s[src_pos..src_pos + length])
            }
            (d, s) => {
                return Err(VmError::ArrayStore(format!(
                    "cannot copy {:?} array into {:?} array",
                    s.kind(),
                    d.kind()
                )))
            }
        }
        Ok(())
    }
}

/// Storage of a heap object
pub enum ObjectBody {
    /// Ordinary instance: field slots
    Fields(Mutex<Vec<Slot>>),
    /// Array instance
    Array(Mutex<ArrayData>),
    /// `java/lang/Class` instance mirroring a loaded class
    Mirror {
        /// The mirrored class
        target: Arc<Class>,
        /// Instance fields of `java/lang/Class`
        fields: Mutex<Vec<Slot>>,
    },
}

/// A heap object
pub struct Object {
    class: Arc<Class>,
    body: ObjectBody,
}

impl Object {
    /// Runtime class
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    /// Storage
    pub fn body(&self) -> &ObjectBody {
        &self.body
    }
}

/// Shared handle to a heap object; equality is identity
#[derive(Clone)]
pub struct ObjectRef(Arc<Object>);

impl ObjectRef {
    /// Allocate an instance with its class's zeroed field layout
    pub fn new_instance(class: Arc<Class>) -> Self {
        let fields = Mutex::new(class.instance_template().to_vec());
        ObjectRef(Arc::new(Object {
            class,
            body: ObjectBody::Fields(fields),
        }))
    }

    /// Allocate an array of `class` (an array class) with zeroed elements
    pub fn new_array(class: Arc<Class>, length: i32) -> VmResult<Self> {
        if length < 0 {
            return Err(VmError::NegativeArraySize(length));
        }
        let kind = class
            .array_kind()
            .ok_or_else(|| VmError::IncompatibleClassChange(format!("{} is not an array class", class.name())))?;
        Ok(Self::with_array(class, ArrayData::new(kind, length as usize)?))
    }

    /// Wrap existing array storage
    pub fn with_array(class: Arc<Class>, data: ArrayData) -> Self {
        ObjectRef(Arc::new(Object {
            class,
            body: ObjectBody::Array(Mutex::new(data)),
        }))
    }

    /// Allocate a class mirror; `class` must be `java/lang/Class`
    pub fn new_mirror(class: Arc<Class>, target: Arc<Class>) -> Self {
        let fields = Mutex::new(class.instance_template().to_vec());
        ObjectRef(Arc::new(Object {
            class,
            body: ObjectBody::Mirror { target, fields },
        }))
    }

    /// Runtime class
    pub fn class(&self) -> &Arc<Class> {
        &self.0.class
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity hash code
    pub fn identity_hash(&self) -> i32 {
        let addr = Arc::as_ptr(&self.0) as usize as u64;
        ((addr >> 3) ^ (addr >> 35)) as i32
    }

    fn field_slots(&self) -> VmResult<&Mutex<Vec<Slot>>> {
        match &self.0.body {
            ObjectBody::Fields(slots) | ObjectBody::Mirror { fields: slots, .. } => Ok(slots),
            ObjectBody::Array(_) => Err(VmError::IncompatibleClassChange(format!(
                "{} has no instance fields",
                self.class().name()
            ))),
        }
    }

    /// Read an instance field
    pub fn get_field(&self, field: &Field) -> VmResult<Value> {
        let slots = self.field_slots()?.lock();
        let slot = slots
            .get(field.offset())
            .ok_or_else(|| VmError::IncompatibleClassChange(format!("field {} not in layout", field.name())))?;
        Value::from_slot(slot)
    }

    /// Write an instance field
    pub fn set_field(&self, field: &Field, value: Value) -> VmResult<()> {
        let mut slots = self.field_slots()?.lock();
        if field.offset() + value.slot_count() > slots.len() {
            return Err(VmError::IncompatibleClassChange(format!(
                "field {} not in layout",
                field.name()
            )));
        }
        value.write_to(&mut slots, field.offset());
        Ok(())
    }

    /// Run `f` with the array storage; fails for non-arrays
    pub fn with_array_data<R>(&self, f: impl FnOnce(&mut ArrayData) -> VmResult<R>) -> VmResult<R> {
        match &self.0.body {
            ObjectBody::Array(data) => f(&mut data.lock()),
            _ => Err(VmError::TypeMismatch {
                expected: "array",
                found: self.class().name().to_string(),
            }),
        }
    }

    /// Array length; fails for non-arrays
    pub fn array_length(&self) -> VmResult<usize> {
        self.with_array_data(|data| Ok(data.len()))
    }

    /// Whether this object is an array
    pub fn is_array(&self) -> bool {
        matches!(self.0.body, ObjectBody::Array(_))
    }

    /// Mirrored class, for `java/lang/Class` instances
    pub fn mirror_target(&self) -> Option<&Arc<Class>> {
        match &self.0.body {
            ObjectBody::Mirror { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:x}", self.class().name(), self.identity_hash())
    }
}
