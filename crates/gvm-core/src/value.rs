//! Slots and values
//!
//! A [`Slot`] is the 32-bit storage cell of locals, operand stacks and field
//! storage. Longs and doubles occupy two consecutive slots: the value itself
//! followed by a [`Slot::Top`] marker. A [`Value`] is the typed view used at
//! API boundaries (invocation arguments, results, natives).

use crate::heap::ObjectRef;
use crate::{VmError, VmResult};
use gvm_classfile::FieldType;

/// One storage cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Slot {
    /// 32-bit integer (also boolean, byte, char, short)
    Int(i32),
    /// 32-bit float
    Float(f32),
    /// First half of a long
    Long(i64),
    /// First half of a double
    Double(f64),
    /// Object reference, `None` for null
    Reference(Option<ObjectRef>),
    /// Code offset pushed by `jsr`
    ReturnAddress(usize),
    /// Second half of a long/double, or an unset local
    #[default]
    Top,
}

impl Slot {
    /// Null reference
    pub const NULL: Slot = Slot::Reference(None);

    /// Short description for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Slot::Int(_) => "int",
            Slot::Float(_) => "float",
            Slot::Long(_) => "long",
            Slot::Double(_) => "double",
            Slot::Reference(_) => "reference",
            Slot::ReturnAddress(_) => "returnAddress",
            Slot::Top => "top",
        }
    }

    /// Whether this slot starts a two-slot value
    pub fn is_wide(&self) -> bool {
        matches!(self, Slot::Long(_) | Slot::Double(_))
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> VmError {
        VmError::TypeMismatch {
            expected,
            found: self.kind().to_string(),
        }
    }
}

/// A typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// int, boolean, byte, char or short
    Int(i32),
    /// long
    Long(i64),
    /// float
    Float(f32),
    /// double
    Double(f64),
    /// Reference, `None` for null
    Reference(Option<ObjectRef>),
}

impl Value {
    /// Null reference
    pub const NULL: Value = Value::Reference(None);

    /// Number of slots this value occupies
    pub fn slot_count(&self) -> usize {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }

    /// The first (or only) slot of this value
    pub fn to_slot(&self) -> Slot {
        match self {
            Value::Int(v) => Slot::Int(*v),
            Value::Long(v) => Slot::Long(*v),
            Value::Float(v) => Slot::Float(*v),
            Value::Double(v) => Slot::Double(*v),
            Value::Reference(r) => Slot::Reference(r.clone()),
        }
    }

    /// Read a value starting at a slot
    pub fn from_slot(slot: &Slot) -> VmResult<Self> {
        match slot {
            Slot::Int(v) => Ok(Value::Int(*v)),
            Slot::Float(v) => Ok(Value::Float(*v)),
            Slot::Long(v) => Ok(Value::Long(*v)),
            Slot::Double(v) => Ok(Value::Double(*v)),
            Slot::Reference(r) => Ok(Value::Reference(r.clone())),
            other => Err(other.mismatch("value")),
        }
    }

    /// Zero value for a field type
    pub fn default_for(ty: &FieldType) -> Self {
        match ty {
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => Value::NULL,
            _ => Value::Int(0),
        }
    }

    /// Write this value into `slots` at `offset`, including the `Top` half
    pub fn write_to(&self, slots: &mut [Slot], offset: usize) {
        slots[offset] = self.to_slot();
        if self.slot_count() == 2 {
            slots[offset + 1] = Slot::Top;
        }
    }

    /// Int payload
    pub fn as_int(&self) -> VmResult<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(other.to_slot().mismatch("int")),
        }
    }

    /// Long payload
    pub fn as_long(&self) -> VmResult<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(other.to_slot().mismatch("long")),
        }
    }

    /// Float payload
    pub fn as_float(&self) -> VmResult<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(other.to_slot().mismatch("float")),
        }
    }

    /// Double payload
    pub fn as_double(&self) -> VmResult<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(other.to_slot().mismatch("double")),
        }
    }

    /// Reference payload
    pub fn as_reference(&self) -> VmResult<Option<&ObjectRef>> {
        match self {
            Value::Reference(r) => Ok(r.as_ref()),
            other => Err(other.to_slot().mismatch("reference")),
        }
    }

    /// Whether this value may be stored in a location of type `ty`
    pub fn matches(&self, ty: &FieldType) -> bool {
        matches!(
            (self, ty),
            (Value::Long(_), FieldType::Long)
                | (Value::Float(_), FieldType::Float)
                | (Value::Double(_), FieldType::Double)
                | (Value::Reference(_), FieldType::Object(_) | FieldType::Array(_))
                | (
                    Value::Int(_),
                    FieldType::Int
                        | FieldType::Boolean
                        | FieldType::Byte
                        | FieldType::Char
                        | FieldType::Short
                )
        )
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(r: ObjectRef) -> Self {
        Value::Reference(Some(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_values_write_top_half() {
        let mut slots = vec![Slot::Int(9); 3];
        Value::Long(5).write_to(&mut slots, 1);
        assert_eq!(slots, vec![Slot::Int(9), Slot::Long(5), Slot::Top]);
        assert_eq!(Value::from_slot(&slots[1]).unwrap(), Value::Long(5));
        assert!(Value::from_slot(&slots[2]).is_err());
    }

    #[test]
    fn test_defaults_and_matching() {
        assert_eq!(Value::default_for(&FieldType::Boolean), Value::Int(0));
        assert_eq!(
            Value::default_for(&FieldType::Object("java/lang/String".into())),
            Value::NULL
        );
        assert!(Value::Int(1).matches(&FieldType::Char));
        assert!(!Value::Int(1).matches(&FieldType::Long));
        assert!(Value::NULL.matches(&FieldType::Array(Box::new(FieldType::Int))));
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(Value::Int(3).as_int().unwrap(), 3);
        assert!(matches!(
            Value::Float(1.0).as_int(),
            Err(VmError::TypeMismatch { expected: "int", .. })
        ));
        assert!(Value::NULL.as_reference().unwrap().is_none());
    }
}
