//! Field and method descriptors
//!
//! Grammar: `B C D F I J S Z` for primitives, `L<name>;` for references, a
//! leading `[` per array dimension, and `(args)ret` for methods where `ret`
//! may also be `V`.

use crate::class_file::ClassFileError;
use crate::Result;
use std::fmt;

/// A parsed field type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<name>;`
    Object(String),
    /// `[<component>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (ty, rest) = Self::parse_prefix(descriptor)
            .ok_or_else(|| ClassFileError::MalformedDescriptor(descriptor.to_string()))?;
        if !rest.is_empty() {
            return Err(ClassFileError::MalformedDescriptor(descriptor.to_string()));
        }
        Ok(ty)
    }

    fn parse_prefix(s: &str) -> Option<(Self, &str)> {
        let first = s.chars().next()?;
        let rest = &s[first.len_utf8()..];
        let ty = match first {
            'B' => FieldType::Byte,
            'C' => FieldType::Char,
            'D' => FieldType::Double,
            'F' => FieldType::Float,
            'I' => FieldType::Int,
            'J' => FieldType::Long,
            'S' => FieldType::Short,
            'Z' => FieldType::Boolean,
            'L' => {
                let end = rest.find(';')?;
                if end == 0 {
                    return None;
                }
                return Some((FieldType::Object(rest[..end].to_string()), &rest[end + 1..]));
            }
            '[' => {
                let (component, rest) = Self::parse_prefix(rest)?;
                return Some((FieldType::Array(Box::new(component)), rest));
            }
            _ => return None,
        };
        Some((ty, rest))
    }

    /// Number of slots a value of this type occupies
    pub fn slot_count(&self) -> usize {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Whether values are references
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Class name used to load this type: the internal name for objects,
    /// the descriptor itself for arrays
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => write!(f, "B"),
            FieldType::Char => write!(f, "C"),
            FieldType::Double => write!(f, "D"),
            FieldType::Float => write!(f, "F"),
            FieldType::Int => write!(f, "I"),
            FieldType::Long => write!(f, "J"),
            FieldType::Short => write!(f, "S"),
            FieldType::Boolean => write!(f, "Z"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(component) => write!(f, "[{}", component),
        }
    }
}

/// Width of a method's return value in slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnWidth {
    /// `V`
    Void,
    /// One slot
    Single,
    /// Two slots (long/double)
    Double,
}

impl ReturnWidth {
    /// Number of slots
    pub fn slots(self) -> usize {
        match self {
            ReturnWidth::Void => 0,
            ReturnWidth::Single => 1,
            ReturnWidth::Double => 2,
        }
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type; `None` for void
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor
    pub fn parse(descriptor: &str) -> Result<Self> {
        let malformed = || ClassFileError::MalformedDescriptor(descriptor.to_string());

        let mut rest = descriptor.strip_prefix('(').ok_or_else(malformed)?;
        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (ty, next) = FieldType::parse_prefix(rest).ok_or_else(malformed)?;
            params.push(ty);
            rest = next;
        }
        rest = &rest[1..];

        let ret = if rest == "V" {
            None
        } else {
            let (ty, tail) = FieldType::parse_prefix(rest).ok_or_else(malformed)?;
            if !tail.is_empty() {
                return Err(malformed());
            }
            Some(ty)
        };

        Ok(Self { params, ret })
    }

    /// Total argument slots, excluding the receiver
    pub fn arg_slots(&self) -> usize {
        self.params.iter().map(FieldType::slot_count).sum()
    }

    /// Return width
    pub fn return_width(&self) -> ReturnWidth {
        match &self.ret {
            None => ReturnWidth::Void,
            Some(ty) if ty.slot_count() == 2 => ReturnWidth::Double,
            Some(_) => ReturnWidth::Single,
        }
    }
}
