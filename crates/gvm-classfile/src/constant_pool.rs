//! Constant pool: tagged entries with lenient index-based lookups
//!
//! The pool is indexed from 1 to `constant_pool_count - 1`. Index 0 is never
//! valid, and the index following a `Long` or `Double` entry is unusable.
//!
//! The typed accessors (`utf8`, `class_name`, `integer`, ...) return an empty
//! or zero value when the index is out of range or names an entry of another
//! kind. Callers must treat "empty" as "absent"; use [`ConstantPool::get`]
//! when the distinction matters.

use crate::class_file::ClassFileError;
use crate::mutf8;
use crate::reader::ClassReader;
use crate::Result;
use once_cell::sync::OnceCell;

/// Constant pool tags
pub mod tag {
    #![allow(missing_docs)]
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// Raw `CONSTANT_Utf8` payload, decoded to text on first access
#[derive(Debug, Clone)]
pub struct Utf8Info {
    bytes: Vec<u8>,
    text: OnceCell<String>,
}

impl Utf8Info {
    /// Wrap raw modified UTF-8 bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            text: OnceCell::new(),
        }
    }

    /// Raw bytes as stored in the class file
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decoded text
    pub fn text(&self) -> &str {
        self.text.get_or_init(|| mutf8::decode(&self.bytes))
    }
}

/// A single constant pool entry
#[derive(Debug, Clone)]
pub enum ConstantInfo {
    /// Modified UTF-8 text
    Utf8(Utf8Info),
    /// 32-bit integer literal
    Integer(i32),
    /// 32-bit float literal
    Float(f32),
    /// 64-bit integer literal (occupies two indices)
    Long(i64),
    /// 64-bit float literal (occupies two indices)
    Double(f64),
    /// Class or interface reference
    Class {
        /// Index of the internal class name
        name_index: u16,
    },
    /// String literal
    String {
        /// Index of the literal text
        string_index: u16,
    },
    /// Field reference
    FieldRef {
        /// Index of the declaring class
        class_index: u16,
        /// Index of the name and descriptor
        name_and_type_index: u16,
    },
    /// Class method reference
    MethodRef {
        /// Index of the declaring class
        class_index: u16,
        /// Index of the name and descriptor
        name_and_type_index: u16,
    },
    /// Interface method reference
    InterfaceMethodRef {
        /// Index of the declaring interface
        class_index: u16,
        /// Index of the name and descriptor
        name_and_type_index: u16,
    },
    /// Member name and descriptor pair
    NameAndType {
        /// Index of the member name
        name_index: u16,
        /// Index of the descriptor
        descriptor_index: u16,
    },
    /// Method handle
    MethodHandle {
        /// Kind of handle (1..=9)
        reference_kind: u8,
        /// Index of the referenced member
        reference_index: u16,
    },
    /// Method type
    MethodType {
        /// Index of the method descriptor
        descriptor_index: u16,
    },
    /// Dynamically computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method_attr_index: u16,
        /// Index of the name and descriptor
        name_and_type_index: u16,
    },
    /// Dynamically computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method_attr_index: u16,
        /// Index of the name and descriptor
        name_and_type_index: u16,
    },
    /// Module name
    Module {
        /// Index of the module name
        name_index: u16,
    },
    /// Package name
    Package {
        /// Index of the package name
        name_index: u16,
    },
}

impl ConstantInfo {
    /// Whether this entry takes two constant pool indices
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantInfo::Long(_) | ConstantInfo::Double(_))
    }

    fn read(reader: &mut ClassReader<'_>) -> Result<Self> {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        let info = match tag {
            tag::UTF8 => {
                let len = reader.read_u16()? as usize;
                ConstantInfo::Utf8(Utf8Info::new(reader.read_bytes(len)?))
            }
            tag::INTEGER => ConstantInfo::Integer(reader.read_i32()?),
            tag::FLOAT => ConstantInfo::Float(reader.read_f32()?),
            tag::LONG => ConstantInfo::Long(reader.read_i64()?),
            tag::DOUBLE => ConstantInfo::Double(reader.read_f64()?),
            tag::CLASS => ConstantInfo::Class {
                name_index: reader.read_u16()?,
            },
            tag::STRING => ConstantInfo::String {
                string_index: reader.read_u16()?,
            },
            tag::FIELD_REF => ConstantInfo::FieldRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            tag::METHOD_REF => ConstantInfo::MethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            tag::INTERFACE_METHOD_REF => ConstantInfo::InterfaceMethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            tag::NAME_AND_TYPE => ConstantInfo::NameAndType {
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
            },
            tag::METHOD_HANDLE => ConstantInfo::MethodHandle {
                reference_kind: reader.read_u8()?,
                reference_index: reader.read_u16()?,
            },
            tag::METHOD_TYPE => ConstantInfo::MethodType {
                descriptor_index: reader.read_u16()?,
            },
            tag::DYNAMIC => ConstantInfo::Dynamic {
                bootstrap_method_attr_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            tag::INVOKE_DYNAMIC => ConstantInfo::InvokeDynamic {
                bootstrap_method_attr_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            tag::MODULE => ConstantInfo::Module {
                name_index: reader.read_u16()?,
            },
            tag::PACKAGE => ConstantInfo::Package {
                name_index: reader.read_u16()?,
            },
            _ => return Err(ClassFileError::MalformedConstant { tag, offset }),
        };
        Ok(info)
    }
}

/// A resolved member reference: declaring class, name, descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the declaring class
    pub class_name: &'a str,
    /// Member name
    pub name: &'a str,
    /// Member descriptor
    pub descriptor: &'a str,
}

/// Per-class constant pool
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Option<ConstantInfo>>,
}

impl ConstantPool {
    /// Build a pool from entries; `entries[0]` must be `None`
    pub fn from_entries(entries: Vec<Option<ConstantInfo>>) -> Self {
        Self { entries }
    }

    /// Read `constant_pool_count` followed by `count - 1` entries
    pub fn read(reader: &mut ClassReader<'_>) -> Result<Self> {
        let count = reader.read_u16()? as usize;
        let mut entries: Vec<Option<ConstantInfo>> = Vec::with_capacity(count.max(1));
        entries.push(None);

        while entries.len() < count {
            let info = ConstantInfo::read(reader)?;
            let wide = info.is_wide();
            entries.push(Some(info));
            if wide {
                // The next index is valid but unusable
                entries.push(None);
            }
        }
        // A trailing wide constant may push one past `count`
        entries.truncate(count.max(1));

        Ok(Self { entries })
    }

    /// Number of indices, including the unused index 0
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no usable entries
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Entry at `index`, or `None` for index 0, out-of-range or unusable indices
    pub fn get(&self, index: u16) -> Option<&ConstantInfo> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize).and_then(|e| e.as_ref())
    }

    /// Iterate over `(index, entry)` for every usable index
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantInfo)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i as u16, e)))
    }

    /// Decoded `Utf8` text; empty if absent
    pub fn utf8(&self, index: u16) -> &str {
        match self.get(index) {
            Some(ConstantInfo::Utf8(info)) => info.text(),
            _ => "",
        }
    }

    /// Internal class name of a `Class` entry; empty if absent
    pub fn class_name(&self, index: u16) -> &str {
        match self.get(index) {
            Some(ConstantInfo::Class { name_index }) => self.utf8(*name_index),
            _ => "",
        }
    }

    /// Name and descriptor of a `NameAndType` entry; empty if absent
    pub fn name_and_type(&self, index: u16) -> (&str, &str) {
        match self.get(index) {
            Some(ConstantInfo::NameAndType {
                name_index,
                descriptor_index,
            }) => (self.utf8(*name_index), self.utf8(*descriptor_index)),
            _ => ("", ""),
        }
    }

    /// Field, method or interface method reference
    pub fn member_ref(&self, index: u16) -> Option<MemberRef<'_>> {
        match self.get(index)? {
            ConstantInfo::FieldRef {
                class_index,
                name_and_type_index,
            }
            | ConstantInfo::MethodRef {
                class_index,
                name_and_type_index,
            }
            | ConstantInfo::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index);
                Some(MemberRef {
                    class_name: self.class_name(*class_index),
                    name,
                    descriptor,
                })
            }
            _ => None,
        }
    }

    /// Text of a `String` literal; empty if absent
    pub fn string(&self, index: u16) -> &str {
        match self.get(index) {
            Some(ConstantInfo::String { string_index }) => self.utf8(*string_index),
            _ => "",
        }
    }

    /// `Integer` literal; zero if absent
    pub fn integer(&self, index: u16) -> i32 {
        match self.get(index) {
            Some(ConstantInfo::Integer(v)) => *v,
            _ => 0,
        }
    }

    /// `Float` literal; zero if absent
    pub fn float(&self, index: u16) -> f32 {
        match self.get(index) {
            Some(ConstantInfo::Float(v)) => *v,
            _ => 0.0,
        }
    }

    /// `Long` literal; zero if absent
    pub fn long(&self, index: u16) -> i64 {
        match self.get(index) {
            Some(ConstantInfo::Long(v)) => *v,
            _ => 0,
        }
    }

    /// `Double` literal; zero if absent
    pub fn double(&self, index: u16) -> f64 {
        match self.get(index) {
            Some(ConstantInfo::Double(v)) => *v,
            _ => 0.0,
        }
    }
}
