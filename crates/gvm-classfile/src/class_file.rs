//! Class-file format

use crate::attribute::{read_attributes, Attribute, CodeAttribute};
use crate::constant_pool::ConstantPool;
use crate::reader::ClassReader;
use crate::Result;
use thiserror::Error;

/// Magic number for class files
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Oldest supported major version; the only one accepting a non-zero minor
pub const MIN_MAJOR_VERSION: u16 = 45;

/// Newest supported major version
pub const MAX_MAJOR_VERSION: u16 = 57;

/// Class-file decoding errors
#[derive(Debug, Error)]
pub enum ClassFileError {
    /// Invalid magic number
    #[error("Invalid magic number: expected 0xCAFEBABE, got {0:#010x}")]
    BadMagic(u32),

    /// Unsupported version
    #[error("Unsupported class version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version
        major: u16,
        /// Minor version
        minor: u16,
    },

    /// Unexpected end of input
    #[error("Truncated class file at offset {0}")]
    Truncated(usize),

    /// Unknown constant pool tag
    #[error("Malformed constant: unknown tag {tag} at offset {offset}")]
    MalformedConstant {
        /// Tag byte
        tag: u8,
        /// Offset of the tag byte
        offset: usize,
    },

    /// Descriptor does not follow the descriptor grammar
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    /// A name index does not reference a `Utf8` constant
    #[error("Constant #{0} is not a Utf8 entry")]
    InvalidUtf8(u16),
}

/// Whether a version pair is accepted
pub fn is_supported_version(major: u16, minor: u16) -> bool {
    match major {
        MIN_MAJOR_VERSION => true,
        m if m > MIN_MAJOR_VERSION && m <= MAX_MAJOR_VERSION => minor == 0,
        _ => false,
    }
}

/// A field or method table entry
#[derive(Debug, Clone)]
pub struct MemberInfo {
    /// Access flags
    pub access_flags: u16,
    /// Member name
    pub name: String,
    /// Member descriptor
    pub descriptor: String,
    /// Member attributes
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    fn read(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> Result<Self> {
        let access_flags = reader.read_u16()?;
        let name = utf8_required(pool, reader.read_u16()?)?;
        let descriptor = utf8_required(pool, reader.read_u16()?)?;
        let attributes = read_attributes(reader, pool)?;
        Ok(Self {
            access_flags,
            name,
            descriptor,
            attributes,
        })
    }

    /// `Code` attribute, if present
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }

    /// `ConstantValue` index, if present
    pub fn constant_value(&self) -> Option<u16> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::ConstantValue(index) => Some(*index),
            _ => None,
        })
    }

    /// Check an access flag
    pub fn has_flag(&self, flag: u16) -> bool {
        self.access_flags & flag != 0
    }
}

fn utf8_required(pool: &ConstantPool, index: u16) -> Result<String> {
    match pool.get(index) {
        Some(crate::ConstantInfo::Utf8(info)) => Ok(info.text().to_string()),
        _ => Err(ClassFileError::InvalidUtf8(index)),
    }
}

/// A parsed class file; immutable once produced
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// Constant pool
    pub constant_pool: ConstantPool,
    /// Access flags
    pub access_flags: u16,
    /// `this_class` index
    pub this_class: u16,
    /// `super_class` index (0 for `java/lang/Object`)
    pub super_class: u16,
    /// Interface indices
    pub interfaces: Vec<u16>,
    /// Field table
    pub fields: Vec<MemberInfo>,
    /// Method table
    pub methods: Vec<MemberInfo>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Decode a class file from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = ClassReader::new(data);

        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }

        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        if !is_supported_version(major_version, minor_version) {
            return Err(ClassFileError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let constant_pool = ConstantPool::read(&mut reader)?;
        let access_flags = reader.read_u16()?;
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;
        let interfaces = reader.read_u16s()?;

        let field_count = reader.read_u16()? as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(MemberInfo::read(&mut reader, &constant_pool)?);
        }

        let method_count = reader.read_u16()? as usize;
        let mut methods = Vec::with_capacity(method_count);
        for _ in 0..method_count {
            methods.push(MemberInfo::read(&mut reader, &constant_pool)?);
        }

        let attributes = read_attributes(&mut reader, &constant_pool)?;

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Internal name of this class
    pub fn this_class_name(&self) -> &str {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal name of the superclass; empty for `java/lang/Object`
    pub fn super_class_name(&self) -> &str {
        self.constant_pool.class_name(self.super_class)
    }

    /// Internal names of the direct superinterfaces
    pub fn interface_names(&self) -> Vec<&str> {
        self.interfaces
            .iter()
            .map(|&i| self.constant_pool.class_name(i))
            .collect()
    }

    /// Name and descriptor at a `NameAndType` index
    pub fn name_and_type(&self, index: u16) -> (&str, &str) {
        self.constant_pool.name_and_type(index)
    }

    /// `SourceFile` name, if present
    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::SourceFile(index) => Some(self.constant_pool.utf8(*index)),
            _ => None,
        })
    }

    /// Bootstrap method table, if present
    pub fn bootstrap_methods(&self) -> Option<&[crate::attribute::BootstrapMethod]> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::BootstrapMethods(methods) => Some(methods.as_slice()),
            _ => None,
        })
    }

    /// Find a method by name and descriptor
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: u32, minor: u16, major: u16) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&magic.to_be_bytes());
        b.extend_from_slice(&minor.to_be_bytes());
        b.extend_from_slice(&major.to_be_bytes());
        b
    }

    #[test]
    fn test_bad_magic() {
        let bytes = header(0xDEAD_BEEF, 0, 52);
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFileError::BadMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn test_version_range() {
        assert!(is_supported_version(45, 3));
        assert!(is_supported_version(52, 0));
        assert!(is_supported_version(57, 0));
        assert!(!is_supported_version(52, 1));
        assert!(!is_supported_version(44, 0));
        assert!(!is_supported_version(58, 0));

        let bytes = header(MAGIC, 0, 61);
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFileError::UnsupportedVersion { major: 61, minor: 0 })
        ));
    }

    #[test]
    fn test_truncated_after_header() {
        let bytes = header(MAGIC, 0, 52);
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassFileError::Truncated(8))
        ));
    }
}
