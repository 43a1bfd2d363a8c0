//! Attributes attached to classes, fields, methods and code

use crate::class_file::ClassFileError;
use crate::constant_pool::ConstantPool;
use crate::reader::ClassReader;
use crate::Result;

/// Exception handler entry of a `Code` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// Start of the protected range (inclusive)
    pub start_pc: u16,
    /// End of the protected range (exclusive)
    pub end_pc: u16,
    /// Handler entry point
    pub handler_pc: u16,
    /// Caught class index; 0 catches everything
    pub catch_type: u16,
}

impl ExceptionTableEntry {
    /// Whether `pc` lies in the protected range
    pub fn covers(&self, pc: usize) -> bool {
        pc >= self.start_pc as usize && pc < self.end_pc as usize
    }
}

/// `Code` attribute
#[derive(Debug, Clone, Default)]
pub struct CodeAttribute {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Bytecode
    pub code: Vec<u8>,
    /// Exception handlers, in priority order
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Nested attributes (`LineNumberTable`, ...)
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    /// Source line for a bytecode offset, if a `LineNumberTable` is present
    pub fn line_number(&self, pc: usize) -> Option<u16> {
        let table = self.attributes.iter().find_map(|a| match a {
            Attribute::LineNumberTable(t) => Some(t),
            _ => None,
        })?;
        table
            .iter()
            .filter(|e| e.start_pc as usize <= pc)
            .max_by_key(|e| e.start_pc)
            .map(|e| e.line_number)
    }
}

/// `LineNumberTable` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    /// First bytecode offset of the line
    pub start_pc: u16,
    /// Source line
    pub line_number: u16,
}

/// `BootstrapMethods` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// `MethodHandle` index
    pub method_ref: u16,
    /// Static argument indices
    pub arguments: Vec<u16>,
}

/// A decoded attribute
#[derive(Debug, Clone)]
pub enum Attribute {
    /// Method body
    Code(CodeAttribute),
    /// Constant initializer of a static field
    ConstantValue(u16),
    /// Declared checked exceptions (class indices)
    Exceptions(Vec<u16>),
    /// Source file name index
    SourceFile(u16),
    /// Generic signature index
    Signature(u16),
    /// Bytecode offset to source line map
    LineNumberTable(Vec<LineNumber>),
    /// Bootstrap methods for `invokedynamic`
    BootstrapMethods(Vec<BootstrapMethod>),
    /// `Deprecated` marker
    Deprecated,
    /// `Synthetic` marker
    Synthetic,
    /// Any other attribute, kept undecoded
    Unparsed {
        /// Attribute name
        name: String,
        /// Raw payload
        bytes: Vec<u8>,
    },
}

/// Read a `u2` count followed by that many attributes
pub(crate) fn read_attributes(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Attribute>> {
    let count = reader.read_u16()? as usize;
    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        attributes.push(read_attribute(reader, pool)?);
    }
    Ok(attributes)
}

fn read_attribute(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> Result<Attribute> {
    let name_index = reader.read_u16()?;
    let length = reader.read_u32()? as usize;
    let start = reader.position();
    let payload = reader.read_bytes(length)?;

    read_payload(pool.utf8(name_index), &payload, pool).map_err(|e| match e {
        ClassFileError::Truncated(offset) => ClassFileError::Truncated(start + offset),
        other => other,
    })
}

/// Decode an attribute body; offsets in errors are relative to `payload`
fn read_payload(name: &str, payload: &[u8], pool: &ConstantPool) -> Result<Attribute> {
    let mut body = ClassReader::new(payload);

    let attribute = match name {
        "Code" => {
            let max_stack = body.read_u16()?;
            let max_locals = body.read_u16()?;
            let code_length = body.read_u32()? as usize;
            let code = body.read_bytes(code_length)?;
            let handler_count = body.read_u16()? as usize;
            let mut exception_table = Vec::with_capacity(handler_count);
            for _ in 0..handler_count {
                exception_table.push(ExceptionTableEntry {
                    start_pc: body.read_u16()?,
                    end_pc: body.read_u16()?,
                    handler_pc: body.read_u16()?,
                    catch_type: body.read_u16()?,
                });
            }
            let attributes = read_attributes(&mut body, pool)?;
            Attribute::Code(CodeAttribute {
                max_stack,
                max_locals,
                code,
                exception_table,
                attributes,
            })
        }
        "ConstantValue" => Attribute::ConstantValue(body.read_u16()?),
        "Exceptions" => Attribute::Exceptions(body.read_u16s()?),
        "SourceFile" => Attribute::SourceFile(body.read_u16()?),
        "Signature" => Attribute::Signature(body.read_u16()?),
        "LineNumberTable" => {
            let count = body.read_u16()? as usize;
            let mut table = Vec::with_capacity(count);
            for _ in 0..count {
                table.push(LineNumber {
                    start_pc: body.read_u16()?,
                    line_number: body.read_u16()?,
                });
            }
            Attribute::LineNumberTable(table)
        }
        "BootstrapMethods" => {
            let count = body.read_u16()? as usize;
            let mut methods = Vec::with_capacity(count);
            for _ in 0..count {
                methods.push(BootstrapMethod {
                    method_ref: body.read_u16()?,
                    arguments: body.read_u16s()?,
                });
            }
            Attribute::BootstrapMethods(methods)
        }
        "Deprecated" => Attribute::Deprecated,
        "Synthetic" => Attribute::Synthetic,
        other => Attribute::Unparsed {
            name: other.to_string(),
            bytes: payload.to_vec(),
        },
    };
    Ok(attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_pool::{ConstantInfo, Utf8Info};

    fn pool(names: &[&str]) -> ConstantPool {
        let mut entries = vec![None];
        for name in names {
            entries.push(Some(ConstantInfo::Utf8(Utf8Info::new(name.as_bytes().to_vec()))));
        }
        ConstantPool::from_entries(entries)
    }

    #[test]
    fn test_unknown_attribute_is_kept() {
        let pool = pool(&["Custom"]);
        let bytes = [0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xAB, 0xCD];
        let attrs = read_attributes(&mut ClassReader::new(&bytes), &pool).unwrap();
        match &attrs[0] {
            Attribute::Unparsed { name, bytes } => {
                assert_eq!(name, "Custom");
                assert_eq!(bytes, &vec![0xAB, 0xCD]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_reports_file_offset() {
        let pool = pool(&["ConstantValue"]);
        let bytes = [0xFF, 0xFF, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00];
        let mut reader = ClassReader::new(&bytes);
        reader.read_u16().unwrap();
        assert!(matches!(
            read_attribute(&mut reader, &pool),
            Err(ClassFileError::Truncated(8))
        ));
    }

    #[test]
    fn test_line_number_lookup() {
        let code = CodeAttribute {
            attributes: vec![Attribute::LineNumberTable(vec![
                LineNumber { start_pc: 0, line_number: 10 },
                LineNumber { start_pc: 4, line_number: 11 },
            ])],
            ..Default::default()
        };
        assert_eq!(code.line_number(0), Some(10));
        assert_eq!(code.line_number(5), Some(11));
        assert_eq!(CodeAttribute::default().line_number(0), None);
    }
}
