//! Decoded instructions
//!
//! [`Instruction::decode`] reads one instruction and its operands from a code
//! array. Operand bytes are read once here; `wide` becomes the ordinary
//! load/store/`ret`/`iinc` variant with a 16-bit index, and branch offsets are
//! resolved to absolute code positions.

use crate::heap::ArrayKind;
use crate::value::Value;
use crate::{VmError, VmResult};
use gvm_classfile::Opcode;
use std::cmp::Ordering;

/// Value kind of a typed local, return or stack operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `i` prefix
    Int,
    /// `l` prefix
    Long,
    /// `f` prefix
    Float,
    /// `d` prefix
    Double,
    /// `a` prefix
    Reference,
}

impl ValueKind {
    /// Slot kind name as reported by [`crate::Slot::kind`]
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Reference => "reference",
        }
    }

    fn from_offset(offset: u8) -> Self {
        match offset {
            0 => ValueKind::Int,
            1 => ValueKind::Long,
            2 => ValueKind::Float,
            3 => ValueKind::Double,
            _ => ValueKind::Reference,
        }
    }
}

/// Branch condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `<=`
    Le,
}

impl Cond {
    fn from_offset(offset: u8) -> Self {
        match offset {
            0 => Cond::Eq,
            1 => Cond::Ne,
            2 => Cond::Lt,
            3 => Cond::Ge,
            4 => Cond::Gt,
            _ => Cond::Le,
        }
    }

    /// Whether the condition holds for `a` compared to `b`
    pub fn holds(self, a: i32, b: i32) -> bool {
        let ord = a.cmp(&b);
        match self {
            Cond::Eq => ord == Ordering::Equal,
            Cond::Ne => ord != Ordering::Equal,
            Cond::Lt => ord == Ordering::Less,
            Cond::Ge => ord != Ordering::Less,
            Cond::Gt => ord == Ordering::Greater,
            Cond::Le => ord != Ordering::Greater,
        }
    }
}

/// Method invocation flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    /// `invokevirtual`
    Virtual,
    /// `invokespecial`
    Special,
    /// `invokestatic`
    Static,
    /// `invokeinterface`
    Interface,
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `nop`
    Nop,
    /// `aconst_null`, `iconst_*`, `lconst_*`, `fconst_*`, `dconst_*`, `bipush`, `sipush`
    Const(Value),
    /// `ldc`, `ldc_w`
    Ldc(u16),
    /// `ldc2_w`
    Ldc2(u16),
    /// `xload`, `xload_n`, `wide xload`
    Load(ValueKind, u16),
    /// `xstore`, `xstore_n`, `wide xstore`
    Store(ValueKind, u16),
    /// `xaload`; `baload` uses `Byte` and also reads boolean arrays
    ArrayLoad(ArrayKind),
    /// `xastore`; `bastore` uses `Byte` and also writes boolean arrays
    ArrayStore(ArrayKind),
    /// `pop` through `swap`
    Stack(Opcode),
    /// Arithmetic, shifts and bitwise logic
    Arith(Opcode),
    /// `iinc`, `wide iinc`
    Iinc {
        /// Local index
        index: u16,
        /// Signed increment
        delta: i16,
    },
    /// `i2l` through `i2s`
    Convert(Opcode),
    /// `lcmp`, `fcmpl`, `fcmpg`, `dcmpl`, `dcmpg`
    Compare(Opcode),
    /// `ifeq` .. `ifle`: compare an int against zero
    If(Cond, usize),
    /// `if_icmp*`
    IfICmp(Cond, usize),
    /// `if_acmpeq` (true) / `if_acmpne` (false)
    IfACmp(bool, usize),
    /// `ifnull` (true) / `ifnonnull` (false)
    IfNull(bool, usize),
    /// `goto`, `goto_w`
    Goto(usize),
    /// `jsr`, `jsr_w`: target and return address
    Jsr(usize, usize),
    /// `ret`, `wide ret`
    Ret(u16),
    /// `tableswitch`
    TableSwitch {
        /// Target when out of range
        default: usize,
        /// Lowest key
        low: i32,
        /// Targets for `low..=high`
        targets: Vec<usize>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Target when no key matches
        default: usize,
        /// Sorted key/target pairs
        pairs: Vec<(i32, usize)>,
    },
    /// `xreturn` (`None` for `return`)
    Return(Option<ValueKind>),
    /// `getstatic`
    GetStatic(u16),
    /// `putstatic`
    PutStatic(u16),
    /// `getfield`
    GetField(u16),
    /// `putfield`
    PutField(u16),
    /// `invokevirtual`, `invokespecial`, `invokestatic`, `invokeinterface`
    Invoke(InvokeKind, u16),
    /// `invokedynamic`
    InvokeDynamic(u16),
    /// VM-private body of native methods
    InvokeNative,
    /// `new`
    New(u16),
    /// `newarray`
    NewArray(ArrayKind),
    /// `anewarray`
    ANewArray(u16),
    /// `multianewarray`
    MultiANewArray(u16, u8),
    /// `arraylength`
    ArrayLength,
    /// `athrow`
    AThrow,
    /// `checkcast`
    CheckCast(u16),
    /// `instanceof`
    InstanceOf(u16),
    /// `monitorenter`
    MonitorEnter,
    /// `monitorexit`
    MonitorExit,
}

struct Operands<'a> {
    code: &'a [u8],
    pc: usize,
}

impl Operands<'_> {
    fn bytes<const N: usize>(&self, offset: usize) -> VmResult<[u8; N]> {
        self.code
            .get(offset..offset + N)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| VmError::MalformedCode(format!("truncated operands at pc {}", self.pc)))
    }

    fn u8(&self, offset: usize) -> VmResult<u8> {
        Ok(self.bytes::<1>(offset)?[0])
    }

    fn u16(&self, offset: usize) -> VmResult<u16> {
        Ok(u16::from_be_bytes(self.bytes(offset)?))
    }

    fn i16(&self, offset: usize) -> VmResult<i16> {
        Ok(i16::from_be_bytes(self.bytes(offset)?))
    }

    fn i32(&self, offset: usize) -> VmResult<i32> {
        Ok(i32::from_be_bytes(self.bytes(offset)?))
    }

    /// Absolute target of a branch relative to the instruction start
    fn target(&self, relative: i32) -> VmResult<usize> {
        let target = self.pc as i64 + relative as i64;
        if target < 0 || target as usize >= self.code.len() {
            return Err(VmError::MalformedCode(format!(
                "branch from {} to {} outside code of length {}",
                self.pc,
                target,
                self.code.len()
            )));
        }
        Ok(target as usize)
    }
}

impl Instruction {
    /// Decode the instruction at `pc`, returning it with its encoded size
    pub fn decode(code: &[u8], pc: usize) -> VmResult<(Instruction, usize)> {
        use Instruction as I;
        use Opcode as O;

        let ops = Operands { code, pc };
        let byte = ops.u8(pc)?;
        let op = Opcode::from_u8(byte).ok_or(VmError::InvalidOpcode(byte))?;

        let decoded = match op {
            O::Nop => (I::Nop, 1),
            O::AconstNull => (I::Const(Value::NULL), 1),
            O::IconstM1 | O::Iconst0 | O::Iconst1 | O::Iconst2 | O::Iconst3 | O::Iconst4 | O::Iconst5 => {
                (I::Const(Value::Int(byte as i32 - O::Iconst0 as i32)), 1)
            }
            O::Lconst0 | O::Lconst1 => (I::Const(Value::Long((byte - O::Lconst0 as u8) as i64)), 1),
            O::Fconst0 | O::Fconst1 | O::Fconst2 => {
                (I::Const(Value::Float((byte - O::Fconst0 as u8) as f32)), 1)
            }
            O::Dconst0 | O::Dconst1 => (I::Const(Value::Double((byte - O::Dconst0 as u8) as f64)), 1),
            O::Bipush => (I::Const(Value::Int(ops.u8(pc + 1)? as i8 as i32)), 2),
            O::Sipush => (I::Const(Value::Int(ops.i16(pc + 1)? as i32)), 3),
            O::Ldc => (I::Ldc(ops.u8(pc + 1)? as u16), 2),
            O::LdcW => (I::Ldc(ops.u16(pc + 1)?), 3),
            O::Ldc2W => (I::Ldc2(ops.u16(pc + 1)?), 3),

            O::Iload | O::Lload | O::Fload | O::Dload | O::Aload => (
                I::Load(ValueKind::from_offset(byte - O::Iload as u8), ops.u8(pc + 1)? as u16),
                2,
            ),
            O::Iload0 | O::Iload1 | O::Iload2 | O::Iload3 | O::Lload0 | O::Lload1 | O::Lload2
            | O::Lload3 | O::Fload0 | O::Fload1 | O::Fload2 | O::Fload3 | O::Dload0 | O::Dload1
            | O::Dload2 | O::Dload3 | O::Aload0 | O::Aload1 | O::Aload2 | O::Aload3 => {
                let n = byte - O::Iload0 as u8;
                (I::Load(ValueKind::from_offset(n / 4), (n % 4) as u16), 1)
            }
            O::Istore | O::Lstore | O::Fstore | O::Dstore | O::Astore => (
                I::Store(ValueKind::from_offset(byte - O::Istore as u8), ops.u8(pc + 1)? as u16),
                2,
            ),
            O::Istore0 | O::Istore1 | O::Istore2 | O::Istore3 | O::Lstore0 | O::Lstore1
            | O::Lstore2 | O::Lstore3 | O::Fstore0 | O::Fstore1 | O::Fstore2 | O::Fstore3
            | O::Dstore0 | O::Dstore1 | O::Dstore2 | O::Dstore3 | O::Astore0 | O::Astore1
            | O::Astore2 | O::Astore3 => {
                let n = byte - O::Istore0 as u8;
                (I::Store(ValueKind::from_offset(n / 4), (n % 4) as u16), 1)
            }

            O::Iaload | O::Laload | O::Faload | O::Daload | O::Aaload | O::Baload | O::Caload
            | O::Saload => (I::ArrayLoad(array_kind(byte - O::Iaload as u8)), 1),
            O::Iastore | O::Lastore | O::Fastore | O::Dastore | O::Aastore | O::Bastore
            | O::Castore | O::Sastore => (I::ArrayStore(array_kind(byte - O::Iastore as u8)), 1),

            O::Pop | O::Pop2 | O::Dup | O::DupX1 | O::DupX2 | O::Dup2 | O::Dup2X1 | O::Dup2X2
            | O::Swap => (I::Stack(op), 1),

            O::Iinc => (
                I::Iinc {
                    index: ops.u8(pc + 1)? as u16,
                    delta: ops.u8(pc + 2)? as i8 as i16,
                },
                3,
            ),
            O::I2l | O::I2f | O::I2d | O::L2i | O::L2f | O::L2d | O::F2i | O::F2l | O::F2d
            | O::D2i | O::D2l | O::D2f | O::I2b | O::I2c | O::I2s => (I::Convert(op), 1),
            O::Lcmp | O::Fcmpl | O::Fcmpg | O::Dcmpl | O::Dcmpg => (I::Compare(op), 1),
            _ if (O::Iadd as u8..=O::Lxor as u8).contains(&byte) => (I::Arith(op), 1),

            O::Ifeq | O::Ifne | O::Iflt | O::Ifge | O::Ifgt | O::Ifle => (
                I::If(Cond::from_offset(byte - O::Ifeq as u8), ops.target(ops.i16(pc + 1)? as i32)?),
                3,
            ),
            O::IfIcmpeq | O::IfIcmpne | O::IfIcmplt | O::IfIcmpge | O::IfIcmpgt | O::IfIcmple => (
                I::IfICmp(
                    Cond::from_offset(byte - O::IfIcmpeq as u8),
                    ops.target(ops.i16(pc + 1)? as i32)?,
                ),
                3,
            ),
            O::IfAcmpeq | O::IfAcmpne => (
                I::IfACmp(op == O::IfAcmpeq, ops.target(ops.i16(pc + 1)? as i32)?),
                3,
            ),
            O::Ifnull | O::Ifnonnull => (
                I::IfNull(op == O::Ifnull, ops.target(ops.i16(pc + 1)? as i32)?),
                3,
            ),
            O::Goto => (I::Goto(ops.target(ops.i16(pc + 1)? as i32)?), 3),
            O::GotoW => (I::Goto(ops.target(ops.i32(pc + 1)?)?), 5),
            O::Jsr => (I::Jsr(ops.target(ops.i16(pc + 1)? as i32)?, pc + 3), 3),
            O::JsrW => (I::Jsr(ops.target(ops.i32(pc + 1)?)?, pc + 5), 5),
            O::Ret => (I::Ret(ops.u8(pc + 1)? as u16), 2),

            O::Tableswitch => {
                let base = switch_base(pc);
                let default = ops.target(ops.i32(base)?)?;
                let low = ops.i32(base + 4)?;
                let high = ops.i32(base + 8)?;
                if high < low {
                    return Err(VmError::MalformedCode(format!(
                        "tableswitch at {} has high {} < low {}",
                        pc, high, low
                    )));
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                let targets = (0..count)
                    .map(|i| ops.target(ops.i32(base + 12 + i * 4)?))
                    .collect::<VmResult<Vec<_>>>()?;
                (I::TableSwitch { default, low, targets }, base + 12 + count * 4 - pc)
            }
            O::Lookupswitch => {
                let base = switch_base(pc);
                let default = ops.target(ops.i32(base)?)?;
                let npairs = ops.i32(base + 4)?;
                if npairs < 0 {
                    return Err(VmError::MalformedCode(format!(
                        "lookupswitch at {} has {} pairs",
                        pc, npairs
                    )));
                }
                let npairs = npairs as usize;
                let pairs = (0..npairs)
                    .map(|i| {
                        let at = base + 8 + i * 8;
                        Ok((ops.i32(at)?, ops.target(ops.i32(at + 4)?)?))
                    })
                    .collect::<VmResult<Vec<_>>>()?;
                (I::LookupSwitch { default, pairs }, base + 8 + npairs * 8 - pc)
            }

            O::Ireturn | O::Lreturn | O::Freturn | O::Dreturn | O::Areturn => {
                (I::Return(Some(ValueKind::from_offset(byte - O::Ireturn as u8))), 1)
            }
            O::Return => (I::Return(None), 1),

            O::Getstatic => (I::GetStatic(ops.u16(pc + 1)?), 3),
            O::Putstatic => (I::PutStatic(ops.u16(pc + 1)?), 3),
            O::Getfield => (I::GetField(ops.u16(pc + 1)?), 3),
            O::Putfield => (I::PutField(ops.u16(pc + 1)?), 3),
            O::Invokevirtual => (I::Invoke(InvokeKind::Virtual, ops.u16(pc + 1)?), 3),
            O::Invokespecial => (I::Invoke(InvokeKind::Special, ops.u16(pc + 1)?), 3),
            O::Invokestatic => (I::Invoke(InvokeKind::Static, ops.u16(pc + 1)?), 3),
            O::Invokeinterface => (I::Invoke(InvokeKind::Interface, ops.u16(pc + 1)?), 5),
            O::Invokedynamic => (I::InvokeDynamic(ops.u16(pc + 1)?), 5),
            O::Invokenative => (I::InvokeNative, 1),

            O::New => (I::New(ops.u16(pc + 1)?), 3),
            O::Newarray => {
                let code = ops.u8(pc + 1)?;
                let kind = ArrayKind::from_type_code(code)
                    .ok_or_else(|| VmError::MalformedCode(format!("newarray type {} at pc {}", code, pc)))?;
                (I::NewArray(kind), 2)
            }
            O::Anewarray => (I::ANewArray(ops.u16(pc + 1)?), 3),
            O::Multianewarray => (I::MultiANewArray(ops.u16(pc + 1)?, ops.u8(pc + 3)?), 4),
            O::Arraylength => (I::ArrayLength, 1),
            O::Athrow => (I::AThrow, 1),
            O::Checkcast => (I::CheckCast(ops.u16(pc + 1)?), 3),
            O::Instanceof => (I::InstanceOf(ops.u16(pc + 1)?), 3),
            O::Monitorenter => (I::MonitorEnter, 1),
            O::Monitorexit => (I::MonitorExit, 1),

            O::Wide => decode_wide(&ops)?,

            O::Breakpoint | O::Impdep2 => return Err(VmError::InvalidOpcode(byte)),
            _ => return Err(VmError::InvalidOpcode(byte)),
        };
        Ok(decoded)
    }
}

fn decode_wide(ops: &Operands<'_>) -> VmResult<(Instruction, usize)> {
    use Opcode as O;
    let pc = ops.pc;
    let byte = ops.u8(pc + 1)?;
    let index = ops.u16(pc + 2)?;
    Ok(match Opcode::from_u8(byte) {
        Some(O::Iload | O::Lload | O::Fload | O::Dload | O::Aload) => (
            Instruction::Load(ValueKind::from_offset(byte - O::Iload as u8), index),
            4,
        ),
        Some(O::Istore | O::Lstore | O::Fstore | O::Dstore | O::Astore) => (
            Instruction::Store(ValueKind::from_offset(byte - O::Istore as u8), index),
            4,
        ),
        Some(O::Ret) => (Instruction::Ret(index), 4),
        Some(O::Iinc) => (
            Instruction::Iinc {
                index,
                delta: ops.i16(pc + 4)?,
            },
            6,
        ),
        _ => {
            return Err(VmError::MalformedCode(format!(
                "wide applied to opcode {:#04x} at pc {}",
                byte, pc
            )))
        }
    })
}

/// Offset of the first 4-byte-aligned operand after a switch opcode
fn switch_base(pc: usize) -> usize {
    (pc + 4) & !3
}

fn array_kind(offset: u8) -> ArrayKind {
    match offset {
        0 => ArrayKind::Int,
        1 => ArrayKind::Long,
        2 => ArrayKind::Float,
        3 => ArrayKind::Double,
        4 => ArrayKind::Reference,
        5 => ArrayKind::Byte,
        6 => ArrayKind::Char,
        _ => ArrayKind::Short,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_decodes_to_plain_variant() {
        let code = [Opcode::Wide as u8, Opcode::Lload as u8, 0x01, 0x00];
        let (instr, size) = Instruction::decode(&code, 0).unwrap();
        assert_eq!(instr, Instruction::Load(ValueKind::Long, 256));
        assert_eq!(size, 4);

        let code = [Opcode::Wide as u8, Opcode::Iinc as u8, 0x00, 0x02, 0xff, 0xfe];
        let (instr, size) = Instruction::decode(&code, 0).unwrap();
        assert_eq!(instr, Instruction::Iinc { index: 2, delta: -2 });
        assert_eq!(size, 6);

        let code = [Opcode::Wide as u8, Opcode::Iadd as u8, 0, 0];
        assert!(matches!(Instruction::decode(&code, 0), Err(VmError::MalformedCode(_))));
    }

    #[test]
    fn test_short_forms() {
        let (instr, _) = Instruction::decode(&[Opcode::Dstore3 as u8], 0).unwrap();
        assert_eq!(instr, Instruction::Store(ValueKind::Double, 3));
        let (instr, _) = Instruction::decode(&[Opcode::Aload1 as u8], 0).unwrap();
        assert_eq!(instr, Instruction::Load(ValueKind::Reference, 1));
        let (instr, _) = Instruction::decode(&[Opcode::IconstM1 as u8], 0).unwrap();
        assert_eq!(instr, Instruction::Const(Value::Int(-1)));
        let (instr, _) = Instruction::decode(&[Opcode::Bipush as u8, 0x80], 0).unwrap();
        assert_eq!(instr, Instruction::Const(Value::Int(-128)));
        let (instr, _) = Instruction::decode(&[Opcode::Baload as u8], 0).unwrap();
        assert_eq!(instr, Instruction::ArrayLoad(ArrayKind::Byte));
        let (instr, _) = Instruction::decode(&[Opcode::Lreturn as u8], 0).unwrap();
        assert_eq!(instr, Instruction::Return(Some(ValueKind::Long)));
        let (instr, _) = Instruction::decode(&[Opcode::Lxor as u8], 0).unwrap();
        assert_eq!(instr, Instruction::Arith(Opcode::Lxor));
    }

    #[test]
    fn test_branch_targets_are_absolute_and_checked() {
        let code = [Opcode::Nop as u8, Opcode::Goto as u8, 0xff, 0xff];
        let (instr, _) = Instruction::decode(&code, 1).unwrap();
        assert_eq!(instr, Instruction::Goto(0));

        let code = [Opcode::Goto as u8, 0x00, 0x10];
        assert!(matches!(Instruction::decode(&code, 0), Err(VmError::MalformedCode(_))));
    }

    #[test]
    fn test_tableswitch_alignment() {
        // pc 1: tableswitch, pad to 4
        let mut code = vec![Opcode::Nop as u8, Opcode::Tableswitch as u8, 0, 0];
        code.extend_from_slice(&19i32.to_be_bytes()); // default -> 20
        code.extend_from_slice(&1i32.to_be_bytes()); // low
        code.extend_from_slice(&2i32.to_be_bytes()); // high
        code.extend_from_slice(&19i32.to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&[Opcode::Nop as u8; 3]);
        let (instr, size) = Instruction::decode(&code, 1).unwrap();
        assert_eq!(size, 23);
        assert_eq!(
            instr,
            Instruction::TableSwitch {
                default: 20,
                low: 1,
                targets: vec![20, 21]
            }
        );
    }

    #[test]
    fn test_invalid_and_truncated() {
        assert!(matches!(Instruction::decode(&[0xcb], 0), Err(VmError::InvalidOpcode(0xcb))));
        assert!(matches!(Instruction::decode(&[0xca], 0), Err(VmError::InvalidOpcode(0xca))));
        assert!(matches!(
            Instruction::decode(&[Opcode::Sipush as u8, 0x01], 0),
            Err(VmError::MalformedCode(_))
        ));
        assert!(Instruction::decode(&[], 0).is_err());
    }

    #[test]
    fn test_cond() {
        assert!(Cond::Lt.holds(-1, 0));
        assert!(Cond::Ge.holds(0, 0));
        assert!(!Cond::Gt.holds(0, 0));
        assert!(Cond::Ne.holds(1, 2));
    }
}
