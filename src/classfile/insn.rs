//! JVM instruction decoding.
//!
//! Instructions are normalized the way bytecode libraries usually present them:
//! `iload_0` becomes `ILOAD 0`, `ldc_w`/`ldc2_w` become `LDC`, `goto_w`/`jsr_w`
//! become `GOTO`/`JSR`, and `wide` is folded into the widened instruction.
//! Branch targets are stored as instruction indices, not byte offsets.

use std::collections::HashMap;

use super::constant_pool::ConstantPool;
use super::reader::Reader;
use super::{BootstrapMethod, ClassFileError, Constant, MethodHandle, Result};

pub mod op {
    pub const NOP: u8 = 0;
    pub const ACONST_NULL: u8 = 1;
    pub const ICONST_M1: u8 = 2;
    pub const ICONST_5: u8 = 8;
    pub const LCONST_0: u8 = 9;
    pub const LCONST_1: u8 = 10;
    pub const FCONST_0: u8 = 11;
    pub const FCONST_2: u8 = 13;
    pub const DCONST_0: u8 = 14;
    pub const DCONST_1: u8 = 15;
    pub const BIPUSH: u8 = 16;
    pub const SIPUSH: u8 = 17;
    pub const LDC: u8 = 18;
    pub const LDC_W: u8 = 19;
    pub const LDC2_W: u8 = 20;
    pub const ILOAD: u8 = 21;
    pub const ALOAD: u8 = 25;
    pub const ILOAD_0: u8 = 26;
    pub const ALOAD_3: u8 = 45;
    pub const ISTORE: u8 = 54;
    pub const ASTORE: u8 = 58;
    pub const ISTORE_0: u8 = 59;
    pub const ASTORE_3: u8 = 78;
    pub const IINC: u8 = 132;
    pub const IFEQ: u8 = 153;
    pub const GOTO: u8 = 167;
    pub const JSR: u8 = 168;
    pub const RET: u8 = 169;
    pub const TABLESWITCH: u8 = 170;
    pub const LOOKUPSWITCH: u8 = 171;
    pub const IRETURN: u8 = 172;
    pub const RETURN: u8 = 177;
    pub const GETSTATIC: u8 = 178;
    pub const PUTSTATIC: u8 = 179;
    pub const GETFIELD: u8 = 180;
    pub const PUTFIELD: u8 = 181;
    pub const INVOKEVIRTUAL: u8 = 182;
    pub const INVOKESPECIAL: u8 = 183;
    pub const INVOKESTATIC: u8 = 184;
    pub const INVOKEINTERFACE: u8 = 185;
    pub const INVOKEDYNAMIC: u8 = 186;
    pub const NEW: u8 = 187;
    pub const NEWARRAY: u8 = 188;
    pub const ANEWARRAY: u8 = 189;
    pub const CHECKCAST: u8 = 192;
    pub const INSTANCEOF: u8 = 193;
    pub const WIDE: u8 = 196;
    pub const MULTIANEWARRAY: u8 = 197;
    pub const IFNULL: u8 = 198;
    pub const IFNONNULL: u8 = 199;
    pub const GOTO_W: u8 = 200;
    pub const JSR_W: u8 = 201;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insn {
    /// Byte offset of the instruction within the method's code array.
    pub offset: u32,
    pub opcode: u8,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    /// `bipush`, `sipush`, `newarray` (array type code).
    Int(i32),
    /// Local variable slot of a load/store/`ret`.
    Var(u16),
    Iinc { slot: u16, delta: i16 },
    /// Branch target as an instruction index.
    Jump(usize),
    TableSwitch {
        low: i32,
        high: i32,
        default: usize,
        targets: Vec<usize>,
    },
    LookupSwitch {
        default: usize,
        pairs: Vec<(i32, usize)>,
    },
    Ldc(Constant),
    /// `new`, `anewarray`, `checkcast`, `instanceof` internal name.
    Type(String),
    Field(MemberRef),
    Method(MemberRef),
    Dynamic(DynamicCall),
    MultiANewArray { descriptor: String, dims: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub interface: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DynamicCall {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: MethodHandle,
    pub args: Vec<Constant>,
}

impl Insn {
    pub fn is_jump(&self) -> bool {
        matches!(self.operand, Operand::Jump(_))
    }
}

/// Decodes a `Code` attribute's bytecode array.
pub(crate) fn decode(
    code: &[u8],
    cp: &ConstantPool,
    bootstraps: &[BootstrapMethod],
) -> Result<Vec<Insn>> {
    let mut reader = Reader::new(code);
    // byte targets are resolved to indices once every instruction offset is known
    let mut raw: Vec<(Insn, RawTargets)> = Vec::new();

    while reader.remaining() > 0 {
        let offset = reader.position();
        let opcode = reader.read_u1()?;
        let (opcode, operand, targets) = decode_one(&mut reader, opcode, offset, cp, bootstraps)?;
        raw.push((
            Insn {
                offset: offset as u32,
                opcode,
                operand,
            },
            targets,
        ));
    }

    let index_of: HashMap<u32, usize> = raw
        .iter()
        .enumerate()
        .map(|(idx, (insn, _))| (insn.offset, idx))
        .collect();
    let resolve = |target: i64| -> Result<usize> {
        u32::try_from(target)
            .ok()
            .and_then(|t| index_of.get(&t).copied())
            .ok_or(ClassFileError::InvalidBranchTarget(target))
    };

    let mut out = Vec::with_capacity(raw.len());
    for (mut insn, targets) in raw {
        match targets {
            RawTargets::None => {}
            RawTargets::Jump(t) => insn.operand = Operand::Jump(resolve(t)?),
            RawTargets::Table {
                low,
                high,
                default,
                targets,
            } => {
                insn.operand = Operand::TableSwitch {
                    low,
                    high,
                    default: resolve(default)?,
                    targets: targets.into_iter().map(resolve).collect::<Result<_>>()?,
                }
            }
            RawTargets::Lookup { default, pairs } => {
                insn.operand = Operand::LookupSwitch {
                    default: resolve(default)?,
                    pairs: pairs
                        .into_iter()
                        .map(|(k, t)| resolve(t).map(|idx| (k, idx)))
                        .collect::<Result<_>>()?,
                }
            }
        }
        out.push(insn);
    }

    Ok(out)
}

enum RawTargets {
    None,
    Jump(i64),
    Table {
        low: i32,
        high: i32,
        default: i64,
        targets: Vec<i64>,
    },
    Lookup {
        default: i64,
        pairs: Vec<(i32, i64)>,
    },
}

fn decode_one(
    reader: &mut Reader<'_>,
    opcode: u8,
    offset: usize,
    cp: &ConstantPool,
    bootstraps: &[BootstrapMethod],
) -> Result<(u8, Operand, RawTargets)> {
    let base = offset as i64;
    let simple = |op: u8, operand: Operand| -> Result<(u8, Operand, RawTargets)> {
        Ok((op, operand, RawTargets::None))
    };

    match opcode {
        op::NOP..=op::DCONST_1 => simple(opcode, Operand::None),
        op::BIPUSH => simple(opcode, Operand::Int(reader.read_i1()? as i32)),
        op::SIPUSH => simple(opcode, Operand::Int(reader.read_i2()? as i32)),
        op::LDC => {
            let idx = reader.read_u1()? as u16;
            simple(op::LDC, Operand::Ldc(cp.get_constant(idx)?))
        }
        op::LDC_W | op::LDC2_W => {
            let idx = reader.read_u2()?;
            simple(op::LDC, Operand::Ldc(cp.get_constant(idx)?))
        }
        op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET => {
            simple(opcode, Operand::Var(reader.read_u1()? as u16))
        }
        op::ILOAD_0..=op::ALOAD_3 => {
            let rel = opcode - op::ILOAD_0;
            simple(op::ILOAD + rel / 4, Operand::Var((rel % 4) as u16))
        }
        op::ISTORE_0..=op::ASTORE_3 => {
            let rel = opcode - op::ISTORE_0;
            simple(op::ISTORE + rel / 4, Operand::Var((rel % 4) as u16))
        }
        op::IINC => {
            let slot = reader.read_u1()? as u16;
            let delta = reader.read_i1()? as i16;
            simple(opcode, Operand::Iinc { slot, delta })
        }
        op::IFEQ..=op::JSR | op::IFNULL | op::IFNONNULL => {
            let rel = reader.read_i2()? as i64;
            Ok((opcode, Operand::None, RawTargets::Jump(base + rel)))
        }
        op::GOTO_W | op::JSR_W => {
            let rel = reader.read_i4()? as i64;
            let normalized = if opcode == op::GOTO_W { op::GOTO } else { op::JSR };
            Ok((normalized, Operand::None, RawTargets::Jump(base + rel)))
        }
        op::TABLESWITCH => {
            reader.align4(0)?;
            let default = base + reader.read_i4()? as i64;
            let low = reader.read_i4()?;
            let high = reader.read_i4()?;
            if high < low {
                return Err(ClassFileError::MalformedInstruction {
                    offset: offset as u32,
                    opcode,
                });
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            if count.saturating_mul(4) > reader.remaining() {
                return Err(ClassFileError::MalformedInstruction {
                    offset: offset as u32,
                    opcode,
                });
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(base + reader.read_i4()? as i64);
            }
            Ok((
                opcode,
                Operand::None,
                RawTargets::Table {
                    low,
                    high,
                    default,
                    targets,
                },
            ))
        }
        op::LOOKUPSWITCH => {
            reader.align4(0)?;
            let default = base + reader.read_i4()? as i64;
            let npairs = reader.read_i4()?;
            if npairs < 0 || (npairs as usize).saturating_mul(8) > reader.remaining() {
                return Err(ClassFileError::MalformedInstruction {
                    offset: offset as u32,
                    opcode,
                });
            }
            let mut pairs = Vec::with_capacity(npairs as usize);
            for _ in 0..npairs {
                let key = reader.read_i4()?;
                pairs.push((key, base + reader.read_i4()? as i64));
            }
            Ok((opcode, Operand::None, RawTargets::Lookup { default, pairs }))
        }
        op::IRETURN..=op::RETURN => simple(opcode, Operand::None),
        op::GETSTATIC..=op::PUTFIELD => {
            let member = cp.get_member_ref(reader.read_u2()?)?;
            simple(opcode, Operand::Field(member.into()))
        }
        op::INVOKEVIRTUAL..=op::INVOKESTATIC => {
            let member = cp.get_member_ref(reader.read_u2()?)?;
            simple(opcode, Operand::Method(member.into()))
        }
        op::INVOKEINTERFACE => {
            let member = cp.get_member_ref(reader.read_u2()?)?;
            reader.read_u1()?;
            reader.read_u1()?;
            simple(opcode, Operand::Method(member.into()))
        }
        op::INVOKEDYNAMIC => {
            let (bsm_index, name, descriptor) = cp.get_invoke_dynamic(reader.read_u2()?)?;
            reader.read_u2()?;
            let bsm = bootstraps
                .get(bsm_index as usize)
                .ok_or(ClassFileError::MalformedAttribute("BootstrapMethods"))?;
            simple(
                opcode,
                Operand::Dynamic(DynamicCall {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    bootstrap: bsm.handle.clone(),
                    args: bsm.args.clone(),
                }),
            )
        }
        op::NEW | op::ANEWARRAY | op::CHECKCAST | op::INSTANCEOF => {
            simple(opcode, Operand::Type(cp.get_class_name(reader.read_u2()?)?))
        }
        op::NEWARRAY => simple(opcode, Operand::Int(reader.read_u1()? as i32)),
        op::WIDE => {
            let widened = reader.read_u1()?;
            match widened {
                op::IINC => {
                    let slot = reader.read_u2()?;
                    let delta = reader.read_i2()?;
                    simple(widened, Operand::Iinc { slot, delta })
                }
                op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET => {
                    simple(widened, Operand::Var(reader.read_u2()?))
                }
                _ => Err(ClassFileError::MalformedInstruction {
                    offset: offset as u32,
                    opcode: widened,
                }),
            }
        }
        op::MULTIANEWARRAY => {
            let descriptor = cp.get_class_name(reader.read_u2()?)?;
            let dims = reader.read_u1()?;
            simple(opcode, Operand::MultiANewArray { descriptor, dims })
        }
        // remaining opcodes up to monitorexit take no operands
        46..=53 | 79..=131 | 133..=152 | 190 | 191 | 194 | 195 => simple(opcode, Operand::None),
        _ => Err(ClassFileError::MalformedInstruction {
            offset: offset as u32,
            opcode,
        }),
    }
}

impl From<super::constant_pool::MemberRefEntry> for MemberRef {
    fn from(e: super::constant_pool::MemberRefEntry) -> Self {
        MemberRef {
            owner: e.owner,
            name: e.name,
            descriptor: e.descriptor,
            interface: e.interface,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_pool() -> ConstantPool {
        let bytes = [0x00, 0x01];
        ConstantPool::parse(&mut Reader::new(&bytes)).unwrap()
    }

    #[test]
    fn normalizes_short_forms_and_resolves_jumps() {
        let code = [
            0x1B, // 0 iload_1
            0x99, 0x00, 0x06, // 1 ifeq -> 7
            0x84, 0x01, 0x01, // 4 iinc 1,1
            0xB1, // 7 return
        ];
        let insns = decode(&code, &empty_pool(), &[]).unwrap();
        assert_eq!(insns.len(), 4);
        assert_eq!(insns[0].opcode, op::ILOAD);
        assert_eq!(insns[0].operand, Operand::Var(1));
        assert_eq!(insns[1].operand, Operand::Jump(3));
        assert_eq!(insns[2].operand, Operand::Iinc { slot: 1, delta: 1 });
        assert_eq!(insns[3].opcode, op::RETURN);
    }

    #[test]
    fn decodes_tableswitch_with_padding() {
        let code = [
            0x03, // 0 iconst_0
            0xAA, 0x00, 0x00, // 1 tableswitch, pad to 4
            0x00, 0x00, 0x00, 0x17, // default -> 1+23 = 24
            0x00, 0x00, 0x00, 0x00, // low 0
            0x00, 0x00, 0x00, 0x01, // high 1
            0x00, 0x00, 0x00, 0x17, // 0 -> 24
            0x00, 0x00, 0x00, 0x17, // 1 -> 24
            0x00, // 24 nop
            0xB1, // 25 return
        ];
        let insns = decode(&code, &empty_pool(), &[]).unwrap();
        match &insns[1].operand {
            Operand::TableSwitch {
                low,
                high,
                default,
                targets,
            } => {
                assert_eq!((*low, *high), (0, 1));
                assert_eq!(*default, 2);
                assert_eq!(targets, &vec![2, 2]);
            }
            other => panic!("unexpected operand {other:?}"),
        }
    }

    #[test]
    fn rejects_switch_counts_larger_than_the_code() {
        let table = [
            0xAA, 0x00, 0x00, 0x00, // tableswitch, pad to 4
            0x00, 0x00, 0x00, 0x00, // default
            0x80, 0x00, 0x00, 0x00, // low i32::MIN
            0x7F, 0xFF, 0xFF, 0xFF, // high i32::MAX
            0xB1,
        ];
        assert!(matches!(
            decode(&table, &empty_pool(), &[]),
            Err(ClassFileError::MalformedInstruction { offset: 0, opcode: op::TABLESWITCH })
        ));

        let lookup = [
            0xAB, 0x00, 0x00, 0x00, // lookupswitch, pad to 4
            0x00, 0x00, 0x00, 0x00, // default
            0x7F, 0xFF, 0xFF, 0xFF, // npairs i32::MAX
            0xB1,
        ];
        assert!(matches!(
            decode(&lookup, &empty_pool(), &[]),
            Err(ClassFileError::MalformedInstruction { offset: 0, opcode: op::LOOKUPSWITCH })
        ));
    }

    #[test]
    fn rejects_branch_into_instruction_middle() {
        let code = [0xA7, 0x00, 0x01, 0xB1]; // goto +1 lands inside the goto
        assert!(matches!(
            decode(&code, &empty_pool(), &[]),
            Err(ClassFileError::InvalidBranchTarget(1))
        ));
    }
}
