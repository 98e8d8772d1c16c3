use super::reader::Reader;
use super::{ClassFileError, Constant, MethodHandle, Result};

#[derive(Debug, Clone)]
enum Entry {
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Unusable => "unusable",
            Entry::Utf8(_) => "Utf8",
            Entry::Integer(_) => "Integer",
            Entry::Float(_) => "Float",
            Entry::Long(_) => "Long",
            Entry::Double(_) => "Double",
            Entry::Class(_) => "Class",
            Entry::String(_) => "String",
            Entry::FieldRef { .. } => "Fieldref",
            Entry::MethodRef { .. } => "Methodref",
            Entry::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Entry::NameAndType { .. } => "NameAndType",
            Entry::MethodHandle { .. } => "MethodHandle",
            Entry::MethodType(_) => "MethodType",
            Entry::Dynamic { .. } => "Dynamic",
            Entry::InvokeDynamic { .. } => "InvokeDynamic",
            Entry::Module(_) => "Module",
            Entry::Package(_) => "Package",
        }
    }
}

/// A resolved `Fieldref`/`Methodref`/`InterfaceMethodref` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemberRefEntry {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) interface: bool,
}

#[derive(Debug)]
pub(crate) struct ConstantPool {
    entries: Vec<Entry>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Entry::Unusable);

        while entries.len() < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let len = reader.read_u2()? as usize;
                    Entry::Utf8(decode_modified_utf8(reader.read_bytes(len)?)?)
                }
                3 => Entry::Integer(reader.read_i4()?),
                4 => Entry::Float(f32::from_bits(reader.read_u4()?)),
                5 => Entry::Long(reader.read_u8()? as i64),
                6 => Entry::Double(f64::from_bits(reader.read_u8()?)),
                7 => Entry::Class(reader.read_u2()?),
                8 => Entry::String(reader.read_u2()?),
                9 => Entry::FieldRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                10 => Entry::MethodRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                11 => Entry::InterfaceMethodRef {
                    class: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                12 => Entry::NameAndType {
                    name: reader.read_u2()?,
                    descriptor: reader.read_u2()?,
                },
                15 => Entry::MethodHandle {
                    kind: reader.read_u1()?,
                    reference: reader.read_u2()?,
                },
                16 => Entry::MethodType(reader.read_u2()?),
                17 => Entry::Dynamic {
                    bootstrap: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                18 => Entry::InvokeDynamic {
                    bootstrap: reader.read_u2()?,
                    name_and_type: reader.read_u2()?,
                },
                19 => Entry::Module(reader.read_u2()?),
                20 => Entry::Package(reader.read_u2()?),
                other => return Err(ClassFileError::InvalidConstantPoolTag(other)),
            };

            let wide = matches!(entry, Entry::Long(_) | Entry::Double(_));
            entries.push(entry);
            if wide {
                entries.push(Entry::Unusable);
            }
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Entry> {
        match self.entries.get(index as usize) {
            Some(Entry::Unusable) | None => Err(ClassFileError::InvalidConstantPoolIndex(index)),
            Some(entry) => Ok(entry),
        }
    }

    fn mismatch(&self, index: u16, expected: &'static str) -> ClassFileError {
        let found = self
            .entries
            .get(index as usize)
            .map(Entry::kind)
            .unwrap_or("missing");
        ClassFileError::ConstantPoolTypeMismatch {
            index,
            expected,
            found,
        }
    }

    pub(crate) fn get_utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Entry::Utf8(s) => Ok(s),
            _ => Err(self.mismatch(index, "Utf8")),
        }
    }

    pub(crate) fn get_class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Entry::Class(name) => Ok(self.get_utf8(*name)?.to_string()),
            _ => Err(self.mismatch(index, "Class")),
        }
    }

    pub(crate) fn get_name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Entry::NameAndType { name, descriptor } => {
                Ok((self.get_utf8(*name)?, self.get_utf8(*descriptor)?))
            }
            _ => Err(self.mismatch(index, "NameAndType")),
        }
    }

    pub(crate) fn get_member_ref(&self, index: u16) -> Result<MemberRefEntry> {
        let (class, nat, interface) = match self.get(index)? {
            Entry::FieldRef {
                class,
                name_and_type,
            }
            | Entry::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            Entry::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            _ => return Err(self.mismatch(index, "Fieldref/Methodref")),
        };
        let (name, descriptor) = self.get_name_and_type(nat)?;
        Ok(MemberRefEntry {
            owner: self.get_class_name(class)?,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        })
    }

    pub(crate) fn get_method_handle(&self, index: u16) -> Result<MethodHandle> {
        match self.get(index)? {
            Entry::MethodHandle { kind, reference } => {
                let member = self.get_member_ref(*reference)?;
                Ok(MethodHandle {
                    kind: *kind,
                    owner: member.owner,
                    name: member.name,
                    descriptor: member.descriptor,
                    interface: member.interface,
                })
            }
            _ => Err(self.mismatch(index, "MethodHandle")),
        }
    }

    /// Returns `(bootstrap index, name, descriptor)` of an `InvokeDynamic` entry.
    pub(crate) fn get_invoke_dynamic(&self, index: u16) -> Result<(u16, &str, &str)> {
        match self.get(index)? {
            Entry::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                let (name, desc) = self.get_name_and_type(*name_and_type)?;
                Ok((*bootstrap, name, desc))
            }
            _ => Err(self.mismatch(index, "InvokeDynamic")),
        }
    }

    /// Resolves a loadable constant (`ldc` operand, bootstrap argument, `ConstantValue`).
    pub(crate) fn get_constant(&self, index: u16) -> Result<Constant> {
        Ok(match self.get(index)? {
            Entry::Integer(v) => Constant::Int(*v),
            Entry::Float(v) => Constant::Float(*v),
            Entry::Long(v) => Constant::Long(*v),
            Entry::Double(v) => Constant::Double(*v),
            Entry::String(s) => Constant::String(self.get_utf8(*s)?.to_string()),
            Entry::Class(name) => Constant::Class(self.get_utf8(*name)?.to_string()),
            Entry::MethodType(desc) => Constant::MethodType(self.get_utf8(*desc)?.to_string()),
            Entry::MethodHandle { .. } => Constant::MethodHandle(self.get_method_handle(index)?),
            Entry::Dynamic {
                bootstrap,
                name_and_type,
            } => {
                let (name, descriptor) = self.get_name_and_type(*name_and_type)?;
                Constant::Dynamic {
                    bootstrap: *bootstrap,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            _ => return Err(self.mismatch(index, "loadable constant")),
        })
    }
}

/// First code point of the escape range for unpaired surrogates.
///
/// A lone surrogate `u` decodes to `LONE_SURROGATE_BASE + (u - 0xD800)`, a
/// supplementary private use code point, so distinct names stay distinct.
pub(crate) const LONE_SURROGATE_BASE: u32 = 0xF0000;

/// Decodes the JVM's modified UTF-8 (2-byte NUL, CESU-8 surrogate pairs).
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if !bytes.iter().any(|b| matches!(*b, 0x00 | 0xC0 | 0xED))
        && let Ok(s) = std::str::from_utf8(bytes)
    {
        return Ok(s.to_string());
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u32;
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return Err(ClassFileError::InvalidModifiedUtf8);
            }
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes.get(i + 1).ok_or(ClassFileError::InvalidModifiedUtf8)? as u32;
            if b1 & 0xC0 != 0x80 {
                return Err(ClassFileError::InvalidModifiedUtf8);
            }
            units.push((((b0 & 0x1F) << 6) | (b1 & 0x3F)) as u16);
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = *bytes.get(i + 1).ok_or(ClassFileError::InvalidModifiedUtf8)? as u32;
            let b2 = *bytes.get(i + 2).ok_or(ClassFileError::InvalidModifiedUtf8)? as u32;
            if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                return Err(ClassFileError::InvalidModifiedUtf8);
            }
            units.push((((b0 & 0x0F) << 12) | ((b1 & 0x3F) << 6) | (b2 & 0x3F)) as u16);
            i += 3;
        } else {
            return Err(ClassFileError::InvalidModifiedUtf8);
        }
    }

    Ok(char::decode_utf16(units)
        .map(|c| {
            c.unwrap_or_else(|e| {
                let escaped = LONE_SURROGATE_BASE + (e.unpaired_surrogate() as u32 - 0xD800);
                char::from_u32(escaped).unwrap_or(char::REPLACEMENT_CHARACTER)
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_and_modified_utf8() {
        assert_eq!(decode_modified_utf8(b"java/lang/Object").unwrap(), "java/lang/Object");
        assert_eq!(decode_modified_utf8(&[0x61, 0xC0, 0x80, 0x62]).unwrap(), "a\0b");
        // U+1F600 encoded as a CESU-8 surrogate pair
        let smiley = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&smiley).unwrap(), "\u{1F600}");
        assert!(decode_modified_utf8(&[0x00]).is_err());
        assert!(decode_modified_utf8(&[0x61, 0x00, 0x62]).is_err());
    }

    #[test]
    fn keeps_unpaired_surrogates_distinct() {
        // high surrogate U+D83D alone, then low surrogate U+DE00 alone
        let high = decode_modified_utf8(&[0x61, 0xED, 0xA0, 0xBD, 0x62]).unwrap();
        let low = decode_modified_utf8(&[0x61, 0xED, 0xB8, 0x80, 0x62]).unwrap();
        assert_eq!(high, "a\u{F003D}b");
        assert_eq!(low, "a\u{F0600}b");
        assert_ne!(high, low);
        // a low surrogate before a high one is not a pair
        let swapped = decode_modified_utf8(&[0xED, 0xB8, 0x80, 0xED, 0xA0, 0xBD]).unwrap();
        assert_eq!(swapped.chars().count(), 2);
    }

    #[test]
    fn parses_pool_with_wide_entries() {
        // count=5: #1 Long (takes #1,#2), #3 Utf8 "A", #4 Class #3
        let bytes = [
            0x00, 0x05, 5, 0, 0, 0, 0, 0, 0, 0, 7, 1, 0x00, 0x01, b'A', 7, 0x00, 0x03,
        ];
        let mut reader = Reader::new(&bytes);
        let cp = ConstantPool::parse(&mut reader).unwrap();
        assert!(matches!(cp.get_constant(1).unwrap(), Constant::Long(7)));
        assert!(matches!(
            cp.get_utf8(2),
            Err(ClassFileError::InvalidConstantPoolIndex(2))
        ));
        assert_eq!(cp.get_class_name(4).unwrap(), "A");
        assert!(matches!(
            cp.get_class_name(3),
            Err(ClassFileError::ConstantPoolTypeMismatch { index: 3, .. })
        ));
    }
}
