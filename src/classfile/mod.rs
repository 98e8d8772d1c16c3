//! Binary class-file parsing.
//!
//! Only the parts the matcher consumes are materialized: the class header,
//! member declarations, decoded method bodies, local variable tables, constant
//! field values, nesting information and bootstrap methods. Unknown attributes
//! are skipped.

mod constant_pool;
pub mod descriptor;
pub mod insn;
mod reader;

use thiserror::Error;

use self::constant_pool::ConstantPool;
use self::reader::Reader;

pub use self::insn::{DynamicCall, Insn, MemberRef, Operand};

pub type Result<T> = std::result::Result<T, ClassFileError>;

#[derive(Debug, Error)]
pub enum ClassFileError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid classfile magic: 0x{0:08x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool index: {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("invalid constant pool tag: {0}")]
    InvalidConstantPoolTag(u8),
    #[error("constant pool type mismatch at index {index}: expected {expected}, found {found}")]
    ConstantPoolTypeMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid modified UTF-8 constant")]
    InvalidModifiedUtf8,
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("malformed {0} attribute")]
    MalformedAttribute(&'static str),
    #[error("malformed instruction 0x{opcode:02x} at offset {offset}")]
    MalformedInstruction { offset: u32, opcode: u8 },
    #[error("branch target {0} is not an instruction boundary")]
    InvalidBranchTarget(i64),
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const VOLATILE: u16 = 0x0040;
    pub const BRIDGE: u16 = 0x0040;
    pub const TRANSIENT: u16 = 0x0080;
    pub const VARARGS: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    /// Internal name or array descriptor.
    Class(String),
    MethodType(String),
    MethodHandle(MethodHandle),
    Dynamic {
        bootstrap: u16,
        name: String,
        descriptor: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodHandle {
    pub kind: u8,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub interface: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapMethod {
    pub handle: MethodHandle,
    pub args: Vec<Constant>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub inner_classes: Vec<InnerClassInfo>,
    /// Enclosing class from an `EnclosingMethod` attribute (local/anonymous classes).
    pub enclosing_class: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub constant_value: Option<Constant>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub code: Option<Code>,
}

#[derive(Debug, Clone)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_length: u32,
    pub insns: Vec<Insn>,
    pub handlers: Vec<ExceptionHandler>,
    pub local_vars: Vec<LocalVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u32,
    pub length: u32,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassInfo {
    pub inner_class: String,
    pub outer_class: Option<String>,
    pub inner_name: Option<String>,
    pub access_flags: u16,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = cp.get_class_name(reader.read_u2()?)?;
        let super_class = match reader.read_u2()? {
            0 => None,
            idx => Some(cp.get_class_name(idx)?),
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(cp.get_class_name(reader.read_u2()?)?);
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            let (header, attrs) = parse_member(&mut reader, &cp)?;
            fields.push(FieldInfo {
                access_flags: header.access_flags,
                name: header.name,
                descriptor: header.descriptor,
                signature: attrs.signature,
                constant_value: attrs.constant_value,
            });
        }

        // method bodies need the class-level BootstrapMethods table, which comes last
        let methods_count = reader.read_u2()? as usize;
        let mut raw_methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            raw_methods.push(parse_member(&mut reader, &cp)?);
        }

        let class_attrs = parse_attributes(&mut reader, &cp)?;
        reader.ensure_empty()?;

        let mut methods = Vec::with_capacity(raw_methods.len());
        for (header, attrs) in raw_methods {
            let code = match attrs.code {
                Some(raw) => Some(parse_code(raw, &cp, &class_attrs.bootstrap_methods)?),
                None => None,
            };
            methods.push(MethodInfo {
                access_flags: header.access_flags,
                name: header.name,
                descriptor: header.descriptor,
                signature: attrs.signature,
                exceptions: attrs.exceptions,
                code,
            });
        }

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            signature: class_attrs.signature,
            source_file: class_attrs.source_file,
            inner_classes: class_attrs.inner_classes,
            enclosing_class: class_attrs.enclosing_class,
        })
    }

    /// Folds another body of the same class into this one.
    ///
    /// Used when one class is split across several input archives: the header
    /// of the first body wins, members and interfaces missing here are appended.
    pub fn merge(&mut self, other: ClassFile) {
        for itf in other.interfaces {
            if !self.interfaces.contains(&itf) {
                self.interfaces.push(itf);
            }
        }
        for field in other.fields {
            let exists = self
                .fields
                .iter()
                .any(|f| f.name == field.name && f.descriptor == field.descriptor);
            if !exists {
                self.fields.push(field);
            }
        }
        for method in other.methods {
            let exists = self
                .methods
                .iter()
                .any(|m| m.name == method.name && m.descriptor == method.descriptor);
            if !exists {
                self.methods.push(method);
            }
        }
        for inner in other.inner_classes {
            if !self.inner_classes.contains(&inner) {
                self.inner_classes.push(inner);
            }
        }
        if self.enclosing_class.is_none() {
            self.enclosing_class = other.enclosing_class;
        }
    }

    /// Outer class of this class, from `EnclosingMethod` or its own `InnerClasses` entry.
    pub fn outer_class(&self) -> Option<&str> {
        if let Some(enclosing) = self.enclosing_class.as_deref() {
            return Some(enclosing);
        }
        self.inner_classes
            .iter()
            .find(|ic| ic.inner_class == self.this_class)
            .and_then(|ic| ic.outer_class.as_deref())
    }
}

struct MemberHeader {
    access_flags: u16,
    name: String,
    descriptor: String,
}

struct RawCode<'a> {
    max_stack: u16,
    max_locals: u16,
    code: &'a [u8],
    tail: Reader<'a>,
}

#[derive(Default)]
struct ParsedAttributes<'a> {
    signature: Option<String>,
    source_file: Option<String>,
    constant_value: Option<Constant>,
    exceptions: Vec<String>,
    code: Option<RawCode<'a>>,
    inner_classes: Vec<InnerClassInfo>,
    enclosing_class: Option<String>,
    bootstrap_methods: Vec<BootstrapMethod>,
}

fn parse_member<'a>(
    reader: &mut Reader<'a>,
    cp: &ConstantPool,
) -> Result<(MemberHeader, ParsedAttributes<'a>)> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
    let attrs = parse_attributes(reader, cp)?;
    Ok((
        MemberHeader {
            access_flags,
            name,
            descriptor,
        },
        attrs,
    ))
}

fn parse_attributes<'a>(reader: &mut Reader<'a>, cp: &ConstantPool) -> Result<ParsedAttributes<'a>> {
    let attributes_count = reader.read_u2()? as usize;
    let mut parsed = ParsedAttributes::default();
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let name = cp.get_utf8(name_index)?;

        let mut sub = Reader::new(info);
        match name {
            "Signature" => {
                parsed.signature = Some(cp.get_utf8(sub.read_u2()?)?.to_string());
                sub.ensure_empty()?;
            }
            "SourceFile" => {
                parsed.source_file = Some(cp.get_utf8(sub.read_u2()?)?.to_string());
                sub.ensure_empty()?;
            }
            "ConstantValue" => {
                parsed.constant_value = Some(cp.get_constant(sub.read_u2()?)?);
                sub.ensure_empty()?;
            }
            "Exceptions" => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    parsed.exceptions.push(cp.get_class_name(sub.read_u2()?)?);
                }
                sub.ensure_empty()?;
            }
            "Code" => {
                let max_stack = sub.read_u2()?;
                let max_locals = sub.read_u2()?;
                let code_length = sub.read_u4()? as usize;
                let code = sub.read_bytes(code_length)?;
                parsed.code = Some(RawCode {
                    max_stack,
                    max_locals,
                    code,
                    tail: sub,
                });
            }
            "InnerClasses" => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    let inner_class = cp.get_class_name(sub.read_u2()?)?;
                    let outer_class = match sub.read_u2()? {
                        0 => None,
                        idx => Some(cp.get_class_name(idx)?),
                    };
                    let inner_name = match sub.read_u2()? {
                        0 => None,
                        idx => Some(cp.get_utf8(idx)?.to_string()),
                    };
                    let access_flags = sub.read_u2()?;
                    parsed.inner_classes.push(InnerClassInfo {
                        inner_class,
                        outer_class,
                        inner_name,
                        access_flags,
                    });
                }
                sub.ensure_empty()?;
            }
            "EnclosingMethod" => {
                parsed.enclosing_class = Some(cp.get_class_name(sub.read_u2()?)?);
                sub.read_u2()?;
                sub.ensure_empty()?;
            }
            "BootstrapMethods" => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    let handle = cp.get_method_handle(sub.read_u2()?)?;
                    let argc = sub.read_u2()? as usize;
                    let mut args = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        args.push(cp.get_constant(sub.read_u2()?)?);
                    }
                    parsed.bootstrap_methods.push(BootstrapMethod { handle, args });
                }
                sub.ensure_empty()?;
            }
            _ => {}
        }
    }

    Ok(parsed)
}

fn parse_code(raw: RawCode<'_>, cp: &ConstantPool, bootstraps: &[BootstrapMethod]) -> Result<Code> {
    let insns = insn::decode(raw.code, cp, bootstraps)?;
    let mut tail = raw.tail;

    let handler_count = tail.read_u2()? as usize;
    let mut handlers = Vec::with_capacity(handler_count);
    for _ in 0..handler_count {
        let start_pc = tail.read_u2()?;
        let end_pc = tail.read_u2()?;
        let handler_pc = tail.read_u2()?;
        let catch_type = match tail.read_u2()? {
            0 => None,
            idx => Some(cp.get_class_name(idx)?),
        };
        handlers.push(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        });
    }

    let mut local_vars = Vec::new();
    let attr_count = tail.read_u2()? as usize;
    for _ in 0..attr_count {
        let name = cp.get_utf8(tail.read_u2()?)?;
        let length = tail.read_u4()? as usize;
        let info = tail.read_bytes(length)?;
        if name != "LocalVariableTable" {
            continue;
        }
        let mut sub = Reader::new(info);
        let num = sub.read_u2()? as usize;
        for _ in 0..num {
            local_vars.push(LocalVariable {
                start_pc: sub.read_u2()? as u32,
                length: sub.read_u2()? as u32,
                name: cp.get_utf8(sub.read_u2()?)?.to_string(),
                descriptor: cp.get_utf8(sub.read_u2()?)?.to_string(),
                index: sub.read_u2()?,
            });
        }
        sub.ensure_empty()
            .map_err(|_| ClassFileError::MalformedAttribute("LocalVariableTable"))?;
    }
    tail.ensure_empty()
        .map_err(|_| ClassFileError::MalformedAttribute("Code"))?;

    Ok(Code {
        max_stack: raw.max_stack,
        max_locals: raw.max_locals,
        code_length: raw.code.len() as u32,
        insns,
        handlers,
        local_vars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let err = ClassFile::parse(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap_err();
        assert!(matches!(err, ClassFileError::InvalidMagic(0xDEADBEEF)));
    }

    #[test]
    fn rejects_truncated_input() {
        let err = ClassFile::parse(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00]).unwrap_err();
        assert!(matches!(err, ClassFileError::UnexpectedEof));
    }

    #[test]
    fn merge_appends_missing_members_only() {
        let mut base = crate::testkit::ClassBuilder::new("a/A")
            .method("x", "()V", 0, |_| {})
            .build();
        let other = crate::testkit::ClassBuilder::new("a/A")
            .interface("a/I")
            .method("x", "()V", 0, |_| {})
            .method("y", "()V", 0, |_| {})
            .field("f", "I", 0)
            .build();
        base.merge(other);
        assert_eq!(base.methods.len(), 2);
        assert_eq!(base.fields.len(), 1);
        assert_eq!(base.interfaces, vec!["a/I".to_string()]);
    }
}
