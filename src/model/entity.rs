use std::collections::BTreeSet;
use std::sync::Arc;

use super::{ClassId, FieldId, GroupId, MethodId, Names, Number, Side, VarId};
use crate::classfile::{ClassFile, access};

/// A reference type, array type, primitive or placeholder.
#[derive(Debug, Clone)]
pub struct ClassEntity {
    /// Type descriptor, unique per side (`Lpkg/Cls;`, `[I`, `I`).
    pub(crate) id: String,
    /// Internal name (`pkg/Cls`); equal to the descriptor for arrays and primitives.
    pub(crate) name: String,
    pub(crate) side: Side,
    pub(crate) access: u16,
    pub(crate) input: bool,
    pub(crate) body: Option<Arc<ClassFile>>,
    pub(crate) name_obfuscated: bool,
    pub(crate) element: Option<ClassId>,
    pub(crate) dims: usize,
    pub(crate) super_class: Option<ClassId>,
    pub(crate) interfaces: BTreeSet<ClassId>,
    pub(crate) children: BTreeSet<ClassId>,
    pub(crate) implementers: BTreeSet<ClassId>,
    pub(crate) outer: Option<ClassId>,
    pub(crate) inner: BTreeSet<ClassId>,
    pub(crate) arrays: Vec<ClassId>,
    pub(crate) methods: Vec<MethodId>,
    pub(crate) fields: Vec<FieldId>,
    /// Methods whose signature or body references this type.
    pub(crate) method_type_refs: BTreeSet<MethodId>,
    /// Fields declared with this type.
    pub(crate) field_type_refs: BTreeSet<FieldId>,
    pub(crate) strings: BTreeSet<String>,
    pub(crate) numbers: BTreeSet<Number>,
    pub(crate) names: Names,
}

impl ClassEntity {
    pub(crate) fn new(id: String, name: String, side: Side) -> Self {
        Self {
            id,
            name,
            side,
            access: 0,
            input: false,
            body: None,
            name_obfuscated: false,
            element: None,
            dims: 0,
            super_class: None,
            interfaces: BTreeSet::new(),
            children: BTreeSet::new(),
            implementers: BTreeSet::new(),
            outer: None,
            inner: BTreeSet::new(),
            arrays: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            method_type_refs: BTreeSet::new(),
            field_type_refs: BTreeSet::new(),
            strings: BTreeSet::new(),
            numbers: BTreeSet::new(),
            names: Names::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn access(&self) -> u16 {
        self.access
    }

    pub fn is_input(&self) -> bool {
        self.input
    }

    /// Whether a parsed body backs this class (as opposed to a synthetic placeholder).
    pub fn is_real(&self) -> bool {
        self.body.is_some()
    }

    pub fn body(&self) -> Option<&ClassFile> {
        self.body.as_deref()
    }

    pub fn is_array(&self) -> bool {
        self.dims > 0
    }

    pub fn array_dimensions(&self) -> usize {
        self.dims
    }

    pub fn element(&self) -> Option<ClassId> {
        self.element
    }

    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    pub fn is_name_obfuscated(&self) -> bool {
        self.name_obfuscated
    }

    pub fn super_class(&self) -> Option<ClassId> {
        self.super_class
    }

    pub fn interfaces(&self) -> &BTreeSet<ClassId> {
        &self.interfaces
    }

    pub fn children(&self) -> &BTreeSet<ClassId> {
        &self.children
    }

    pub fn implementers(&self) -> &BTreeSet<ClassId> {
        &self.implementers
    }

    pub fn outer(&self) -> Option<ClassId> {
        self.outer
    }

    pub fn inner(&self) -> &BTreeSet<ClassId> {
        &self.inner
    }

    pub fn arrays(&self) -> &[ClassId] {
        &self.arrays
    }

    pub fn methods(&self) -> &[MethodId] {
        &self.methods
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    pub fn strings(&self) -> &BTreeSet<String> {
        &self.strings
    }

    pub fn numbers(&self) -> &BTreeSet<Number> {
        &self.numbers
    }

    pub fn names(&self) -> &Names {
        &self.names
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum MethodKind {
    Constructor,
    ClassInit,
    LambdaImpl,
    Other,
}

/// Resolved target of an instruction operand, parallel to a method's instruction list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InsnTarget {
    None,
    Class(ClassId),
    Method(MethodId),
    Field(FieldId),
}

#[derive(Debug, Clone)]
pub struct MethodEntity {
    pub(crate) owner: ClassId,
    pub(crate) name: String,
    pub(crate) desc: String,
    pub(crate) access: u16,
    /// Index into the owner body's method list; `None` for synthetic placeholders.
    pub(crate) body_index: Option<usize>,
    pub(crate) name_obfuscated: bool,
    pub(crate) kind: MethodKind,
    pub(crate) group: GroupId,
    pub(crate) parents: BTreeSet<MethodId>,
    pub(crate) children: BTreeSet<MethodId>,
    pub(crate) ret_type: ClassId,
    pub(crate) args: Vec<VarId>,
    pub(crate) vars: Vec<VarId>,
    pub(crate) refs_in: BTreeSet<MethodId>,
    pub(crate) refs_out: BTreeSet<MethodId>,
    /// Callers reaching this method only through a lambda factory call site.
    pub(crate) lambda_refs_in: BTreeSet<MethodId>,
    pub(crate) direct_refs_in: BTreeSet<MethodId>,
    pub(crate) field_reads: BTreeSet<FieldId>,
    pub(crate) field_writes: BTreeSet<FieldId>,
    pub(crate) class_refs: BTreeSet<ClassId>,
    pub(crate) strings: BTreeSet<String>,
    pub(crate) numbers: BTreeSet<Number>,
    pub(crate) insn_targets: Vec<InsnTarget>,
    pub(crate) position: usize,
    pub(crate) names: Names,
}

impl MethodEntity {
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Name plus descriptor, unique within the owner.
    pub fn id(&self) -> String {
        format!("{}{}", self.name, self.desc)
    }

    pub fn access(&self) -> u16 {
        self.access
    }

    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    pub fn is_private(&self) -> bool {
        self.access & access::PRIVATE != 0
    }

    pub fn is_real(&self) -> bool {
        self.body_index.is_some()
    }

    pub fn is_name_obfuscated(&self) -> bool {
        self.name_obfuscated
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn parents(&self) -> &BTreeSet<MethodId> {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<MethodId> {
        &self.children
    }

    pub fn ret_type(&self) -> ClassId {
        self.ret_type
    }

    pub fn args(&self) -> &[VarId] {
        &self.args
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    pub fn refs_in(&self) -> &BTreeSet<MethodId> {
        &self.refs_in
    }

    pub fn refs_out(&self) -> &BTreeSet<MethodId> {
        &self.refs_out
    }

    pub fn field_reads(&self) -> &BTreeSet<FieldId> {
        &self.field_reads
    }

    pub fn field_writes(&self) -> &BTreeSet<FieldId> {
        &self.field_writes
    }

    pub fn class_refs(&self) -> &BTreeSet<ClassId> {
        &self.class_refs
    }

    pub fn strings(&self) -> &BTreeSet<String> {
        &self.strings
    }

    pub fn numbers(&self) -> &BTreeSet<Number> {
        &self.numbers
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn names(&self) -> &Names {
        &self.names
    }

    /// Barrier methods never share a virtual dispatch slot with other methods.
    pub fn is_barrier(&self) -> bool {
        self.is_private() || self.is_static() || self.name.starts_with('<')
    }
}

/// Constant a field is initialized with, detected from `<clinit>` or `ConstantValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initializer {
    Number(Number),
    String(String),
    Class(ClassId),
}

#[derive(Debug, Clone)]
pub struct FieldEntity {
    pub(crate) owner: ClassId,
    pub(crate) name: String,
    pub(crate) desc: String,
    pub(crate) access: u16,
    pub(crate) body_index: Option<usize>,
    pub(crate) name_obfuscated: bool,
    pub(crate) field_type: ClassId,
    pub(crate) read_refs: BTreeSet<MethodId>,
    pub(crate) write_refs: BTreeSet<MethodId>,
    pub(crate) initializer: Option<Initializer>,
    pub(crate) position: usize,
    pub(crate) names: Names,
}

impl FieldEntity {
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn id(&self) -> String {
        format!("{};;{}", self.name, self.desc)
    }

    pub fn access(&self) -> u16 {
        self.access
    }

    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    pub fn is_real(&self) -> bool {
        self.body_index.is_some()
    }

    pub fn is_name_obfuscated(&self) -> bool {
        self.name_obfuscated
    }

    pub fn field_type(&self) -> ClassId {
        self.field_type
    }

    pub fn read_refs(&self) -> &BTreeSet<MethodId> {
        &self.read_refs
    }

    pub fn write_refs(&self) -> &BTreeSet<MethodId> {
        &self.write_refs
    }

    pub fn initializer(&self) -> Option<&Initializer> {
        self.initializer.as_ref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn names(&self) -> &Names {
        &self.names
    }
}

/// A method argument or local variable.
#[derive(Debug, Clone)]
pub struct VarEntity {
    pub(crate) method: MethodId,
    pub(crate) is_arg: bool,
    /// Position within the owner's args or vars list.
    pub(crate) index: usize,
    pub(crate) lv_index: u16,
    /// Valid byte-offset interval `[start, end)` within the owner's code.
    pub(crate) start: u32,
    pub(crate) end: u32,
    pub(crate) var_type: ClassId,
    pub(crate) orig_name: Option<String>,
    pub(crate) name_obfuscated: bool,
    pub(crate) names: Names,
}

impl VarEntity {
    pub fn method(&self) -> MethodId {
        self.method
    }

    pub fn is_arg(&self) -> bool {
        self.is_arg
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn lv_index(&self) -> u16 {
        self.lv_index
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn var_type(&self) -> ClassId {
        self.var_type
    }

    pub fn orig_name(&self) -> Option<&str> {
        self.orig_name.as_deref()
    }

    pub fn is_name_obfuscated(&self) -> bool {
        self.name_obfuscated
    }

    pub fn names(&self) -> &Names {
        &self.names
    }

    /// Whether this variable occupies `slot` at byte offset `offset`.
    pub fn covers(&self, slot: u16, offset: u32) -> bool {
        self.lv_index == slot && offset >= self.start && offset < self.end
    }

    /// Plain display name: the local variable table name or a kind-prefixed index.
    pub fn plain_name(&self) -> String {
        match &self.orig_name {
            Some(name) => name.clone(),
            None if self.is_arg => format!("arg{}", self.index),
            None => format!("var{}", self.index),
        }
    }
}
