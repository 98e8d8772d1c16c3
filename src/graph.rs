//! Arena of class, member and variable entities for both sides plus the shared side.
//!
//! Classes are keyed per side by type descriptor and kept in insertion order so
//! every pass over the graph is reproducible. Classpath archives are indexed by
//! name only; their bodies are parsed the first time a class is referenced.

use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::archive::{self, ClassLocation};
use crate::classfile::{ClassFile, Code, Insn, access, descriptor};
use crate::error::LoadError;
use crate::model::{
    ClassEntity, ClassId, EntityRef, FieldEntity, FieldId, GroupId, InsnTarget, MethodEntity,
    MethodId, MethodKind, NameType, Names, Number, Side, VarEntity, VarId,
};

const PLATFORM_PREFIXES: [&str; 4] = ["java/", "javax/", "jdk/", "sun/"];

/// Per-side patterns selecting names that are *not* obfuscated.
///
/// Patterns must match the whole name. A side without a pattern treats every
/// name as obfuscated.
#[derive(Debug, Clone, Default)]
pub struct NamePatterns {
    class: [Option<Regex>; 2],
    member: [Option<Regex>; 2],
}

impl NamePatterns {
    pub fn new(
        class_a: Option<&str>,
        member_a: Option<&str>,
        class_b: Option<&str>,
        member_b: Option<&str>,
    ) -> Result<Self, LoadError> {
        Ok(Self {
            class: [compile(class_a, "class")?, compile(class_b, "class")?],
            member: [compile(member_a, "member")?, compile(member_b, "member")?],
        })
    }

    fn class_obfuscated(&self, side: Side, name: &str) -> bool {
        is_obfuscated(&self.class, side, name)
    }

    fn member_obfuscated(&self, side: Side, name: &str) -> bool {
        is_obfuscated(&self.member, side, name)
    }
}

fn compile(pattern: Option<&str>, what: &'static str) -> Result<Option<Regex>, LoadError> {
    pattern
        .map(|p| Regex::new(&format!("^(?:{p})$")).map_err(|source| LoadError::Pattern { what, source }))
        .transpose()
}

fn is_obfuscated(patterns: &[Option<Regex>; 2], side: Side, name: &str) -> bool {
    match side {
        Side::Shared => false,
        _ => patterns[side.slot()]
            .as_ref()
            .is_none_or(|re| !re.is_match(name)),
    }
}

#[derive(Debug, Default)]
pub struct ClassGraph {
    pub(crate) classes: Vec<ClassEntity>,
    pub(crate) methods: Vec<MethodEntity>,
    pub(crate) fields: Vec<FieldEntity>,
    pub(crate) vars: Vec<VarEntity>,
    pub(crate) groups: Vec<Vec<MethodId>>,
    by_id: [HashMap<String, ClassId>; 3],
    order: [Vec<ClassId>; 3],
    classpath: [HashMap<String, ClassLocation>; 2],
    patterns: NamePatterns,
    pending: VecDeque<ClassId>,
}

impl ClassGraph {
    pub fn new(patterns: NamePatterns) -> Self {
        Self {
            patterns,
            ..Self::default()
        }
    }

    pub fn class(&self, id: ClassId) -> &ClassEntity {
        &self.classes[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &MethodEntity {
        &self.methods[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldEntity {
        &self.fields[id.index()]
    }

    pub fn var(&self, id: VarId) -> &VarEntity {
        &self.vars[id.index()]
    }

    /// Classes of one side in insertion order, including arrays and placeholders.
    pub fn classes(&self, side: Side) -> &[ClassId] {
        &self.order[side.slot()]
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    /// All methods sharing a virtual dispatch slot with the group's members.
    pub fn group(&self, id: GroupId) -> &[MethodId] {
        &self.groups[id.index()]
    }

    pub fn method_side(&self, id: MethodId) -> Side {
        self.class(self.method(id).owner).side
    }

    pub fn field_side(&self, id: FieldId) -> Side {
        self.class(self.field(id).owner).side
    }

    pub fn var_side(&self, id: VarId) -> Side {
        self.method_side(self.var(id).method)
    }

    /// Finds a class by descriptor on `side`, falling back to the shared side.
    pub fn lookup(&self, side: Side, desc: &str) -> Option<ClassId> {
        self.by_id[side.slot()]
            .get(desc)
            .or_else(|| self.by_id[Side::Shared.slot()].get(desc))
            .copied()
    }

    pub fn method_by_id(&self, class: ClassId, name: &str, desc: &str) -> Option<MethodId> {
        self.class(class)
            .methods
            .iter()
            .copied()
            .find(|m| {
                let m = self.method(*m);
                m.name == name && m.desc == desc
            })
    }

    pub fn field_by_id(&self, class: ClassId, name: &str, desc: &str) -> Option<FieldId> {
        self.class(class)
            .fields
            .iter()
            .copied()
            .find(|f| {
                let f = self.field(*f);
                f.name == name && f.desc == desc
            })
    }

    pub fn code(&self, method: MethodId) -> Option<&Code> {
        let m = self.method(method);
        let body = self.class(m.owner).body.as_deref()?;
        body.methods.get(m.body_index?)?.code.as_ref()
    }

    pub fn insns(&self, method: MethodId) -> &[Insn] {
        self.code(method).map(|c| c.insns.as_slice()).unwrap_or(&[])
    }

    /// Real methods of a class in declaration order.
    pub fn real_methods(&self, class: ClassId) -> impl Iterator<Item = MethodId> + '_ {
        self.class(class)
            .methods
            .iter()
            .copied()
            .filter(|m| self.method(*m).is_real())
    }

    pub fn real_fields(&self, class: ClassId) -> impl Iterator<Item = FieldId> + '_ {
        self.class(class)
            .fields
            .iter()
            .copied()
            .filter(|f| self.field(*f).is_real())
    }

    /// Argument or local variable occupying `slot` around instruction offset `offset`.
    ///
    /// Stores start a variable's lifetime at the following instruction, so
    /// `next_offset` is accepted as the start bound as well.
    pub fn var_at(&self, method: MethodId, slot: u16, offset: u32, next_offset: u32) -> Option<VarId> {
        let m = self.method(method);
        m.args
            .iter()
            .chain(m.vars.iter())
            .copied()
            .find(|v| {
                let var = self.var(*v);
                var.lv_index == slot && var.start <= next_offset && offset < var.end
            })
    }

    pub(crate) fn set_classpath_index(&mut self, side: Side, index: HashMap<String, ClassLocation>) {
        if side != Side::Shared {
            self.classpath[side.slot()] = index;
        }
    }

    /// Adds a parsed class body; members are created once the pending queue is drained.
    pub(crate) fn add_class(&mut self, side: Side, body: ClassFile, input: bool) -> ClassId {
        let desc = descriptor::internal_name_to_descriptor(&body.this_class);
        debug_assert!(!self.by_id[side.slot()].contains_key(&desc));

        let mut class = ClassEntity::new(desc.clone(), body.this_class.clone(), side);
        class.access = body.access_flags;
        class.input = input;
        class.name_obfuscated = input && self.patterns.class_obfuscated(side, &body.this_class);
        class.body = Some(Arc::new(body));

        let id = self.insert_class(side, desc, class);
        self.pending.push_back(id);
        id
    }

    fn insert_class(&mut self, side: Side, desc: String, class: ClassEntity) -> ClassId {
        let id = ClassId::new(self.classes.len());
        self.classes.push(class);
        self.by_id[side.slot()].insert(desc, id);
        self.order[side.slot()].push(id);
        id
    }

    /// Resolves a type descriptor (`I`, `Lpkg/Cls;`, `[[Lpkg/Cls;`) seen from `side`.
    pub(crate) fn resolve_class(&mut self, side: Side, desc: &str) -> Result<ClassId, LoadError> {
        if desc.starts_with('[') {
            let (dims, element) = descriptor::array_element(desc);
            let element = self.resolve_class(side, element)?;
            return Ok(self.array_of(element, dims));
        }

        if descriptor::is_primitive(desc) {
            return Ok(self.placeholder(Side::Shared, desc, desc));
        }

        match desc.strip_prefix('L').and_then(|d| d.strip_suffix(';')) {
            Some(name) if !name.is_empty() => self.resolve_named(side, name),
            _ => Err(LoadError::InvalidDescriptor {
                class: side.label().to_string(),
                descriptor: desc.to_string(),
            }),
        }
    }

    /// Resolves an internal name as found in `CONSTANT_Class` entries (may be an array descriptor).
    pub(crate) fn resolve_internal(&mut self, side: Side, name: &str) -> Result<ClassId, LoadError> {
        if name.starts_with('[') {
            self.resolve_class(side, name)
        } else {
            self.resolve_named(side, name)
        }
    }

    fn resolve_named(&mut self, side: Side, name: &str) -> Result<ClassId, LoadError> {
        let desc = format!("L{name};");
        if let Some(id) = self.by_id[side.slot()].get(&desc) {
            return Ok(*id);
        }

        if side != Side::Shared {
            if let Some(id) = self.by_id[Side::Shared.slot()].get(&desc)
                && self.class(*id).is_real()
            {
                return Ok(*id);
            }

            if let Some(location) = self.classpath[side.slot()].remove(name) {
                let bytes = archive::read_entry(&location).map_err(|source| LoadError::Archive {
                    path: location.archive.clone(),
                    source,
                })?;
                let body = ClassFile::parse(&bytes).map_err(|source| LoadError::ClassFile {
                    path: location.archive.clone(),
                    entry: location.entry.clone(),
                    source,
                })?;
                tracing::trace!(side = %side, class = name, "loaded classpath class");
                return Ok(self.add_class(side, body, false));
            }
        }

        if side == Side::Shared || PLATFORM_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return Ok(self.placeholder(Side::Shared, &desc, name));
        }

        Ok(self.placeholder(side, &desc, name))
    }

    fn placeholder(&mut self, side: Side, desc: &str, name: &str) -> ClassId {
        if let Some(id) = self.by_id[side.slot()].get(desc) {
            return *id;
        }
        let class = ClassEntity::new(desc.to_string(), name.to_string(), side);
        self.insert_class(side, desc.to_string(), class)
    }

    /// Array class with `dims` dimensions over `element`, created on the element's side.
    pub(crate) fn array_of(&mut self, element: ClassId, dims: usize) -> ClassId {
        let side = self.class(element).side;
        let desc = format!("{}{}", "[".repeat(dims), self.class(element).id);
        if let Some(id) = self.by_id[side.slot()].get(&desc) {
            return *id;
        }

        let mut class = ClassEntity::new(desc.clone(), desc.clone(), side);
        class.element = Some(element);
        class.dims = dims;
        class.name_obfuscated = self.class(element).name_obfuscated;
        let id = self.insert_class(side, desc, class);
        self.classes[element.index()].arrays.push(id);
        id
    }

    /// Links headers and creates members of every class added since the last drain.
    pub(crate) fn drain_pending(&mut self) -> Result<(), LoadError> {
        while let Some(class) = self.pending.pop_front() {
            self.link_class(class)?;
        }
        Ok(())
    }

    fn link_class(&mut self, class: ClassId) -> Result<(), LoadError> {
        let Some(body) = self.class(class).body.clone() else {
            return Ok(());
        };
        let side = self.class(class).side;

        if let Some(super_name) = body.super_class.as_deref() {
            let sup = self.resolve_internal(side, super_name)?;
            self.classes[class.index()].super_class = Some(sup);
            self.classes[sup.index()].children.insert(class);
        }

        for itf in &body.interfaces {
            let itf = self.resolve_internal(side, itf)?;
            self.classes[class.index()].interfaces.insert(itf);
            self.classes[itf.index()].implementers.insert(class);
        }

        if let Some(outer) = body.outer_class()
            && outer != body.this_class
        {
            let outer = self.resolve_internal(side, outer)?;
            self.classes[class.index()].outer = Some(outer);
            self.classes[outer.index()].inner.insert(class);
        }

        for (index, method) in body.methods.iter().enumerate() {
            self.add_method(class, &method.name, &method.descriptor, method.access_flags, Some(index))?;
        }

        for (index, field) in body.fields.iter().enumerate() {
            self.add_field(class, &field.name, &field.descriptor, field.access_flags, Some(index))?;
            match &field.constant_value {
                Some(crate::classfile::Constant::String(s)) => {
                    self.classes[class.index()].strings.insert(s.clone());
                }
                Some(constant) => {
                    if let Some(n) = number_of(constant) {
                        self.classes[class.index()].numbers.insert(n);
                    }
                }
                None => {}
            }
        }

        Ok(())
    }

    fn invalid_descriptor(&self, class: ClassId, desc: &str) -> LoadError {
        LoadError::InvalidDescriptor {
            class: self.class(class).name.clone(),
            descriptor: desc.to_string(),
        }
    }

    pub(crate) fn add_method(
        &mut self,
        owner: ClassId,
        name: &str,
        desc: &str,
        access_flags: u16,
        body_index: Option<usize>,
    ) -> Result<MethodId, LoadError> {
        let side = self.class(owner).side;
        let (arg_descs, ret_desc) = descriptor::split_method_descriptor(desc)
            .map_err(|_| self.invalid_descriptor(owner, desc))?;
        let ret_type = self.resolve_class(side, ret_desc)?;

        let id = MethodId::new(self.methods.len());
        let group = GroupId::new(self.groups.len());
        self.groups.push(vec![id]);

        let kind = match name {
            "<init>" => MethodKind::Constructor,
            "<clinit>" => MethodKind::ClassInit,
            _ => MethodKind::Other,
        };
        let position = body_index.unwrap_or(self.class(owner).methods.len());
        let name_obfuscated = self.member_name_obfuscated(owner, name);

        self.methods.push(MethodEntity {
            owner,
            name: name.to_string(),
            desc: desc.to_string(),
            access: access_flags,
            body_index,
            name_obfuscated,
            kind,
            group,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            ret_type,
            args: Vec::new(),
            vars: Vec::new(),
            refs_in: BTreeSet::new(),
            refs_out: BTreeSet::new(),
            lambda_refs_in: BTreeSet::new(),
            direct_refs_in: BTreeSet::new(),
            field_reads: BTreeSet::new(),
            field_writes: BTreeSet::new(),
            class_refs: BTreeSet::new(),
            strings: BTreeSet::new(),
            numbers: BTreeSet::new(),
            insn_targets: Vec::new(),
            position,
            names: Default::default(),
        });
        self.classes[owner.index()].methods.push(id);
        self.classes[ret_type.index()].method_type_refs.insert(id);

        let body = self.class(owner).body.clone();
        let code = body
            .as_deref()
            .zip(body_index)
            .and_then(|(b, i)| b.methods.get(i))
            .and_then(|m| m.code.as_ref());
        let code_length = code.map_or(0, |c| c.code_length);

        let mut slot: u16 = if access_flags & access::STATIC != 0 { 0 } else { 1 };
        for (index, arg) in arg_descs.iter().enumerate() {
            let var_type = self.resolve_class(side, arg)?;
            self.classes[var_type.index()].method_type_refs.insert(id);
            let lv = code.and_then(|c| {
                c.local_vars
                    .iter()
                    .find(|lv| lv.index == slot && lv.start_pc == 0)
            });
            let var = self.add_var(id, true, index, slot, 0, code_length, var_type, lv.map(|lv| lv.name.as_str()));
            self.methods[id.index()].args.push(var);
            slot += descriptor::slot_size(arg);
        }
        let arg_end = slot;

        if let Some(code) = code {
            let mut locals: Vec<_> = code
                .local_vars
                .iter()
                .filter(|lv| !(lv.index < arg_end && lv.start_pc == 0))
                .collect();
            locals.sort_by_key(|lv| (lv.start_pc, lv.index));
            for (index, lv) in locals.into_iter().enumerate() {
                let var_type = self.resolve_class(side, &lv.descriptor)?;
                let var = self.add_var(
                    id,
                    false,
                    index,
                    lv.index,
                    lv.start_pc,
                    lv.start_pc + lv.length,
                    var_type,
                    Some(lv.name.as_str()),
                );
                self.methods[id.index()].vars.push(var);
            }
        }

        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_var(
        &mut self,
        method: MethodId,
        is_arg: bool,
        index: usize,
        lv_index: u16,
        start: u32,
        end: u32,
        var_type: ClassId,
        name: Option<&str>,
    ) -> VarId {
        let owner = self.method(method).owner;
        let name_obfuscated = match name {
            _ if !self.class(owner).input => false,
            Some(name) => self.patterns.member_obfuscated(self.class(owner).side, name),
            None => true,
        };
        let id = VarId::new(self.vars.len());
        self.vars.push(VarEntity {
            method,
            is_arg,
            index,
            lv_index,
            start,
            end,
            var_type,
            orig_name: name.map(str::to_string),
            name_obfuscated,
            names: Default::default(),
        });
        id
    }

    pub(crate) fn add_field(
        &mut self,
        owner: ClassId,
        name: &str,
        desc: &str,
        access_flags: u16,
        body_index: Option<usize>,
    ) -> Result<FieldId, LoadError> {
        let side = self.class(owner).side;
        descriptor::check_field_descriptor(desc).map_err(|_| self.invalid_descriptor(owner, desc))?;
        let field_type = self.resolve_class(side, desc)?;

        let id = FieldId::new(self.fields.len());
        let position = body_index.unwrap_or(self.class(owner).fields.len());
        let name_obfuscated = self.member_name_obfuscated(owner, name);
        self.fields.push(FieldEntity {
            owner,
            name: name.to_string(),
            desc: desc.to_string(),
            access: access_flags,
            body_index,
            name_obfuscated,
            field_type,
            read_refs: BTreeSet::new(),
            write_refs: BTreeSet::new(),
            initializer: None,
            position,
            names: Default::default(),
        });
        self.classes[owner.index()].fields.push(id);
        self.classes[field_type.index()].field_type_refs.insert(id);
        Ok(id)
    }

    fn member_name_obfuscated(&self, owner: ClassId, name: &str) -> bool {
        let class = self.class(owner);
        class.input && !name.starts_with('<') && self.patterns.member_obfuscated(class.side, name)
    }

    /// Resolves a method reference along the owner's supertypes.
    ///
    /// When no declaration exists a synthetic method is created on the first
    /// non-real class of the super chain, or on the owner itself.
    pub(crate) fn resolve_method(
        &mut self,
        owner: ClassId,
        name: &str,
        desc: &str,
        access_hint: u16,
    ) -> Result<MethodId, LoadError> {
        self.drain_pending()?;
        if let Some(m) = self.find_in_hierarchy(owner, |g, c| g.method_by_id(c, name, desc)) {
            return Ok(m);
        }
        let host = self.first_unreal_ancestor(owner);
        let id = self.add_method(host, name, desc, access_hint, None)?;
        self.drain_pending()?;
        Ok(id)
    }

    pub(crate) fn resolve_field(
        &mut self,
        owner: ClassId,
        name: &str,
        desc: &str,
        access_hint: u16,
    ) -> Result<FieldId, LoadError> {
        self.drain_pending()?;
        if let Some(f) = self.find_in_hierarchy(owner, |g, c| g.field_by_id(c, name, desc)) {
            return Ok(f);
        }
        let host = self.first_unreal_ancestor(owner);
        let id = self.add_field(host, name, desc, access_hint, None)?;
        self.drain_pending()?;
        Ok(id)
    }

    fn find_in_hierarchy<T>(&self, start: ClassId, find: impl Fn(&Self, ClassId) -> Option<T>) -> Option<T> {
        let mut queue = VecDeque::from([start]);
        let mut seen = HashSet::new();
        while let Some(class) = queue.pop_front() {
            if !seen.insert(class) {
                continue;
            }
            if let Some(found) = find(self, class) {
                return Some(found);
            }
            let c = self.class(class);
            queue.extend(c.super_class);
            queue.extend(c.interfaces.iter().copied());
        }
        None
    }

    fn first_unreal_ancestor(&self, owner: ClassId) -> ClassId {
        let mut current = Some(owner);
        while let Some(class) = current {
            if !self.class(class).is_real() {
                return class;
            }
            current = self.class(class).super_class;
        }
        owner
    }

    /// Breadth-first walk over `class` and all of its supertypes.
    pub fn ancestry(&self, class: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([class]);
        let mut seen = HashSet::new();
        while let Some(c) = queue.pop_front() {
            if !seen.insert(c) {
                continue;
            }
            out.push(c);
            let entity = self.class(c);
            queue.extend(entity.super_class);
            queue.extend(entity.interfaces.iter().copied());
        }
        out
    }

    pub(crate) fn set_insn_targets(&mut self, method: MethodId, targets: Vec<InsnTarget>) {
        self.methods[method.index()].insn_targets = targets;
    }

    pub fn names(&self, entity: EntityRef) -> &Names {
        match entity {
            EntityRef::Class(id) => &self.class(id).names,
            EntityRef::Method(id) => &self.method(id).names,
            EntityRef::Field(id) => &self.field(id).names,
            EntityRef::Var(id) => &self.var(id).names,
        }
    }

    pub(crate) fn names_mut(&mut self, entity: EntityRef) -> &mut Names {
        match entity {
            EntityRef::Class(id) => &mut self.classes[id.index()].names,
            EntityRef::Method(id) => &mut self.methods[id.index()].names,
            EntityRef::Field(id) => &mut self.fields[id.index()].names,
            EntityRef::Var(id) => &mut self.vars[id.index()].names,
        }
    }

    /// Resolves one name variant of `entity`; uid names carry a kind prefix.
    pub fn display_name(&self, entity: EntityRef, ty: NameType) -> Option<String> {
        let (plain, prefix) = match entity {
            EntityRef::Class(id) => (self.class(id).name.clone(), "class"),
            EntityRef::Method(id) => (self.method(id).name.clone(), "method"),
            EntityRef::Field(id) => (self.field(id).name.clone(), "field"),
            EntityRef::Var(id) => {
                let v = self.var(id);
                (v.plain_name(), if v.is_arg { "arg" } else { "var" })
            }
        };
        self.names(entity).resolve(&plain, prefix, ty)
    }
}

pub(crate) fn number_of(constant: &crate::classfile::Constant) -> Option<Number> {
    use crate::classfile::Constant;
    match constant {
        Constant::Int(v) => Some(Number::Int(*v)),
        Constant::Long(v) => Some(Number::Long(*v)),
        Constant::Float(v) => Some(Number::float(*v)),
        Constant::Double(v) => Some(Number::double(*v)),
        _ => None,
    }
}
