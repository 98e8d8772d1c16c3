use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hash;

use crate::graph::ClassGraph;
use crate::model::{ClassId, FieldId, MethodId, Side, VarId};

/// Symmetric peer links and matchable flags for one entity kind.
#[derive(Debug, Clone)]
pub struct Links<T> {
    peers: BTreeMap<T, T>,
    unmatchable: BTreeSet<T>,
}

impl<T> Default for Links<T> {
    fn default() -> Self {
        Self {
            peers: BTreeMap::new(),
            unmatchable: BTreeSet::new(),
        }
    }
}

impl<T: Copy + Ord> Links<T> {
    pub fn peer(&self, id: T) -> Option<T> {
        self.peers.get(&id).copied()
    }

    pub fn is_matchable(&self, id: T) -> bool {
        !self.unmatchable.contains(&id)
    }

    /// Matched pairs, each reported once with the lower id first.
    pub fn pairs(&self) -> impl Iterator<Item = (T, T)> + '_ {
        self.peers
            .iter()
            .filter(|(a, b)| a < b)
            .map(|(a, b)| (*a, *b))
    }

    pub fn len(&self) -> usize {
        self.peers.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub(crate) fn link(&mut self, a: T, b: T) {
        self.peers.insert(a, b);
        self.peers.insert(b, a);
    }

    /// Removes the link of `id` on both ends and returns the former peer.
    pub(crate) fn unlink(&mut self, id: T) -> Option<T> {
        let peer = self.peers.remove(&id)?;
        self.peers.remove(&peer);
        Some(peer)
    }

    pub(crate) fn set_matchable(&mut self, id: T, matchable: bool) {
        if matchable {
            self.unmatchable.remove(&id);
        } else {
            self.unmatchable.insert(id);
        }
    }
}

/// Cross-side correspondence for every entity kind.
#[derive(Debug, Clone, Default)]
pub struct MatchTable {
    pub(crate) classes: Links<ClassId>,
    pub(crate) methods: Links<MethodId>,
    pub(crate) fields: Links<FieldId>,
    pub(crate) vars: Links<VarId>,
}

impl MatchTable {
    pub fn class(&self, id: ClassId) -> Option<ClassId> {
        self.classes.peer(id)
    }

    pub fn method(&self, id: MethodId) -> Option<MethodId> {
        self.methods.peer(id)
    }

    pub fn field(&self, id: FieldId) -> Option<FieldId> {
        self.fields.peer(id)
    }

    pub fn var(&self, id: VarId) -> Option<VarId> {
        self.vars.peer(id)
    }

    pub fn classes(&self) -> &Links<ClassId> {
        &self.classes
    }

    pub fn methods(&self) -> &Links<MethodId> {
        &self.methods
    }

    pub fn fields(&self) -> &Links<FieldId> {
        &self.fields
    }

    pub fn vars(&self) -> &Links<VarId> {
        &self.vars
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// An entity id that takes part in matching.
pub trait MatchEntity: Copy + Ord + Eq + Hash + Send + Sync + std::fmt::Debug {
    fn links(table: &MatchTable) -> &Links<Self>;
    fn links_mut(table: &mut MatchTable) -> &mut Links<Self>;
    fn side(self, graph: &ClassGraph) -> Side;
    fn is_name_obfuscated(self, graph: &ClassGraph) -> bool;
    /// Stable, descriptor based path used in logs, errors and match records.
    fn path(self, graph: &ClassGraph) -> String;
}

impl MatchEntity for ClassId {
    fn links(table: &MatchTable) -> &Links<Self> {
        &table.classes
    }

    fn links_mut(table: &mut MatchTable) -> &mut Links<Self> {
        &mut table.classes
    }

    fn side(self, graph: &ClassGraph) -> Side {
        graph.class(self).side()
    }

    fn is_name_obfuscated(self, graph: &ClassGraph) -> bool {
        graph.class(self).is_name_obfuscated()
    }

    fn path(self, graph: &ClassGraph) -> String {
        graph.class(self).id().to_string()
    }
}

impl MatchEntity for MethodId {
    fn links(table: &MatchTable) -> &Links<Self> {
        &table.methods
    }

    fn links_mut(table: &mut MatchTable) -> &mut Links<Self> {
        &mut table.methods
    }

    fn side(self, graph: &ClassGraph) -> Side {
        graph.method_side(self)
    }

    fn is_name_obfuscated(self, graph: &ClassGraph) -> bool {
        graph.method(self).is_name_obfuscated()
    }

    fn path(self, graph: &ClassGraph) -> String {
        let m = graph.method(self);
        format!("{}/{}", graph.class(m.owner()).id(), m.id())
    }
}

impl MatchEntity for FieldId {
    fn links(table: &MatchTable) -> &Links<Self> {
        &table.fields
    }

    fn links_mut(table: &mut MatchTable) -> &mut Links<Self> {
        &mut table.fields
    }

    fn side(self, graph: &ClassGraph) -> Side {
        graph.field_side(self)
    }

    fn is_name_obfuscated(self, graph: &ClassGraph) -> bool {
        graph.field(self).is_name_obfuscated()
    }

    fn path(self, graph: &ClassGraph) -> String {
        let f = graph.field(self);
        format!("{}/{}", graph.class(f.owner()).id(), f.id())
    }
}

impl MatchEntity for VarId {
    fn links(table: &MatchTable) -> &Links<Self> {
        &table.vars
    }

    fn links_mut(table: &mut MatchTable) -> &mut Links<Self> {
        &mut table.vars
    }

    fn side(self, graph: &ClassGraph) -> Side {
        graph.var_side(self)
    }

    fn is_name_obfuscated(self, graph: &ClassGraph) -> bool {
        graph.var(self).is_name_obfuscated()
    }

    fn path(self, graph: &ClassGraph) -> String {
        let v = graph.var(self);
        let kind = if v.is_arg() { "arg" } else { "var" };
        format!("{}/{kind}{}", v.method().path(graph), v.index())
    }
}
