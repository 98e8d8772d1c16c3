//! Match and unmatch operations.
//!
//! Every operation validates its request before touching the table, so a
//! returned error leaves the state exactly as it was. Successful operations
//! keep the table consistent: member matches require matched owners, method
//! matches respect hierarchy groups, and the cache is cleared afterwards.

use tracing::debug;

use super::table::{MatchEntity, MatchTable};
use crate::cache::Cache;
use crate::error::MatchError;
use crate::graph::ClassGraph;
use crate::model::{ClassId, FieldId, GroupId, MethodId, Side, VarId};

pub struct MatchState<'a> {
    graph: &'a ClassGraph,
    table: &'a mut MatchTable,
    cache: &'a Cache,
}

impl<'a> MatchState<'a> {
    pub fn new(graph: &'a ClassGraph, table: &'a mut MatchTable, cache: &'a Cache) -> Self {
        Self { graph, table, cache }
    }

    pub fn table(&self) -> &MatchTable {
        self.table
    }

    fn check_pair<T: MatchEntity>(&self, a: T, b: T) -> Result<(), MatchError> {
        if a.side(self.graph) != Side::A {
            return Err(MatchError::NotSideA(a.path(self.graph)));
        }
        if b.side(self.graph) != Side::B {
            return Err(MatchError::NotSideB(b.path(self.graph)));
        }
        let links = T::links(self.table);
        for id in [a, b] {
            if !links.is_matchable(id) {
                return Err(MatchError::NotMatchable(id.path(self.graph)));
            }
        }
        Ok(())
    }

    pub fn match_classes(&mut self, a: ClassId, b: ClassId) -> Result<(), MatchError> {
        self.check_pair(a, b)?;
        let g = self.graph;
        let (ca, cb) = (g.class(a), g.class(b));
        if ca.array_dimensions() != cb.array_dimensions() {
            return Err(MatchError::ArrayDimensions {
                a: ca.array_dimensions(),
                b: cb.array_dimensions(),
            });
        }
        if self.table.class(a) == Some(b) {
            return Ok(());
        }

        debug!(a = %ca.id(), b = %cb.id(), "match classes");
        for id in [a, b] {
            if let Some(old) = self.table.class(id) {
                self.unlink_class(old);
            }
        }
        self.table.classes.link(a, b);
        self.link_arrays(a, b);
        self.seed_methods(a, b);
        self.seed_fields(a, b);
        self.cache.clear();
        Ok(())
    }

    fn is_free(&self, class: ClassId) -> bool {
        self.table.class(class).is_none() && self.table.classes.is_matchable(class)
    }

    fn link_arrays(&mut self, a: ClassId, b: ClassId) {
        let g = self.graph;
        if let (Some(ea), Some(eb)) = (g.class(a).element(), g.class(b).element()) {
            let sides_ok = g.class(ea).side() == Side::A && g.class(eb).side() == Side::B;
            if sides_ok
                && self.is_free(ea)
                && self.is_free(eb)
                && let Err(e) = self.match_classes(ea, eb)
            {
                debug!(error = %e, "array elements left unmatched");
            }
            return;
        }

        for &arr_a in g.class(a).arrays() {
            if !self.is_free(arr_a) {
                continue;
            }
            let dims = g.class(arr_a).array_dimensions();
            let candidate = g
                .class(b)
                .arrays()
                .iter()
                .copied()
                .find(|arr_b| g.class(*arr_b).array_dimensions() == dims && self.is_free(*arr_b));
            if let Some(arr_b) = candidate {
                self.table.classes.link(arr_a, arr_b);
            }
        }
    }

    fn seed_methods(&mut self, a: ClassId, b: ClassId) {
        let g = self.graph;
        for &ma in g.class(a).methods() {
            if self.table.method(ma).is_some() || !self.table.methods.is_matchable(ma) {
                continue;
            }
            let method = g.method(ma);
            let target = if method.is_name_obfuscated() {
                self.group_peer_in(ma, b)
            } else {
                g.method_by_id(b, method.name(), method.desc())
                    .filter(|mb| !g.method(*mb).is_name_obfuscated())
            };
            if let Some(mb) = target
                && self.table.method(mb).is_none()
                && self.table.methods.is_matchable(mb)
            {
                self.table.methods.link(ma, mb);
            }
        }
    }

    /// Method of class `b` in the group already paired with `ma`'s group.
    fn group_peer_in(&self, ma: MethodId, b: ClassId) -> Option<MethodId> {
        let g = self.graph;
        let peer_group = self.matched_group(g.method(ma).group())?;
        if g.group(peer_group).len() <= 1 {
            return None;
        }
        g.class(b)
            .methods()
            .iter()
            .copied()
            .find(|mb| g.method(*mb).group() == peer_group)
    }

    /// Group on the other side that some member of `group` is matched into.
    fn matched_group(&self, group: GroupId) -> Option<GroupId> {
        let g = self.graph;
        g.group(group)
            .iter()
            .find_map(|m| self.table.method(*m))
            .map(|peer| g.method(peer).group())
    }

    fn seed_fields(&mut self, a: ClassId, b: ClassId) {
        let g = self.graph;
        for &fa in g.class(a).fields() {
            let field = g.field(fa);
            if field.is_name_obfuscated() || self.table.field(fa).is_some() || !self.table.fields.is_matchable(fa) {
                continue;
            }
            if let Some(fb) = g.field_by_id(b, field.name(), field.desc())
                && !g.field(fb).is_name_obfuscated()
                && self.table.field(fb).is_none()
                && self.table.fields.is_matchable(fb)
            {
                self.table.fields.link(fa, fb);
            }
        }
    }

    pub fn match_methods(&mut self, a: MethodId, b: MethodId) -> Result<(), MatchError> {
        self.check_pair(a, b)?;
        let g = self.graph;
        let (ma, mb) = (g.method(a), g.method(b));
        if self.table.class(ma.owner()) != Some(mb.owner()) {
            return Err(MatchError::OwnersNotMatched {
                a: a.path(g),
                b: b.path(g),
            });
        }
        if self.table.method(a) == Some(b) {
            return Ok(());
        }

        debug!(a = %a.path(g), b = %b.path(g), "match methods");
        let (ga, gb) = (ma.group(), mb.group());
        let compatible = self.matched_group(ga).is_none_or(|peer| peer == gb)
            && self.matched_group(gb).is_none_or(|peer| peer == ga);

        if compatible {
            for id in [a, b] {
                self.unlink_method(id);
            }
            self.table.methods.link(a, b);
        } else {
            // conflicting groups: drop every match of both groups and re-pair by owner
            let mut members: Vec<MethodId> = g.group(ga).iter().chain(g.group(gb)).copied().collect();
            members.sort_unstable();
            for &m in &members {
                self.unlink_method(m);
            }
            self.table.methods.link(a, b);
            for &m in g.group(ga) {
                if self.table.method(m).is_some() || !self.table.methods.is_matchable(m) {
                    continue;
                }
                let Some(owner_peer) = self.table.class(g.method(m).owner()) else {
                    continue;
                };
                let peer = g.group(gb).iter().copied().find(|n| {
                    g.method(*n).owner() == owner_peer
                        && self.table.method(*n).is_none()
                        && self.table.methods.is_matchable(*n)
                });
                if let Some(n) = peer {
                    self.table.methods.link(m, n);
                }
            }
        }
        self.cache.clear();
        Ok(())
    }

    pub fn match_fields(&mut self, a: FieldId, b: FieldId) -> Result<(), MatchError> {
        self.check_pair(a, b)?;
        let g = self.graph;
        if self.table.class(g.field(a).owner()) != Some(g.field(b).owner()) {
            return Err(MatchError::OwnersNotMatched {
                a: a.path(g),
                b: b.path(g),
            });
        }
        if self.table.field(a) == Some(b) {
            return Ok(());
        }

        debug!(a = %a.path(g), b = %b.path(g), "match fields");
        for id in [a, b] {
            self.table.fields.unlink(id);
        }
        self.table.fields.link(a, b);
        self.cache.clear();
        Ok(())
    }

    pub fn match_vars(&mut self, a: VarId, b: VarId) -> Result<(), MatchError> {
        self.check_pair(a, b)?;
        let g = self.graph;
        let (va, vb) = (g.var(a), g.var(b));
        if self.table.method(va.method()) != Some(vb.method()) {
            return Err(MatchError::OwnersNotMatched {
                a: a.path(g),
                b: b.path(g),
            });
        }
        if va.is_arg() != vb.is_arg() {
            return Err(MatchError::VarKindMismatch {
                a: a.path(g),
                b: b.path(g),
            });
        }
        if self.table.var(a) == Some(b) {
            return Ok(());
        }

        debug!(a = %a.path(g), b = %b.path(g), "match vars");
        for id in [a, b] {
            self.table.vars.unlink(id);
        }
        self.table.vars.link(a, b);
        self.cache.clear();
        Ok(())
    }

    /// Unmatches a class together with its members and its array/element chain.
    pub fn unmatch_class(&mut self, class: ClassId) {
        if self.table.class(class).is_some() {
            debug!(class = %self.graph.class(class).id(), "unmatch class");
            self.unlink_class(class);
            self.cache.clear();
        }
    }

    fn unlink_class(&mut self, class: ClassId) {
        let Some(peer) = self.table.classes.unlink(class) else {
            return;
        };
        let g = self.graph;
        for c in [class, peer] {
            for &m in g.class(c).methods() {
                self.unlink_method(m);
            }
            for &f in g.class(c).fields() {
                self.table.fields.unlink(f);
            }
        }
        let mut chain: Vec<ClassId> = g.class(class).arrays().to_vec();
        chain.extend(g.class(class).element());
        for c in chain {
            if self.table.class(c).is_some() {
                self.unlink_class(c);
            }
        }
    }

    /// Unmatches a method, its hierarchy group and their arguments and variables.
    pub fn unmatch_method(&mut self, method: MethodId) {
        if self.table.method(method).is_none() {
            return;
        }
        let g = self.graph;
        debug!(method = %method.path(g), "unmatch method");
        for &m in g.group(g.method(method).group()) {
            self.unlink_method(m);
        }
        self.unlink_method(method);
        self.cache.clear();
    }

    fn unlink_method(&mut self, method: MethodId) {
        let Some(peer) = self.table.methods.unlink(method) else {
            return;
        };
        let g = self.graph;
        for m in [method, peer] {
            let m = g.method(m);
            for &v in m.args().iter().chain(m.vars()) {
                self.table.vars.unlink(v);
            }
        }
    }

    pub fn unmatch_field(&mut self, field: FieldId) {
        if self.table.fields.unlink(field).is_some() {
            debug!(field = %field.path(self.graph), "unmatch field");
            self.cache.clear();
        }
    }

    pub fn unmatch_var(&mut self, var: VarId) {
        if self.table.vars.unlink(var).is_some() {
            debug!(var = %var.path(self.graph), "unmatch var");
            self.cache.clear();
        }
    }

    pub fn set_class_matchable(&mut self, class: ClassId, matchable: bool) {
        if !matchable {
            self.unmatch_class(class);
        }
        self.table.classes.set_matchable(class, matchable);
    }

    pub fn set_method_matchable(&mut self, method: MethodId, matchable: bool) {
        if !matchable {
            self.unmatch_method(method);
        }
        self.table.methods.set_matchable(method, matchable);
    }

    pub fn set_field_matchable(&mut self, field: FieldId, matchable: bool) {
        if !matchable {
            self.unmatch_field(field);
        }
        self.table.fields.set_matchable(field, matchable);
    }

    pub fn set_var_matchable(&mut self, var: VarId, matchable: bool) {
        if !matchable {
            self.unmatch_var(var);
        }
        self.table.vars.set_matchable(var, matchable);
    }

    /// Matches every real side A class with a stable name to the side B class of the same name.
    ///
    /// Returns the number of classes newly matched.
    pub fn match_unobfuscated(&mut self) -> usize {
        let g = self.graph;
        let mut matched = 0;
        for &a in g.classes(Side::A) {
            let class = g.class(a);
            if !class.is_real() || class.is_name_obfuscated() || self.table.class(a).is_some() {
                continue;
            }
            let Some(b) = g.lookup(Side::B, class.id()) else {
                continue;
            };
            let other = g.class(b);
            if other.side() != Side::B || !other.is_real() || other.is_name_obfuscated() {
                continue;
            }
            if self.table.class(b).is_none() && self.match_classes(a, b).is_ok() {
                matched += 1;
            }
        }
        debug!(matched, "matched unobfuscated classes");
        matched
    }
}
