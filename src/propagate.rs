//! Name, uid and remap-table maintenance on top of an established match graph.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::graph::ClassGraph;
use crate::matching::{MatchEntity, MatchTable};
use crate::model::{EntityRef, GroupId, MethodId, NameType, Names, Side};

/// Next uid per entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UidCounters {
    pub class: u32,
    pub method: u32,
    pub field: u32,
}

/// Pairs of `links` ordered as `(from side, other side)`.
fn oriented<T: MatchEntity>(graph: &ClassGraph, pairs: impl Iterator<Item = (T, T)>, from: Side) -> Vec<(T, T)> {
    pairs
        .map(|(x, y)| if x.side(graph) == from { (x, y) } else { (y, x) })
        .collect()
}

/// Copies the name variants `dst` lacks from `src`. Returns whether anything changed.
fn fill_names(src: &Names, dst: &mut Names) -> bool {
    let mut changed = false;
    if dst.mapped.is_none() && src.mapped.is_some() {
        dst.mapped = src.mapped.clone();
        changed = true;
    }
    for (index, name) in src.aux.iter().enumerate() {
        if name.is_some() && dst.aux(index).is_none() {
            dst.set_aux(index, name.clone());
            changed = true;
        }
    }
    if dst.comment.is_none() && src.comment.is_some() {
        dst.comment = src.comment.clone();
        changed = true;
    }
    changed
}

/// Copies mapped and auxiliary names plus comments from side `from` onto matched peers lacking them.
///
/// Mapped method names then spread across each receiving hierarchy group.
/// Returns the number of entities that received at least one name.
pub fn propagate_names(graph: &mut ClassGraph, table: &MatchTable, from: Side) -> usize {
    if from == Side::Shared {
        return 0;
    }
    let mut pairs: Vec<(EntityRef, EntityRef)> = Vec::new();
    let g = &*graph;
    pairs.extend(oriented(g, table.classes().pairs(), from).into_iter().map(|(s, d)| (s.into(), d.into())));
    pairs.extend(oriented(g, table.methods().pairs(), from).into_iter().map(|(s, d)| (s.into(), d.into())));
    pairs.extend(oriented(g, table.fields().pairs(), from).into_iter().map(|(s, d)| (s.into(), d.into())));
    pairs.extend(oriented(g, table.vars().pairs(), from).into_iter().map(|(s, d)| (s.into(), d.into())));

    let mut changed = 0;
    let mut groups: Vec<GroupId> = Vec::new();
    for (src, dst) in pairs {
        let names = graph.names(src).clone();
        if fill_names(&names, graph.names_mut(dst)) {
            changed += 1;
            if let EntityRef::Method(m) = dst {
                groups.push(graph.method(m).group());
            }
        }
    }

    for group in groups {
        let members: Vec<MethodId> = graph.group(group).to_vec();
        let Some(mapped) = members
            .iter()
            .find_map(|m| graph.method(*m).names.mapped.clone())
        else {
            continue;
        };
        for m in members {
            let names = graph.names_mut(EntityRef::Method(m));
            if names.mapped.is_none() {
                names.mapped = Some(mapped.clone());
                changed += 1;
            }
        }
    }

    debug!(from = %from, changed, "propagated names");
    changed
}

fn shared_uid(graph: &ClassGraph, entities: &[EntityRef]) -> Option<u32> {
    entities.iter().find_map(|e| graph.names(*e).uid)
}

fn set_uid(graph: &mut ClassGraph, entities: &[EntityRef], uid: u32) {
    for e in entities {
        graph.names_mut(*e).uid = Some(uid);
    }
}

/// Gives every matched pair with an obfuscated side A name a shared uid.
///
/// Existing uids on either end are reused; matched methods share one uid per
/// hierarchy group on both sides. Returns the number of uids allocated.
pub fn assign_uids(graph: &mut ClassGraph, table: &MatchTable, counters: &mut UidCounters) -> usize {
    let mut allocated = 0;
    let mut next = |graph: &ClassGraph, entities: &[EntityRef], counter: &mut u32| {
        shared_uid(graph, entities).unwrap_or_else(|| {
            let uid = *counter;
            *counter += 1;
            allocated += 1;
            uid
        })
    };

    for (a, b) in oriented(graph, table.classes().pairs(), Side::A) {
        if !graph.class(a).is_name_obfuscated() || graph.class(a).is_array() {
            continue;
        }
        let entities = [EntityRef::Class(a), EntityRef::Class(b)];
        let uid = next(&*graph, &entities, &mut counters.class);
        set_uid(graph, &entities, uid);
    }

    for (a, b) in oriented(graph, table.methods().pairs(), Side::A) {
        if !graph.method(a).is_name_obfuscated() {
            continue;
        }
        let entities: Vec<EntityRef> = graph
            .group(graph.method(a).group())
            .iter()
            .chain(graph.group(graph.method(b).group()))
            .map(|m| EntityRef::Method(*m))
            .collect();
        let uid = next(&*graph, &entities, &mut counters.method);
        set_uid(graph, &entities, uid);
    }

    for (a, b) in oriented(graph, table.fields().pairs(), Side::A) {
        if !graph.field(a).is_name_obfuscated() {
            continue;
        }
        let entities = [EntityRef::Field(a), EntityRef::Field(b)];
        let uid = next(&*graph, &entities, &mut counters.field);
        set_uid(graph, &entities, uid);
    }

    debug!(allocated, "assigned uids");
    allocated
}

/// Renames for one side under a name view, consumed by decompiler adapters.
///
/// Classes are keyed by internal name, members by their descriptor path
/// (`Lpkg/Cls;/name(desc)ret`, `Lpkg/Cls;/name;;desc`). Only entities whose
/// name differs under the view are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemapTable {
    pub classes: BTreeMap<String, String>,
    pub methods: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
}

pub fn remap_table(graph: &ClassGraph, side: Side, ty: NameType) -> RemapTable {
    let mut table = RemapTable::default();
    for &class in graph.classes(side) {
        let c = graph.class(class);
        if !c.is_real() || c.is_array() {
            continue;
        }
        if let Some(name) = graph.display_name(EntityRef::Class(class), ty)
            && name != c.name()
        {
            table.classes.insert(c.name().to_string(), name);
        }
        for method in graph.real_methods(class) {
            if let Some(name) = graph.display_name(EntityRef::Method(method), ty)
                && name != graph.method(method).name()
            {
                table.methods.insert(method.path(graph), name);
            }
        }
        for field in graph.real_fields(class) {
            if let Some(name) = graph.display_name(EntityRef::Field(field), ty)
                && name != graph.field(field).name()
            {
                table.fields.insert(field.path(graph), name);
            }
        }
    }
    table
}
