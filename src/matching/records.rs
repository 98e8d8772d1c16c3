//! Match pairs keyed by descriptor paths, for persistence collaborators.
//!
//! Paths survive reloads of the same inputs: `Lpkg/Cls;` for classes,
//! `Lpkg/Cls;/name(desc)ret` for methods, `Lpkg/Cls;/name;;desc` for fields
//! and a trailing `/argN` or `/varN` for method arguments and locals.

use serde::{Deserialize, Serialize};

use super::ops::MatchState;
use super::table::{MatchEntity, MatchTable};
use crate::error::MatchError;
use crate::graph::ClassGraph;
use crate::model::{ClassId, EntityKind, FieldId, MethodId, Side, VarId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub kind: EntityKind,
    pub a: String,
    pub b: String,
}

impl MatchRecord {
    fn of<T: MatchEntity>(graph: &ClassGraph, kind: EntityKind, a: T, b: T) -> Self {
        Self {
            kind,
            a: a.path(graph),
            b: b.path(graph),
        }
    }
}

/// Every matched pair in side A declaration order, owners before members.
pub fn match_records(graph: &ClassGraph, table: &MatchTable) -> Vec<MatchRecord> {
    let mut records = Vec::new();
    for &class in graph.classes(Side::A) {
        let Some(peer) = table.class(class) else {
            continue;
        };
        if graph.class(class).is_array() {
            continue;
        }
        records.push(MatchRecord::of(graph, EntityKind::Class, class, peer));

        for &method in graph.class(class).methods() {
            let Some(peer) = table.method(method) else {
                continue;
            };
            records.push(MatchRecord::of(graph, EntityKind::Method, method, peer));
            let m = graph.method(method);
            for (kind, vars) in [(EntityKind::Arg, m.args()), (EntityKind::Var, m.vars())] {
                for &var in vars {
                    if let Some(peer) = table.var(var) {
                        records.push(MatchRecord::of(graph, kind, var, peer));
                    }
                }
            }
        }
        for &field in graph.class(class).fields() {
            if let Some(peer) = table.field(field) {
                records.push(MatchRecord::of(graph, EntityKind::Field, field, peer));
            }
        }
    }
    records
}

/// Splits `Lpkg/Cls;/rest` into the class descriptor and the member part.
fn split_class(path: &str) -> (&str, Option<&str>) {
    match path.find(";/") {
        Some(end) => (&path[..=end], Some(&path[end + 2..])),
        None => (path, None),
    }
}

fn resolve_class(graph: &ClassGraph, side: Side, path: &str) -> Option<ClassId> {
    let (class, member) = split_class(path);
    if member.is_some() {
        return None;
    }
    graph.lookup(side, class)
}

fn resolve_method(graph: &ClassGraph, side: Side, path: &str) -> Option<MethodId> {
    let (class, member) = split_class(path);
    let member = member?;
    let paren = member.find('(')?;
    let owner = graph.lookup(side, class)?;
    graph.method_by_id(owner, &member[..paren], &member[paren..])
}

fn resolve_field(graph: &ClassGraph, side: Side, path: &str) -> Option<FieldId> {
    let (class, member) = split_class(path);
    let (name, desc) = member?.split_once(";;")?;
    let owner = graph.lookup(side, class)?;
    graph.field_by_id(owner, name, desc)
}

fn resolve_var(graph: &ClassGraph, side: Side, path: &str, arg: bool) -> Option<VarId> {
    let (method, var) = path.rsplit_once('/')?;
    let index: usize = var.strip_prefix(if arg { "arg" } else { "var" })?.parse().ok()?;
    let m = graph.method(resolve_method(graph, side, method)?);
    let list = if arg { m.args() } else { m.vars() };
    list.get(index).copied()
}

fn resolved<T>(id: Option<T>, path: &str) -> Result<T, MatchError> {
    id.ok_or_else(|| MatchError::UnknownPath(path.to_string()))
}

fn apply_one(state: &mut MatchState<'_>, graph: &ClassGraph, record: &MatchRecord) -> Result<(), MatchError> {
    let (a, b) = (record.a.as_str(), record.b.as_str());
    match record.kind {
        EntityKind::Class => {
            let ca = resolved(resolve_class(graph, Side::A, a), a)?;
            let cb = resolved(resolve_class(graph, Side::B, b), b)?;
            state.match_classes(ca, cb)
        }
        EntityKind::Method => {
            let ma = resolved(resolve_method(graph, Side::A, a), a)?;
            let mb = resolved(resolve_method(graph, Side::B, b), b)?;
            state.match_methods(ma, mb)
        }
        EntityKind::Field => {
            let fa = resolved(resolve_field(graph, Side::A, a), a)?;
            let fb = resolved(resolve_field(graph, Side::B, b), b)?;
            state.match_fields(fa, fb)
        }
        EntityKind::Arg | EntityKind::Var => {
            let arg = record.kind == EntityKind::Arg;
            let va = resolved(resolve_var(graph, Side::A, a, arg), a)?;
            let vb = resolved(resolve_var(graph, Side::B, b, arg), b)?;
            state.match_vars(va, vb)
        }
    }
}

/// Replays `records` in order through the match operations and returns how many were applied.
///
/// Stops at the first record that does not resolve or is rejected; records
/// applied before it stay in place.
pub fn apply_match_records(
    state: &mut MatchState<'_>,
    graph: &ClassGraph,
    records: &[MatchRecord],
) -> Result<usize, MatchError> {
    for record in records {
        apply_one(state, graph, record)?;
    }
    Ok(records.len())
}
