use super::insn::code_similarity;
use super::similarity::{
    CompareResult, compare_identity_sets, compare_lists, compare_positions, compare_sets,
};
use super::{ALL_LEVELS, Classifier, Env, FULL_UP, PotentialEq};
use crate::classfile::access;
use crate::model::{ClassId, MethodId};

pub static CLASSIFIERS: &[Classifier<MethodId>] = &[
    Classifier { name: "method type check", weight: 10.0, levels: ALL_LEVELS, score: type_check },
    Classifier { name: "access flags", weight: 4.0, levels: ALL_LEVELS, score: access_flags },
    Classifier { name: "argument types", weight: 10.0, levels: ALL_LEVELS, score: arg_types },
    Classifier { name: "return type", weight: 5.0, levels: ALL_LEVELS, score: ret_type },
    Classifier { name: "class references", weight: 3.0, levels: ALL_LEVELS, score: class_refs },
    Classifier { name: "string constants", weight: 5.0, levels: ALL_LEVELS, score: strings },
    Classifier { name: "numeric constants", weight: 5.0, levels: ALL_LEVELS, score: numbers },
    Classifier { name: "out references", weight: 6.0, levels: ALL_LEVELS, score: out_refs },
    Classifier { name: "in references", weight: 6.0, levels: ALL_LEVELS, score: in_refs },
    Classifier { name: "field reads", weight: 5.0, levels: ALL_LEVELS, score: field_reads },
    Classifier { name: "field writes", weight: 5.0, levels: ALL_LEVELS, score: field_writes },
    Classifier { name: "position", weight: 3.0, levels: ALL_LEVELS, score: position },
    Classifier { name: "parent methods", weight: 10.0, levels: ALL_LEVELS, score: parents },
    Classifier { name: "child methods", weight: 3.0, levels: ALL_LEVELS, score: children },
    Classifier { name: "code", weight: 12.0, levels: FULL_UP, score: code },
];

fn type_check(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let mask = access::STATIC | access::NATIVE | access::ABSTRACT;
    let (ma, mb) = (env.graph.method(a), env.graph.method(b));
    let mut diff = ((ma.access() ^ mb.access()) & mask).count_ones();
    if ma.kind() != mb.kind() {
        diff += 1;
    }
    1.0 - diff as f64 / 4.0
}

fn access_flags(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let mask = access::PUBLIC
        | access::PRIVATE
        | access::PROTECTED
        | access::FINAL
        | access::SYNCHRONIZED
        | access::BRIDGE
        | access::VARARGS
        | access::STRICT
        | access::SYNTHETIC;
    let diff = (env.graph.method(a).access() ^ env.graph.method(b).access()) & mask;
    1.0 - diff.count_ones() as f64 / 9.0
}

fn type_result(env: &Env<'_>, a: ClassId, b: ClassId) -> CompareResult {
    if ClassId::potentially_equal(env, a, b) {
        CompareResult::Similar
    } else {
        CompareResult::Distinct
    }
}

fn arg_types(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    let (args_a, args_b) = (g.method(a).args(), g.method(b).args());
    compare_lists(args_a, args_b, |i, j| {
        type_result(env, g.var(args_a[i]).var_type(), g.var(args_b[j]).var_type())
    })
}

fn ret_type(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    if ClassId::potentially_equal(env, g.method(a).ret_type(), g.method(b).ret_type()) {
        1.0
    } else {
        0.0
    }
}

fn class_refs(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    compare_identity_sets(env, g.method(a).class_refs(), g.method(b).class_refs())
}

fn strings(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    compare_sets(env.graph.method(a).strings(), env.graph.method(b).strings())
}

fn numbers(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    compare_sets(env.graph.method(a).numbers(), env.graph.method(b).numbers())
}

fn out_refs(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    compare_identity_sets(env, g.method(a).refs_out(), g.method(b).refs_out())
}

fn in_refs(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    compare_identity_sets(env, g.method(a).refs_in(), g.method(b).refs_in())
}

fn field_reads(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    compare_identity_sets(env, g.method(a).field_reads(), g.method(b).field_reads())
}

fn field_writes(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    compare_identity_sets(env, g.method(a).field_writes(), g.method(b).field_writes())
}

fn position(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    let (ma, mb) = (g.method(a), g.method(b));
    let owner_b = mb.owner();
    let anchors = g.real_methods(ma.owner()).filter_map(|m| {
        let peer = env.matches.method(m)?;
        (g.method(peer).owner() == owner_b).then(|| (g.method(m).position(), g.method(peer).position()))
    });
    compare_positions(
        ma.position(),
        g.real_methods(ma.owner()).count(),
        mb.position(),
        g.real_methods(owner_b).count(),
        anchors,
    )
}

fn parents(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    compare_identity_sets(env, g.method(a).parents(), g.method(b).parents())
}

fn children(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let g = env.graph;
    compare_identity_sets(env, g.method(a).children(), g.method(b).children())
}

fn code(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    code_similarity(env, a, b)
}

/// Cheap signature and call-shape similarity used when comparing whole classes.
pub(crate) fn signature_similarity(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    let same_kind = env.graph.method(a).kind() == env.graph.method(b).kind();
    let kind = if same_kind { 1.0 } else { 0.0 };
    (arg_types(env, a, b) + ret_type(env, a, b) + out_refs(env, a, b) + kind) / 4.0
}
