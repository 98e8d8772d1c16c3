use std::collections::BTreeSet;

use super::insn::code_similarity;
use super::method::signature_similarity;
use super::similarity::{compare_counts, compare_identity_sets, compare_nullable, compare_sets};
use super::{ALL_LEVELS, Classifier, Env, FULL_UP, INTERMEDIATE_UP, PotentialEq};
use crate::classfile::access;
use crate::graph::ClassGraph;
use crate::model::{ClassId, FieldId, MethodId};

pub static CLASSIFIERS: &[Classifier<ClassId>] = &[
    Classifier { name: "class type check", weight: 20.0, levels: ALL_LEVELS, score: type_check },
    Classifier { name: "hierarchy depth", weight: 1.0, levels: ALL_LEVELS, score: hierarchy_depth },
    Classifier { name: "hierarchy siblings", weight: 2.0, levels: ALL_LEVELS, score: siblings },
    Classifier { name: "parent class", weight: 4.0, levels: ALL_LEVELS, score: parent },
    Classifier { name: "child classes", weight: 3.0, levels: ALL_LEVELS, score: children },
    Classifier { name: "interfaces", weight: 3.0, levels: ALL_LEVELS, score: interfaces },
    Classifier { name: "implementers", weight: 2.0, levels: ALL_LEVELS, score: implementers },
    Classifier { name: "outer class", weight: 6.0, levels: ALL_LEVELS, score: outer },
    Classifier { name: "inner classes", weight: 5.0, levels: ALL_LEVELS, score: inner },
    Classifier { name: "method count", weight: 3.0, levels: ALL_LEVELS, score: method_count },
    Classifier { name: "field count", weight: 3.0, levels: ALL_LEVELS, score: field_count },
    Classifier { name: "out references", weight: 6.0, levels: ALL_LEVELS, score: out_refs },
    Classifier { name: "in references", weight: 6.0, levels: ALL_LEVELS, score: in_refs },
    Classifier { name: "method out references", weight: 5.0, levels: ALL_LEVELS, score: method_out },
    Classifier { name: "method in references", weight: 6.0, levels: ALL_LEVELS, score: method_in },
    Classifier { name: "field read references", weight: 5.0, levels: ALL_LEVELS, score: field_read },
    Classifier { name: "field write references", weight: 5.0, levels: ALL_LEVELS, score: field_write },
    Classifier { name: "string constants", weight: 8.0, levels: ALL_LEVELS, score: strings },
    Classifier { name: "numeric constants", weight: 6.0, levels: ALL_LEVELS, score: numbers },
    Classifier { name: "similar methods", weight: 10.0, levels: INTERMEDIATE_UP, score: similar_methods },
    Classifier { name: "method code", weight: 10.0, levels: FULL_UP, score: method_code },
];

const RECORD: &str = "java/lang/Record";

fn type_bits(graph: &ClassGraph, class: ClassId) -> u32 {
    let c = graph.class(class);
    let mask = access::ENUM | access::INTERFACE | access::ANNOTATION | access::ABSTRACT;
    let record = c
        .super_class()
        .is_some_and(|s| graph.class(s).name() == RECORD);
    u32::from(c.access() & mask) | (u32::from(record) << 16)
}

fn type_check(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    let diff = type_bits(env.graph, a) ^ type_bits(env.graph, b);
    1.0 - diff.count_ones() as f64 / 5.0
}

fn depth(graph: &ClassGraph, class: ClassId) -> usize {
    let mut depth = 0;
    let mut cur = graph.class(class).super_class();
    while let Some(c) = cur {
        depth += 1;
        cur = graph.class(c).super_class();
    }
    depth
}

fn hierarchy_depth(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_counts(depth(env.graph, a), depth(env.graph, b))
}

fn sibling_count(graph: &ClassGraph, class: ClassId) -> usize {
    let side = graph.class(class).side();
    graph.class(class).super_class().map_or(0, |s| {
        graph
            .class(s)
            .children()
            .iter()
            .filter(|c| graph.class(**c).side() == side)
            .count()
    })
}

fn siblings(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_counts(sibling_count(env.graph, a), sibling_count(env.graph, b))
}

fn parent(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    let g = env.graph;
    compare_nullable(env, g.class(a).super_class(), g.class(b).super_class())
}

fn children(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_identity_sets(env, env.graph.class(a).children(), env.graph.class(b).children())
}

fn interfaces(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_identity_sets(env, env.graph.class(a).interfaces(), env.graph.class(b).interfaces())
}

fn implementers(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_identity_sets(
        env,
        env.graph.class(a).implementers(),
        env.graph.class(b).implementers(),
    )
}

fn outer(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_nullable(env, env.graph.class(a).outer(), env.graph.class(b).outer())
}

fn inner(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_identity_sets(env, env.graph.class(a).inner(), env.graph.class(b).inner())
}

fn method_count(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_counts(env.graph.real_methods(a).count(), env.graph.real_methods(b).count())
}

fn field_count(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_counts(env.graph.real_fields(a).count(), env.graph.real_fields(b).count())
}

/// Types a class's code depends on, excluding itself.
fn out_ref_set(graph: &ClassGraph, class: ClassId) -> BTreeSet<ClassId> {
    let mut out = BTreeSet::new();
    for m in graph.class(class).methods() {
        let method = graph.method(*m);
        out.extend(method.class_refs().iter().copied());
        out.extend(method.refs_out().iter().map(|r| graph.method(*r).owner()));
        out.extend(
            method
                .field_reads()
                .iter()
                .chain(method.field_writes())
                .map(|f| graph.field(*f).owner()),
        );
    }
    out.remove(&class);
    out
}

/// Classes whose code depends on this class, excluding itself.
fn in_ref_set(graph: &ClassGraph, class: ClassId) -> BTreeSet<ClassId> {
    let c = graph.class(class);
    let mut out: BTreeSet<ClassId> = c
        .method_type_refs
        .iter()
        .map(|m| graph.method(*m).owner())
        .collect();
    for m in c.methods() {
        out.extend(graph.method(*m).refs_in().iter().map(|r| graph.method(*r).owner()));
    }
    for f in c.fields() {
        let field = graph.field(*f);
        out.extend(
            field
                .read_refs()
                .iter()
                .chain(field.write_refs())
                .map(|r| graph.method(*r).owner()),
        );
    }
    out.remove(&class);
    out
}

fn out_refs(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_identity_sets(env, &out_ref_set(env.graph, a), &out_ref_set(env.graph, b))
}

fn in_refs(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_identity_sets(env, &in_ref_set(env.graph, a), &in_ref_set(env.graph, b))
}

fn collect_methods(
    graph: &ClassGraph,
    class: ClassId,
    edges: impl Fn(MethodId) -> Vec<MethodId>,
) -> BTreeSet<MethodId> {
    graph
        .class(class)
        .methods()
        .iter()
        .flat_map(|m| edges(*m))
        .filter(|m| graph.method(*m).owner() != class)
        .collect()
}

fn collect_fields(
    graph: &ClassGraph,
    class: ClassId,
    edges: impl Fn(MethodId) -> Vec<FieldId>,
) -> BTreeSet<FieldId> {
    graph
        .class(class)
        .methods()
        .iter()
        .flat_map(|m| edges(*m))
        .collect()
}

fn method_out(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    let g = env.graph;
    let out = |c| collect_methods(g, c, |m| g.method(m).refs_out().iter().copied().collect());
    compare_identity_sets(env, &out(a), &out(b))
}

fn method_in(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    let g = env.graph;
    let incoming = |c| collect_methods(g, c, |m| g.method(m).refs_in().iter().copied().collect());
    compare_identity_sets(env, &incoming(a), &incoming(b))
}

fn field_read(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    let g = env.graph;
    let reads = |c| collect_fields(g, c, |m| g.method(m).field_reads().iter().copied().collect());
    compare_identity_sets(env, &reads(a), &reads(b))
}

fn field_write(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    let g = env.graph;
    let writes = |c| collect_fields(g, c, |m| g.method(m).field_writes().iter().copied().collect());
    compare_identity_sets(env, &writes(a), &writes(b))
}

fn strings(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_sets(env.graph.class(a).strings(), env.graph.class(b).strings())
}

fn numbers(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    compare_sets(env.graph.class(a).numbers(), env.graph.class(b).numbers())
}

/// Average best pairwise score of `a`'s methods against potentially equal methods of `b`.
fn best_method_pairs(
    env: &Env<'_>,
    a: &[MethodId],
    b: &[MethodId],
    score: impl Fn(MethodId, MethodId) -> f64,
) -> f64 {
    if a.is_empty() || b.is_empty() {
        return if a.is_empty() && b.is_empty() { 1.0 } else { 0.0 };
    }
    let total: f64 = a
        .iter()
        .map(|ma| {
            b.iter()
                .filter(|mb| MethodId::potentially_equal(env, *ma, **mb))
                .map(|mb| score(*ma, *mb))
                .fold(0.0, f64::max)
        })
        .sum();
    total / a.len().max(b.len()) as f64
}

fn similar_methods(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    let ma: Vec<MethodId> = env.graph.real_methods(a).collect();
    let mb: Vec<MethodId> = env.graph.real_methods(b).collect();
    best_method_pairs(env, &ma, &mb, |x, y| signature_similarity(env, x, y))
}

fn method_code(env: &Env<'_>, a: ClassId, b: ClassId) -> f64 {
    let with_code = |c| -> Vec<MethodId> {
        env.graph
            .real_methods(c)
            .filter(|m| env.graph.code(*m).is_some())
            .collect()
    };
    best_method_pairs(env, &with_code(a), &with_code(b), |x, y| code_similarity(env, x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::classfile::insn::op;
    use crate::classifier::{ClassifierLevel, max_score, rank};
    use crate::extract::build_graph;
    use crate::graph::NamePatterns;
    use crate::matching::MatchTable;
    use crate::model::Side;
    use crate::testkit::ClassBuilder;

    #[test]
    fn structurally_identical_classes_rank_first() -> anyhow::Result<()> {
        let lib = ClassBuilder::new("lib/Lib")
            .method("log", "(Ljava/lang/String;)V", access::PUBLIC | access::STATIC, |_| {})
            .build();
        let side = |main: &str, other: &str| {
            vec![
                ClassBuilder::new(main)
                    .field("f", "I", access::PRIVATE)
                    .method("m", "()V", access::PUBLIC, |code| {
                        code.ldc(crate::classfile::Constant::String("hello".into()))
                            .invoke(op::INVOKESTATIC, "lib/Lib", "log", "(Ljava/lang/String;)V")
                            .op(op::RETURN);
                    })
                    .build(),
                ClassBuilder::new(other).access(access::PUBLIC | access::INTERFACE | access::ABSTRACT).build(),
            ]
        };
        let g = build_graph(NamePatterns::default(), vec![lib], side("a", "b"), side("c", "d"))?;
        let (cache, table) = (Cache::new(), MatchTable::default());
        let env = Env {
            graph: &g,
            matches: &table,
            cache: &cache,
            assume_both: true,
        };

        let a = g.lookup(Side::A, "La;").expect("a");
        let c = g.lookup(Side::B, "Lc;").expect("c");
        let d = g.lookup(Side::B, "Ld;").expect("d");
        assert_eq!(type_check(&env, a, c), 1.0);
        assert!(type_check(&env, a, d) < 1.0);
        assert_eq!(strings(&env, a, c), 1.0);

        let level = ClassifierLevel::Initial;
        let max = max_score(CLASSIFIERS, level);
        let ranking = rank(&env, a, &[c, d], CLASSIFIERS, level, f64::INFINITY);
        assert_eq!(ranking[0].subject, c);
        assert!(ranking[0].score > ranking[1].score);
        assert!((ranking[0].score - max).abs() < 1e-9);
        assert_eq!(ranking[0].results.len(), CLASSIFIERS.iter().filter(|c| c.applies(level)).count());
        Ok(())
    }
}
