use super::similarity::{compare_identity_sets, compare_positions};
use super::{ALL_LEVELS, Classifier, Env, FULL_UP, PotentialEq};
use crate::classfile::access;
use crate::model::{ClassId, FieldId, Initializer};

pub static CLASSIFIERS: &[Classifier<FieldId>] = &[
    Classifier { name: "field type check", weight: 10.0, levels: ALL_LEVELS, score: type_check },
    Classifier { name: "access flags", weight: 4.0, levels: ALL_LEVELS, score: access_flags },
    Classifier { name: "type", weight: 10.0, levels: ALL_LEVELS, score: field_type },
    Classifier { name: "read references", weight: 6.0, levels: ALL_LEVELS, score: read_refs },
    Classifier { name: "write references", weight: 6.0, levels: ALL_LEVELS, score: write_refs },
    Classifier { name: "position", weight: 3.0, levels: ALL_LEVELS, score: position },
    Classifier { name: "initializer", weight: 7.0, levels: FULL_UP, score: initializer },
];

fn type_check(env: &Env<'_>, a: FieldId, b: FieldId) -> f64 {
    let mask = access::STATIC | access::ENUM | access::SYNTHETIC;
    let diff = (env.graph.field(a).access() ^ env.graph.field(b).access()) & mask;
    1.0 - diff.count_ones() as f64 / 3.0
}

fn access_flags(env: &Env<'_>, a: FieldId, b: FieldId) -> f64 {
    let mask = access::PUBLIC
        | access::PRIVATE
        | access::PROTECTED
        | access::FINAL
        | access::VOLATILE
        | access::TRANSIENT;
    let diff = (env.graph.field(a).access() ^ env.graph.field(b).access()) & mask;
    1.0 - diff.count_ones() as f64 / 6.0
}

fn field_type(env: &Env<'_>, a: FieldId, b: FieldId) -> f64 {
    let g = env.graph;
    if ClassId::potentially_equal(env, g.field(a).field_type(), g.field(b).field_type()) {
        1.0
    } else {
        0.0
    }
}

fn read_refs(env: &Env<'_>, a: FieldId, b: FieldId) -> f64 {
    let g = env.graph;
    compare_identity_sets(env, g.field(a).read_refs(), g.field(b).read_refs())
}

fn write_refs(env: &Env<'_>, a: FieldId, b: FieldId) -> f64 {
    let g = env.graph;
    compare_identity_sets(env, g.field(a).write_refs(), g.field(b).write_refs())
}

fn position(env: &Env<'_>, a: FieldId, b: FieldId) -> f64 {
    let g = env.graph;
    let (fa, fb) = (g.field(a), g.field(b));
    let owner_b = fb.owner();
    let anchors = g.real_fields(fa.owner()).filter_map(|f| {
        let peer = env.matches.field(f)?;
        (g.field(peer).owner() == owner_b).then(|| (g.field(f).position(), g.field(peer).position()))
    });
    compare_positions(
        fa.position(),
        g.real_fields(fa.owner()).count(),
        fb.position(),
        g.real_fields(owner_b).count(),
        anchors,
    )
}

fn initializer(env: &Env<'_>, a: FieldId, b: FieldId) -> f64 {
    let g = env.graph;
    match (g.field(a).initializer(), g.field(b).initializer()) {
        (None, None) => 1.0,
        (Some(x), Some(y)) => match (x, y) {
            (Initializer::Class(cx), Initializer::Class(cy)) => {
                if ClassId::potentially_equal(env, *cx, *cy) { 1.0 } else { 0.5 }
            }
            (Initializer::Number(nx), Initializer::Number(ny)) => {
                if nx == ny {
                    1.0
                } else if std::mem::discriminant(nx) == std::mem::discriminant(ny) {
                    0.5
                } else {
                    0.0
                }
            }
            (Initializer::String(sx), Initializer::String(sy)) => {
                if sx == sy { 1.0 } else { 0.5 }
            }
            _ => 0.0,
        },
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::classfile::Constant;
    use crate::extract::build_graph;
    use crate::graph::NamePatterns;
    use crate::matching::MatchTable;
    use crate::model::Side;
    use crate::testkit::ClassBuilder;

    #[test]
    fn initializers_and_flags_are_compared() -> anyhow::Result<()> {
        let class = |name: &str, value: i32| {
            ClassBuilder::new(name)
                .constant_field("x", "I", access::STATIC | access::FINAL, Constant::Int(value))
                .constant_field("y", "Ljava/lang/String;", access::STATIC | access::FINAL, Constant::String("s".into()))
                .field("z", "J", access::PRIVATE)
                .build()
        };
        let g = build_graph(NamePatterns::default(), Vec::new(), vec![class("a", 1)], vec![class("b", 2)])?;
        let (cache, table) = (Cache::new(), MatchTable::default());
        let env = Env {
            graph: &g,
            matches: &table,
            cache: &cache,
            assume_both: true,
        };
        let a = g.lookup(Side::A, "La;").expect("a");
        let b = g.lookup(Side::B, "Lb;").expect("b");
        let fa = g.class(a).fields().to_vec();
        let fb = g.class(b).fields().to_vec();

        assert_eq!(initializer(&env, fa[0], fb[0]), 0.5);
        assert_eq!(initializer(&env, fa[1], fb[1]), 1.0);
        assert_eq!(initializer(&env, fa[0], fb[1]), 0.0);
        assert_eq!(initializer(&env, fa[2], fb[2]), 1.0);
        assert_eq!(field_type(&env, fa[0], fb[0]), 1.0);
        assert_eq!(field_type(&env, fa[0], fb[2]), 0.0);
        assert!(type_check(&env, fa[0], fb[2]) < 1.0);
        assert_eq!(position(&env, fa[1], fb[1]), 1.0);
        Ok(())
    }
}
