//! Potential equality: the cheap structural gate every candidate pair must pass
//! before it is scored.

use super::Env;
use crate::matching::MatchEntity;
use crate::model::{ClassId, FieldId, GroupId, MethodId, MethodKind, Side, VarId};

pub trait PotentialEq: MatchEntity {
    fn potentially_equal(env: &Env<'_>, a: Self, b: Self) -> bool;
}

/// Shared checks: identity, existing matches, opposite sides and matchability.
///
/// Returns `Some(verdict)` when these settle the question.
fn precheck<T: MatchEntity>(env: &Env<'_>, a: T, b: T) -> Option<bool> {
    if a == b {
        return Some(true);
    }
    let links = T::links(env.matches);
    if let Some(peer) = links.peer(a) {
        return Some(peer == b);
    }
    if let Some(peer) = links.peer(b) {
        return Some(peer == a);
    }
    let sides = (a.side(env.graph), b.side(env.graph));
    if !matches!(sides, (Side::A, Side::B) | (Side::B, Side::A)) {
        return Some(false);
    }
    if !links.is_matchable(a) || !links.is_matchable(b) {
        return Some(false);
    }
    None
}

/// Names are compatible when both are obfuscated, when plain names agree, or
/// when only one is obfuscated and obfuscation is not assumed symmetric.
fn names_compatible(env: &Env<'_>, a_obf: bool, b_obf: bool, a_name: &str, b_name: &str) -> bool {
    match (a_obf, b_obf) {
        (true, true) => true,
        (false, false) => a_name == b_name,
        _ => !env.assume_both,
    }
}

impl PotentialEq for ClassId {
    fn potentially_equal(env: &Env<'_>, a: Self, b: Self) -> bool {
        if let Some(verdict) = precheck(env, a, b) {
            return verdict;
        }
        let (ca, cb) = (env.graph.class(a), env.graph.class(b));
        if ca.array_dimensions() != cb.array_dimensions() {
            return false;
        }
        if let (Some(ea), Some(eb)) = (ca.element(), cb.element()) {
            return ClassId::potentially_equal(env, ea, eb);
        }
        names_compatible(
            env,
            ca.is_name_obfuscated(),
            cb.is_name_obfuscated(),
            ca.name(),
            cb.name(),
        )
    }
}

/// Group of the opposite side the first matched member of `group` maps into.
fn matched_group(env: &Env<'_>, group: GroupId) -> Option<GroupId> {
    env.graph
        .group(group)
        .iter()
        .find_map(|m| env.matches.method(*m))
        .map(|peer| env.graph.method(peer).group())
}

impl PotentialEq for MethodId {
    fn potentially_equal(env: &Env<'_>, a: Self, b: Self) -> bool {
        if let Some(verdict) = precheck(env, a, b) {
            return verdict;
        }
        let graph = env.graph;
        let (ma, mb) = (graph.method(a), graph.method(b));
        if !ClassId::potentially_equal(env, ma.owner(), mb.owner()) {
            return false;
        }
        if !names_compatible(
            env,
            ma.is_name_obfuscated(),
            mb.is_name_obfuscated(),
            ma.name(),
            mb.name(),
        ) {
            return false;
        }
        // constructors and initializers only pair with their own kind
        if (ma.name().starts_with('<') || mb.name().starts_with('<')) && ma.name() != mb.name() {
            return false;
        }

        // a matched hierarchy member on either side pins the other side's group
        if matched_group(env, ma.group()).is_some_and(|g| g != mb.group())
            || matched_group(env, mb.group()).is_some_and(|g| g != ma.group())
        {
            return false;
        }

        if ma.kind() == MethodKind::LambdaImpl && mb.kind() == MethodKind::LambdaImpl {
            return ma.refs_in().iter().any(|ra| {
                mb.refs_in()
                    .iter()
                    .any(|rb| MethodId::potentially_equal(env, *ra, *rb))
            });
        }
        true
    }
}

impl PotentialEq for FieldId {
    fn potentially_equal(env: &Env<'_>, a: Self, b: Self) -> bool {
        if let Some(verdict) = precheck(env, a, b) {
            return verdict;
        }
        let (fa, fb) = (env.graph.field(a), env.graph.field(b));
        ClassId::potentially_equal(env, fa.owner(), fb.owner())
            && names_compatible(
                env,
                fa.is_name_obfuscated(),
                fb.is_name_obfuscated(),
                fa.name(),
                fb.name(),
            )
    }
}

impl PotentialEq for VarId {
    fn potentially_equal(env: &Env<'_>, a: Self, b: Self) -> bool {
        if let Some(verdict) = precheck(env, a, b) {
            return verdict;
        }
        let (va, vb) = (env.graph.var(a), env.graph.var(b));
        if va.is_arg() != vb.is_arg() {
            return false;
        }
        if !MethodId::potentially_equal(env, va.method(), vb.method()) {
            return false;
        }
        names_compatible(
            env,
            va.is_name_obfuscated(),
            vb.is_name_obfuscated(),
            &va.plain_name(),
            &vb.plain_name(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::classfile::access;
    use crate::extract::build_graph;
    use crate::graph::{ClassGraph, NamePatterns};
    use crate::matching::MatchTable;
    use crate::testkit::ClassBuilder;

    fn env<'a>(graph: &'a ClassGraph, matches: &'a MatchTable, cache: &'a Cache) -> Env<'a> {
        Env {
            graph,
            matches,
            cache,
            assume_both: true,
        }
    }

    fn sample() -> anyhow::Result<ClassGraph> {
        let a = vec![
            ClassBuilder::new("x").method("m", "()V", access::PUBLIC, |_| {}).build(),
            ClassBuilder::new("y").build(),
        ];
        let b = vec![
            ClassBuilder::new("p").method("n", "()V", access::PUBLIC, |_| {}).build(),
            ClassBuilder::new("q").build(),
        ];
        Ok(build_graph(NamePatterns::default(), Vec::new(), a, b)?)
    }

    #[test]
    fn matches_and_sides_decide_first() -> anyhow::Result<()> {
        let g = sample()?;
        let (cache, mut table) = (Cache::new(), MatchTable::default());
        let x = g.lookup(Side::A, "Lx;").expect("x");
        let y = g.lookup(Side::A, "Ly;").expect("y");
        let p = g.lookup(Side::B, "Lp;").expect("p");
        let q = g.lookup(Side::B, "Lq;").expect("q");

        assert!(ClassId::potentially_equal(&env(&g, &table, &cache), x, x));
        assert!(ClassId::potentially_equal(&env(&g, &table, &cache), x, q));
        assert!(!ClassId::potentially_equal(&env(&g, &table, &cache), x, y));

        table.classes.link(x, p);
        let e = env(&g, &table, &cache);
        assert!(ClassId::potentially_equal(&e, x, p));
        assert!(ClassId::potentially_equal(&e, p, x));
        assert!(!ClassId::potentially_equal(&e, x, q));
        assert!(!ClassId::potentially_equal(&e, y, p));
        Ok(())
    }

    #[test]
    fn unmatchable_entities_are_never_candidates() -> anyhow::Result<()> {
        let g = sample()?;
        let (cache, mut table) = (Cache::new(), MatchTable::default());
        let y = g.lookup(Side::A, "Ly;").expect("y");
        let q = g.lookup(Side::B, "Lq;").expect("q");
        table.classes.set_matchable(q, false);
        assert!(!ClassId::potentially_equal(&env(&g, &table, &cache), y, q));
        Ok(())
    }

    #[test]
    fn plain_names_must_agree_under_symmetric_obfuscation() -> anyhow::Result<()> {
        let patterns = NamePatterns::new(Some("keep/.*"), None, Some("keep/.*"), None)?;
        let a = vec![
            ClassBuilder::new("keep/Same").build(),
            ClassBuilder::new("o").build(),
        ];
        let b = vec![
            ClassBuilder::new("keep/Same").build(),
            ClassBuilder::new("keep/Other").build(),
        ];
        let g = build_graph(patterns, Vec::new(), a, b)?;
        let (cache, table) = (Cache::new(), MatchTable::default());
        let same_a = g.lookup(Side::A, "Lkeep/Same;").expect("same a");
        let same_b = g.lookup(Side::B, "Lkeep/Same;").expect("same b");
        let other_b = g.lookup(Side::B, "Lkeep/Other;").expect("other b");
        let o = g.lookup(Side::A, "Lo;").expect("o");

        let mut e = env(&g, &table, &cache);
        assert!(ClassId::potentially_equal(&e, same_a, same_b));
        assert!(!ClassId::potentially_equal(&e, same_a, other_b));
        assert!(!ClassId::potentially_equal(&e, o, other_b));
        e.assume_both = false;
        assert!(ClassId::potentially_equal(&e, o, other_b));
        Ok(())
    }

    #[test]
    fn members_require_compatible_owners() -> anyhow::Result<()> {
        let g = sample()?;
        let (cache, mut table) = (Cache::new(), MatchTable::default());
        let x = g.lookup(Side::A, "Lx;").expect("x");
        let p = g.lookup(Side::B, "Lp;").expect("p");
        let q = g.lookup(Side::B, "Lq;").expect("q");
        let m = g.class(x).methods()[0];
        let n = g.class(p).methods()[0];
        assert!(MethodId::potentially_equal(&env(&g, &table, &cache), m, n));

        table.classes.link(x, q);
        assert!(!MethodId::potentially_equal(&env(&g, &table, &cache), m, n));
        Ok(())
    }

    #[test]
    fn a_group_pinned_on_either_side_rejects_both_directions() -> anyhow::Result<()> {
        let a = vec![
            ClassBuilder::new("x").method("m", "()V", access::PUBLIC, |_| {}).build(),
            ClassBuilder::new("z").method("m", "()V", access::PUBLIC, |_| {}).build(),
        ];
        let b = vec![
            ClassBuilder::new("p").method("m", "()V", access::PUBLIC, |_| {}).build(),
            ClassBuilder::new("q")
                .super_class("p")
                .method("m", "()V", access::PUBLIC, |_| {})
                .build(),
        ];
        let g = build_graph(NamePatterns::default(), Vec::new(), a, b)?;
        let (cache, mut table) = (Cache::new(), MatchTable::default());
        let x = g.lookup(Side::A, "Lx;").expect("x");
        let z = g.lookup(Side::A, "Lz;").expect("z");
        let p = g.lookup(Side::B, "Lp;").expect("p");
        let q = g.lookup(Side::B, "Lq;").expect("q");
        let (xm, zm) = (g.class(x).methods()[0], g.class(z).methods()[0]);
        let (pm, qm) = (g.class(p).methods()[0], g.class(q).methods()[0]);
        assert_eq!(g.method(pm).group(), g.method(qm).group());

        table.classes.link(x, p);
        table.classes.link(z, q);
        table.methods.link(zm, qm);
        let e = env(&g, &table, &cache);
        // p.m shares a group with q.m, which is matched into z's group
        assert!(!MethodId::potentially_equal(&e, xm, pm));
        assert!(!MethodId::potentially_equal(&e, pm, xm));
        Ok(())
    }
}
