//! Instruction-level comparison of method bodies.

use super::similarity::{CompareResult, compare_lists, map_lists};
use super::{Env, PotentialEq};
use crate::cache::InsnMap;
use crate::classfile::{Constant, Insn, Operand};
use crate::model::{ClassId, FieldId, InsnTarget, MethodId, VarId};

/// Similarity of two method bodies as normalized instruction edit distance.
pub(crate) fn code_similarity(env: &Env<'_>, a: MethodId, b: MethodId) -> f64 {
    env.cache.code_score((a, b), || {
        let (ia, ib) = (env.graph.insns(a), env.graph.insns(b));
        compare_lists(ia, ib, |i, j| compare_insn(env, a, i, b, j))
    })
}

/// Alignment of `a`'s instructions to `b`'s.
pub(crate) fn insn_map(env: &Env<'_>, a: MethodId, b: MethodId) -> InsnMap {
    env.cache.insn_map((a, b), || {
        let (ia, ib) = (env.graph.insns(a), env.graph.insns(b));
        map_lists(ia, ib, |i, j| compare_insn(env, a, i, b, j))
    })
}

fn target(env: &Env<'_>, method: MethodId, index: usize) -> InsnTarget {
    env.graph
        .method(method)
        .insn_targets
        .get(index)
        .copied()
        .unwrap_or(InsnTarget::None)
}

/// Offset range `[offset, next)` the instruction at `index` occupies.
fn insn_span(env: &Env<'_>, method: MethodId, index: usize) -> (u32, u32) {
    let insns = env.graph.insns(method);
    let offset = insns[index].offset;
    let next = insns
        .get(index + 1)
        .map(|i| i.offset)
        .or_else(|| env.graph.code(method).map(|c| c.code_length))
        .unwrap_or(offset + 1);
    (offset, next)
}

fn var_of(env: &Env<'_>, method: MethodId, index: usize, slot: u16) -> Option<VarId> {
    let (offset, next) = insn_span(env, method, index);
    env.graph.var_at(method, slot, offset, next)
}

fn verdict(equal: bool) -> CompareResult {
    if equal {
        CompareResult::Similar
    } else {
        CompareResult::Distinct
    }
}

fn compare_vars(
    env: &Env<'_>,
    (ma, ia, slot_a): (MethodId, usize, u16),
    (mb, ib, slot_b): (MethodId, usize, u16),
) -> CompareResult {
    match (var_of(env, ma, ia, slot_a), var_of(env, mb, ib, slot_b)) {
        (Some(va), Some(vb)) => verdict(VarId::potentially_equal(env, va, vb)),
        (None, None) if slot_a == slot_b => CompareResult::Similar,
        _ => CompareResult::Possible,
    }
}

fn compare_targets(env: &Env<'_>, a: InsnTarget, b: InsnTarget) -> CompareResult {
    match (a, b) {
        (InsnTarget::Class(x), InsnTarget::Class(y)) => verdict(ClassId::potentially_equal(env, x, y)),
        (InsnTarget::Method(x), InsnTarget::Method(y)) => verdict(MethodId::potentially_equal(env, x, y)),
        (InsnTarget::Field(x), InsnTarget::Field(y)) => verdict(FieldId::potentially_equal(env, x, y)),
        _ => CompareResult::Possible,
    }
}

fn constant_kind(c: &Constant) -> u8 {
    match c {
        Constant::Int(_) => 0,
        Constant::Float(_) => 1,
        Constant::Long(_) => 2,
        Constant::Double(_) => 3,
        Constant::String(_) => 4,
        Constant::Class(_) => 5,
        Constant::MethodType(_) => 6,
        Constant::MethodHandle(_) => 7,
        Constant::Dynamic { .. } => 8,
    }
}

fn constants_equal(a: &Constant, b: &Constant) -> bool {
    match (a, b) {
        (Constant::Float(x), Constant::Float(y)) => x.to_bits() == y.to_bits(),
        (Constant::Double(x), Constant::Double(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

fn jump_direction(target: usize, index: usize) -> std::cmp::Ordering {
    target.cmp(&index)
}

fn switch_keys(operand: &Operand) -> Option<Vec<i32>> {
    match operand {
        Operand::TableSwitch { low, high, .. } => Some((*low..=*high).collect()),
        Operand::LookupSwitch { pairs, .. } => {
            let mut keys: Vec<i32> = pairs.iter().map(|(k, _)| *k).collect();
            keys.sort_unstable();
            Some(keys)
        }
        _ => None,
    }
}

/// Compares instruction `ia` of method `ma` with instruction `ib` of method `mb`.
pub(crate) fn compare_insn(env: &Env<'_>, ma: MethodId, ia: usize, mb: MethodId, ib: usize) -> CompareResult {
    let a: &Insn = &env.graph.insns(ma)[ia];
    let b: &Insn = &env.graph.insns(mb)[ib];
    if a.opcode != b.opcode {
        return CompareResult::Distinct;
    }

    match (&a.operand, &b.operand) {
        (Operand::None, Operand::None) => CompareResult::Similar,
        (Operand::Int(x), Operand::Int(y)) => verdict(x == y),
        (Operand::Var(x), Operand::Var(y)) => compare_vars(env, (ma, ia, *x), (mb, ib, *y)),
        (
            Operand::Iinc { slot: sa, delta: da },
            Operand::Iinc { slot: sb, delta: db },
        ) => {
            if da != db {
                return CompareResult::Distinct;
            }
            compare_vars(env, (ma, ia, *sa), (mb, ib, *sb))
        }
        (Operand::Jump(ta), Operand::Jump(tb)) => {
            verdict(jump_direction(*ta, ia) == jump_direction(*tb, ib))
        }
        (Operand::TableSwitch { .. } | Operand::LookupSwitch { .. }, _) => {
            verdict(switch_keys(&a.operand) == switch_keys(&b.operand))
        }
        (Operand::Ldc(ca), Operand::Ldc(cb)) => {
            if constant_kind(ca) != constant_kind(cb) {
                return CompareResult::Distinct;
            }
            if let Constant::Class(_) = ca {
                return compare_targets(env, target(env, ma, ia), target(env, mb, ib));
            }
            if constants_equal(ca, cb) {
                CompareResult::Similar
            } else {
                CompareResult::Possible
            }
        }
        (Operand::Type(_), Operand::Type(_))
        | (Operand::Field(_), Operand::Field(_))
        | (Operand::Method(_), Operand::Method(_)) => {
            compare_targets(env, target(env, ma, ia), target(env, mb, ib))
        }
        (Operand::Dynamic(da), Operand::Dynamic(db)) => {
            match (target(env, ma, ia), target(env, mb, ib)) {
                (InsnTarget::Method(x), InsnTarget::Method(y)) => {
                    verdict(MethodId::potentially_equal(env, x, y))
                }
                _ => {
                    let same_site = da.bootstrap.owner == db.bootstrap.owner
                        && da.bootstrap.name == db.bootstrap.name
                        && da.name == db.name;
                    if same_site {
                        CompareResult::Similar
                    } else {
                        CompareResult::Possible
                    }
                }
            }
        }
        (
            Operand::MultiANewArray { dims: da, .. },
            Operand::MultiANewArray { dims: db, .. },
        ) => {
            if da != db {
                return CompareResult::Distinct;
            }
            compare_targets(env, target(env, ma, ia), target(env, mb, ib))
        }
        _ => CompareResult::Distinct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::classfile::access;
    use crate::classfile::insn::op;
    use crate::extract::build_graph;
    use crate::graph::{ClassGraph, NamePatterns};
    use crate::matching::MatchTable;
    use crate::model::Side;
    use crate::testkit::{ClassBuilder, CodeBuilder};

    fn graph_with(
        a: impl FnOnce(&mut CodeBuilder),
        b: impl FnOnce(&mut CodeBuilder),
    ) -> anyhow::Result<(ClassGraph, MethodId, MethodId)> {
        let lib = ClassBuilder::new("lib/Lib")
            .method("run", "(I)V", access::PUBLIC | access::STATIC, |_| {})
            .build();
        let ca = ClassBuilder::new("x").method("m", "(I)V", access::STATIC, a).build();
        let cb = ClassBuilder::new("y").method("n", "(I)V", access::STATIC, b).build();
        let g = build_graph(NamePatterns::default(), vec![lib], vec![ca], vec![cb])?;
        let ma = g.class(g.lookup(Side::A, "Lx;").expect("x")).methods()[0];
        let mb = g.class(g.lookup(Side::B, "Ly;").expect("y")).methods()[0];
        Ok((g, ma, mb))
    }

    fn env<'a>(graph: &'a ClassGraph, matches: &'a MatchTable, cache: &'a Cache) -> Env<'a> {
        Env {
            graph,
            matches,
            cache,
            assume_both: true,
        }
    }

    #[test]
    fn identical_bodies_score_one() -> anyhow::Result<()> {
        let body = |code: &mut CodeBuilder| {
            code.var(op::ILOAD, 0)
                .invoke(op::INVOKESTATIC, "lib/Lib", "run", "(I)V")
                .push_int(7)
                .op(op::RETURN);
        };
        let (g, ma, mb) = graph_with(body, body)?;
        let (cache, table) = (Cache::new(), MatchTable::default());
        let e = env(&g, &table, &cache);
        assert_eq!(code_similarity(&e, ma, mb), 1.0);
        assert_eq!(*insn_map(&e, ma, mb), vec![Some(0), Some(1), Some(2), Some(3)]);
        Ok(())
    }

    #[test]
    fn differing_constants_and_opcodes_lower_the_score() -> anyhow::Result<()> {
        let (g, ma, mb) = graph_with(
            |code| {
                code.push_int(1).op(op::RETURN);
            },
            |code| {
                code.push_int(2).op(op::NOP).op(op::RETURN);
            },
        )?;
        let (cache, table) = (Cache::new(), MatchTable::default());
        let e = env(&g, &table, &cache);
        assert_eq!(compare_insn(&e, ma, 0, mb, 0), CompareResult::Distinct);
        // substitution 2 + insertion 2 over 2 * 3
        let score = code_similarity(&e, ma, mb);
        assert!((score - (1.0 - 4.0 / 6.0)).abs() < 1e-9);
        assert_eq!(*insn_map(&e, ma, mb), vec![None, Some(2)]);
        Ok(())
    }

    #[test]
    fn string_constants_of_the_same_kind_are_possible() -> anyhow::Result<()> {
        let (g, ma, mb) = graph_with(
            |code| {
                code.ldc(Constant::String("a".into()));
            },
            |code| {
                code.ldc(Constant::String("b".into()));
            },
        )?;
        let (cache, table) = (Cache::new(), MatchTable::default());
        assert_eq!(
            compare_insn(&env(&g, &table, &cache), ma, 0, mb, 0),
            CompareResult::Possible
        );
        Ok(())
    }
}
