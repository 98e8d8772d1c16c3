use super::insn::insn_map;
use super::similarity::compare_positions;
use super::{ALL_LEVELS, Classifier, Env, FULL_UP, PotentialEq};
use crate::classfile::Operand;
use crate::model::{ClassId, MethodId, VarId};

pub static CLASSIFIERS: &[Classifier<VarId>] = &[
    Classifier { name: "type", weight: 10.0, levels: ALL_LEVELS, score: var_type },
    Classifier { name: "position", weight: 3.0, levels: ALL_LEVELS, score: position },
    Classifier { name: "local variable index", weight: 2.0, levels: ALL_LEVELS, score: lv_index },
    Classifier { name: "usage", weight: 8.0, levels: FULL_UP, score: usage },
    Classifier { name: "start position", weight: 2.0, levels: ALL_LEVELS, score: start_pos },
];

fn var_type(env: &Env<'_>, a: VarId, b: VarId) -> f64 {
    let g = env.graph;
    if ClassId::potentially_equal(env, g.var(a).var_type(), g.var(b).var_type()) {
        1.0
    } else {
        0.0
    }
}

fn siblings<'a>(env: &Env<'a>, var: VarId) -> &'a [VarId] {
    let v = env.graph.var(var);
    let method = env.graph.method(v.method());
    if v.is_arg() { method.args() } else { method.vars() }
}

fn position(env: &Env<'_>, a: VarId, b: VarId) -> f64 {
    let g = env.graph;
    let (list_a, list_b) = (siblings(env, a), siblings(env, b));
    let anchors = list_a.iter().filter_map(|v| {
        let peer = env.matches.var(*v)?;
        let pos_b = list_b.iter().position(|x| *x == peer)?;
        Some((g.var(*v).index(), pos_b))
    });
    compare_positions(
        g.var(a).index(),
        list_a.len(),
        g.var(b).index(),
        list_b.len(),
        anchors,
    )
}

fn lv_index(env: &Env<'_>, a: VarId, b: VarId) -> f64 {
    if env.graph.var(a).lv_index() == env.graph.var(b).lv_index() {
        1.0
    } else {
        0.0
    }
}

/// Instruction indices of `method` reading or writing `var`.
fn uses(env: &Env<'_>, method: MethodId, var: VarId) -> Vec<usize> {
    let g = env.graph;
    let insns = g.insns(method);
    let code_length = g.code(method).map_or(0, |c| c.code_length);
    insns
        .iter()
        .enumerate()
        .filter_map(|(i, insn)| {
            let slot = match insn.operand {
                Operand::Var(slot) | Operand::Iinc { slot, .. } => slot,
                _ => return None,
            };
            let next = insns.get(i + 1).map_or(code_length, |n| n.offset);
            (g.var_at(method, slot, insn.offset, next) == Some(var)).then_some(i)
        })
        .collect()
}

fn usage(env: &Env<'_>, a: VarId, b: VarId) -> f64 {
    let (ma, mb) = (env.graph.var(a).method(), env.graph.var(b).method());
    let uses_a = uses(env, ma, a);
    let uses_b = uses(env, mb, b);
    if uses_a.is_empty() && uses_b.is_empty() {
        return 1.0;
    }
    let map = insn_map(env, ma, mb);
    let agreeing = uses_a
        .iter()
        .filter(|i| map.get(**i).copied().flatten().is_some_and(|j| uses_b.contains(&j)))
        .count();
    2.0 * agreeing as f64 / (uses_a.len() + uses_b.len()) as f64
}

fn start_pos(env: &Env<'_>, a: VarId, b: VarId) -> f64 {
    let g = env.graph;
    let relative = |v: VarId| {
        let var = g.var(v);
        let length = g.code(var.method()).map_or(0, |c| c.code_length);
        if length == 0 { 0.0 } else { var.start() as f64 / length as f64 }
    };
    (1.0 - (relative(a) - relative(b)).abs()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::classfile::access;
    use crate::classfile::insn::op;
    use crate::extract::build_graph;
    use crate::graph::NamePatterns;
    use crate::matching::MatchTable;
    use crate::model::Side;
    use crate::testkit::ClassBuilder;

    #[test]
    fn usage_follows_the_instruction_alignment() -> anyhow::Result<()> {
        let class = |name: &str| {
            ClassBuilder::new(name)
                .method("m", "(II)I", access::STATIC, |code| {
                    code.var(op::ILOAD, 1).var(op::ISTORE, 2).var(op::ILOAD, 2).op(op::IRETURN);
                    code.local("t", "I", 2, 2, 0);
                })
                .build()
        };
        let g = build_graph(NamePatterns::default(), Vec::new(), vec![class("a")], vec![class("b")])?;
        let (cache, mut table) = (Cache::new(), MatchTable::default());
        let a = g.lookup(Side::A, "La;").expect("a");
        let b = g.lookup(Side::B, "Lb;").expect("b");
        table.classes.link(a, b);
        let (ma, mb) = (g.class(a).methods()[0], g.class(b).methods()[0]);
        table.methods.link(ma, mb);
        let env = Env {
            graph: &g,
            matches: &table,
            cache: &cache,
            assume_both: true,
        };

        let (args_a, args_b) = (g.method(ma).args(), g.method(mb).args());
        assert_eq!(usage(&env, args_a[1], args_b[1]), 1.0);
        // the first argument is never touched on either side
        assert_eq!(usage(&env, args_a[0], args_b[0]), 1.0);
        assert_eq!(usage(&env, args_a[1], args_b[0]), 0.0);

        let (var_a, var_b) = (g.method(ma).vars()[0], g.method(mb).vars()[0]);
        assert_eq!(usage(&env, var_a, var_b), 1.0);
        assert_eq!(start_pos(&env, var_a, var_b), 1.0);
        assert_eq!(lv_index(&env, var_a, var_b), 1.0);
        assert!((position(&env, args_a[0], args_b[1]) - 2.0 / 3.0).abs() < 1e-9);
        Ok(())
    }
}
