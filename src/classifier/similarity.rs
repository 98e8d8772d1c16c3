//! Set, count and ordered-list similarity measures in `[0, 1]`.

use std::collections::BTreeSet;

use super::{Env, PotentialEq};

/// Outcome of comparing two list elements.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompareResult {
    Similar,
    Possible,
    Distinct,
}

impl CompareResult {
    fn cost(self) -> usize {
        match self {
            CompareResult::Similar => 0,
            CompareResult::Possible => 1,
            CompareResult::Distinct => 2,
        }
    }
}

const INDEL_COST: usize = 2;

/// Similarity of two entity sets accounting for existing matches and potential equality.
///
/// Identical elements and matched pairs cancel out; whatever remains must find
/// a potentially equal partner on the other side or counts as unmatched.
pub fn compare_identity_sets<T: PotentialEq>(env: &Env<'_>, a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return if a.is_empty() && b.is_empty() { 1.0 } else { 0.0 };
    }

    let total = a.len() + b.len();
    let mut unmatched = 0;
    let mut rest_a = Vec::new();
    let mut rest_b: BTreeSet<T> = b.clone();

    for &item in a {
        if rest_b.remove(&item) {
            continue;
        }
        if let Some(peer) = T::links(env.matches).peer(item) {
            if !rest_b.remove(&peer) {
                unmatched += 1;
            }
        } else if env.assume_both && !item.is_name_obfuscated(env.graph) {
            unmatched += 1;
        } else {
            rest_a.push(item);
        }
    }

    let before = rest_b.len();
    if env.assume_both {
        rest_b.retain(|item| item.is_name_obfuscated(env.graph));
    }
    unmatched += before - rest_b.len();

    for &item in &rest_a {
        if !rest_b.iter().any(|other| T::potentially_equal(env, item, *other)) {
            unmatched += 1;
        }
    }
    for &item in &rest_b {
        if !rest_a.iter().any(|other| T::potentially_equal(env, *other, item)) {
            unmatched += 1;
        }
    }

    (total - unmatched) as f64 / total as f64
}

/// 1 when both are absent or potentially equal, 0 otherwise.
pub fn compare_nullable<T: PotentialEq>(env: &Env<'_>, a: Option<T>, b: Option<T>) -> f64 {
    match (a, b) {
        (None, None) => 1.0,
        (Some(a), Some(b)) if T::potentially_equal(env, a, b) => 1.0,
        _ => 0.0,
    }
}

/// Jaccard-style similarity of two plain value sets; two empty sets are identical.
pub fn compare_sets<V: Ord>(a: &BTreeSet<V>, b: &BTreeSet<V>) -> f64 {
    let shared = a.intersection(b).count();
    let total = a.len() + b.len() - shared;
    if total == 0 {
        1.0
    } else {
        shared as f64 / total as f64
    }
}

pub fn compare_counts(a: usize, b: usize) -> f64 {
    let max = a.max(b);
    if max == 0 {
        return 1.0;
    }
    1.0 - a.abs_diff(b) as f64 / max as f64
}

/// Agreement of two positions within their sibling lists.
///
/// `anchors` are already matched sibling pairs `(pos_a, pos_b)`; the nearest
/// anchors around `pos_a` bound the window both positions are expressed in.
/// A `pos_b` outside the corresponding window scores zero.
pub fn compare_positions(
    pos_a: usize,
    len_a: usize,
    pos_b: usize,
    len_b: usize,
    anchors: impl IntoIterator<Item = (usize, usize)>,
) -> f64 {
    let (mut lo_a, mut lo_b) = (-1.0, -1.0);
    let (mut hi_a, mut hi_b) = (len_a as f64, len_b as f64);
    for (ia, ib) in anchors {
        let (fa, fb) = (ia as f64, ib as f64);
        if ia < pos_a && fa > lo_a {
            lo_a = fa;
            lo_b = fb;
        } else if ia > pos_a && fa < hi_a {
            hi_a = fa;
            hi_b = fb;
        }
    }

    let pb = pos_b as f64;
    if pb <= lo_b || pb >= hi_b {
        return 0.0;
    }
    let rel_a = (pos_a as f64 - lo_a) / (hi_a - lo_a);
    let rel_b = (pb - lo_b) / (hi_b - lo_b);
    (1.0 - (rel_a - rel_b).abs()).clamp(0.0, 1.0)
}

/// Edit-distance similarity of two ordered lists under an element comparator.
pub fn compare_lists<A, B>(a: &[A], b: &[B], mut cmp: impl FnMut(usize, usize) -> CompareResult) -> f64 {
    let (n, m) = (a.len(), b.len());
    let longest = n.max(m);
    if longest == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=m).map(|j| j * INDEL_COST).collect();
    let mut cur = vec![0; m + 1];
    for i in 1..=n {
        cur[0] = i * INDEL_COST;
        for j in 1..=m {
            let keep = prev[j - 1] + cmp(i - 1, j - 1).cost();
            cur[j] = keep
                .min(prev[j] + INDEL_COST)
                .min(cur[j - 1] + INDEL_COST);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let distance = prev[m];
    1.0 - distance as f64 / (INDEL_COST * longest) as f64
}

/// Aligns two lists, mapping each index of `a` to an index of `b` or `None`.
///
/// Pairs aligned at `Distinct` cost are reported as unmapped.
pub fn map_lists<A, B>(
    a: &[A],
    b: &[B],
    mut cmp: impl FnMut(usize, usize) -> CompareResult,
) -> Vec<Option<usize>> {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    let mut dist = vec![0usize; (n + 1) * width];
    for i in 0..=n {
        dist[i * width] = i * INDEL_COST;
    }
    for j in 0..=m {
        dist[j] = j * INDEL_COST;
    }
    for i in 1..=n {
        for j in 1..=m {
            let keep = dist[(i - 1) * width + j - 1] + cmp(i - 1, j - 1).cost();
            let del = dist[(i - 1) * width + j] + INDEL_COST;
            let ins = dist[i * width + j - 1] + INDEL_COST;
            dist[i * width + j] = keep.min(del).min(ins);
        }
    }

    let mut mapping = vec![None; n];
    let (mut i, mut j) = (n, m);
    while i > 0 && j > 0 {
        let here = dist[i * width + j];
        let keep = dist[(i - 1) * width + j - 1];
        let del = dist[(i - 1) * width + j];
        let ins = dist[i * width + j - 1];
        if keep <= del && keep <= ins {
            if here - keep < CompareResult::Distinct.cost() {
                mapping[i - 1] = Some(j - 1);
            }
            i -= 1;
            j -= 1;
        } else if del < ins {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::classfile::ClassFile;
    use crate::extract::build_graph;
    use crate::graph::{ClassGraph, NamePatterns};
    use crate::matching::MatchTable;
    use crate::model::{ClassId, Side};
    use crate::testkit::ClassBuilder;

    fn eq_cmp<'a>(a: &'a [char], b: &'a [char]) -> impl FnMut(usize, usize) -> CompareResult + 'a {
        move |i, j| {
            if a[i] == b[j] {
                CompareResult::Similar
            } else {
                CompareResult::Distinct
            }
        }
    }

    #[test]
    fn plain_sets_and_counts() {
        let a: BTreeSet<_> = ["x", "y", "z"].into_iter().collect();
        let b: BTreeSet<_> = ["y", "z", "w"].into_iter().collect();
        assert_eq!(compare_sets(&a, &b), 0.5);
        assert_eq!(compare_sets::<i32>(&BTreeSet::new(), &BTreeSet::new()), 1.0);
        assert_eq!(compare_counts(0, 0), 1.0);
        assert_eq!(compare_counts(3, 4), 0.75);
        assert_eq!(compare_counts(0, 5), 0.0);
    }

    #[test]
    fn list_similarity_is_normalized_edit_distance() {
        let a = ['a', 'b', 'c', 'd'];
        let b = ['a', 'c', 'd'];
        // one deletion: 1 - 2 / 8
        assert_eq!(compare_lists(&a, &b, eq_cmp(&a, &b)), 0.75);
        assert_eq!(compare_lists(&a, &a, eq_cmp(&a, &a)), 1.0);
        let empty: [char; 0] = [];
        assert_eq!(compare_lists(&empty, &empty, |_, _| CompareResult::Distinct), 1.0);
        assert_eq!(compare_lists(&a, &empty, |_, _| CompareResult::Distinct), 0.0);
    }

    #[test]
    fn possible_pairs_cost_half_a_substitution() {
        let a = [1];
        let b = [2];
        assert_eq!(compare_lists(&a, &b, |_, _| CompareResult::Possible), 0.5);
    }

    #[test]
    fn positions_are_relative_to_the_nearest_anchors() {
        assert_eq!(compare_positions(1, 3, 1, 3, Vec::new()), 1.0);
        // anchor (2, 2): both sit in the same window before it
        assert_eq!(compare_positions(1, 3, 1, 6, [(2, 2)]), 1.0);
        assert_eq!(compare_positions(1, 3, 5, 6, [(2, 2)]), 0.0);
        assert!(compare_positions(0, 4, 3, 4, Vec::new()) < 0.5);
    }

    #[test]
    fn alignment_skips_inserted_and_distinct_elements() {
        let a = ['a', 'b', 'c', 'd'];
        let b = ['a', 'x', 'c', 'y', 'd'];
        let map = map_lists(&a, &b, eq_cmp(&a, &b));
        assert_eq!(map, vec![Some(0), None, Some(2), Some(4)]);
    }

    fn classes() -> anyhow::Result<ClassGraph> {
        let patterns = NamePatterns::new(Some("keep/.*"), None, Some("keep/.*"), None)?;
        let build = |names: &[&str]| -> Vec<ClassFile> {
            names.iter().map(|n| ClassBuilder::new(n).build()).collect()
        };
        let a = build(&["keep/K", "o1", "o2"]);
        let b = build(&["keep/K", "keep/L", "p1", "p2"]);
        Ok(build_graph(patterns, Vec::new(), a, b)?)
    }

    fn set(g: &ClassGraph, side: Side, names: &[&str]) -> BTreeSet<ClassId> {
        names
            .iter()
            .map(|n| g.lookup(side, &format!("L{n};")).expect("class"))
            .collect()
    }

    #[test]
    fn identity_sets_bounds() -> anyhow::Result<()> {
        let g = classes()?;
        let (cache, mut table) = (Cache::new(), MatchTable::default());
        let env = Env {
            graph: &g,
            matches: &table,
            cache: &cache,
            assume_both: true,
        };
        let empty = BTreeSet::new();
        let o1 = set(&g, Side::A, &["o1"]);
        let p1 = set(&g, Side::B, &["p1"]);
        assert_eq!(compare_identity_sets(&env, &empty, &empty), 1.0);
        assert_eq!(compare_identity_sets(&env, &o1, &o1), 1.0);
        assert_eq!(compare_identity_sets(&env, &o1, &empty), 0.0);
        assert_eq!(compare_identity_sets(&env, &o1, &p1), 1.0);

        // nothing on the other side can still be paired with o1
        let p1_id = g.lookup(Side::B, "Lp1;").expect("p1");
        table.classes.set_matchable(p1_id, false);
        let env = Env {
            graph: &g,
            matches: &table,
            cache: &cache,
            assume_both: true,
        };
        assert_eq!(compare_identity_sets(&env, &o1, &p1), 0.0);
        Ok(())
    }

    #[test]
    fn matched_elements_only_pair_with_their_peer() -> anyhow::Result<()> {
        let g = classes()?;
        let (cache, mut table) = (Cache::new(), MatchTable::default());
        let o1 = set(&g, Side::A, &["o1"]);
        let p1 = set(&g, Side::B, &["p1"]);
        let p2 = set(&g, Side::B, &["p2"]);
        table.classes.link(
            g.lookup(Side::A, "Lo1;").expect("o1"),
            g.lookup(Side::B, "Lp1;").expect("p1"),
        );
        let env = Env {
            graph: &g,
            matches: &table,
            cache: &cache,
            assume_both: true,
        };
        assert_eq!(compare_identity_sets(&env, &o1, &p1), 1.0);
        assert_eq!(compare_identity_sets(&env, &o1, &p2), 0.0);
        Ok(())
    }

    #[test]
    fn plain_names_drop_out_when_obfuscation_is_symmetric() -> anyhow::Result<()> {
        let g = classes()?;
        let (cache, table) = (Cache::new(), MatchTable::default());
        let a = set(&g, Side::A, &["keep/K", "o2"]);
        let b = set(&g, Side::B, &["keep/L", "p2"]);
        let mut env = Env {
            graph: &g,
            matches: &table,
            cache: &cache,
            assume_both: true,
        };
        // keep/K and keep/L count as unmatched, o2 pairs with p2
        assert_eq!(compare_identity_sets(&env, &a, &b), 0.5);
        env.assume_both = false;
        assert_eq!(compare_identity_sets(&env, &a, &b), 1.0);
        Ok(())
    }
}
