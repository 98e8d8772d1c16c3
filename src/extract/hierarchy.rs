use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::classfile::access;
use crate::graph::ClassGraph;
use crate::model::{GroupId, MethodId, MethodKind, Side};

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        // the lower index stays root so group numbering follows declaration order
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

/// Groups side-local, non-barrier methods sharing name and descriptor along each class's ancestry.
///
/// Shared-side supertypes are walked through but their methods never join a group.
pub(super) fn group_methods(graph: &mut ClassGraph) {
    let mut parent: Vec<usize> = (0..graph.method_count()).collect();

    for side in [Side::A, Side::B] {
        for &class in graph.classes(side) {
            if graph.class(class).is_array() {
                continue;
            }
            let mut first: HashMap<(&str, &str), MethodId> = HashMap::new();
            for ancestor in graph.ancestry(class) {
                if graph.class(ancestor).side() != side {
                    continue;
                }
                for &m in graph.class(ancestor).methods() {
                    let method = graph.method(m);
                    if method.is_barrier() {
                        continue;
                    }
                    match first.get(&(method.name(), method.desc())) {
                        Some(existing) => union(&mut parent, existing.index(), m.index()),
                        None => {
                            first.insert((method.name(), method.desc()), m);
                        }
                    }
                }
            }
        }
    }

    let mut root_group: HashMap<usize, GroupId> = HashMap::new();
    let mut groups: Vec<Vec<MethodId>> = Vec::new();
    for index in 0..graph.method_count() {
        let root = find(&mut parent, index);
        let group = *root_group.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            GroupId::new(groups.len() - 1)
        });
        groups[group.index()].push(MethodId::new(index));
        graph.methods[index].group = group;
    }
    graph.groups = groups;
}

/// Links every non-barrier side method to the nearest same-signature non-barrier
/// declarations above it, and un-obfuscates groups that override library methods.
pub(super) fn link_parents(graph: &mut ClassGraph) {
    let mut links: Vec<(MethodId, BTreeSet<MethodId>)> = Vec::new();

    for side in [Side::A, Side::B] {
        for &class in graph.classes(side) {
            let c = graph.class(class);
            if c.is_array() {
                continue;
            }
            for &m in c.methods() {
                let method = graph.method(m);
                if method.is_barrier() {
                    continue;
                }
                let mut parents = BTreeSet::new();
                let mut queue: VecDeque<_> = c.super_class().into_iter().chain(c.interfaces().iter().copied()).collect();
                let mut seen = HashSet::new();
                while let Some(k) = queue.pop_front() {
                    if !seen.insert(k) {
                        continue;
                    }
                    if let Some(p) = graph.method_by_id(k, method.name(), method.desc())
                        && !graph.method(p).is_barrier()
                    {
                        parents.insert(p);
                        continue;
                    }
                    let sup = graph.class(k);
                    queue.extend(sup.super_class());
                    queue.extend(sup.interfaces().iter().copied());
                }
                if !parents.is_empty() {
                    links.push((m, parents));
                }
            }
        }
    }

    let mut library_groups = HashSet::new();
    for (m, parents) in links {
        for &p in &parents {
            graph.methods[p.index()].children.insert(m);
            let owner = graph.class(graph.method(p).owner());
            if owner.side() == Side::Shared || !owner.is_input() {
                library_groups.insert(graph.method(m).group());
            }
        }
        graph.methods[m.index()].parents = parents;
    }

    for group in library_groups {
        for index in 0..graph.groups[group.index()].len() {
            let m = graph.groups[group.index()][index];
            graph.methods[m.index()].name_obfuscated = false;
        }
    }
}

/// Detects lambda implementation methods: synthetic, private and reached only via lambda call sites.
pub(super) fn classify_kinds(graph: &mut ClassGraph) {
    for method in &mut graph.methods {
        if method.kind != MethodKind::Other {
            continue;
        }
        let flags = access::SYNTHETIC | access::PRIVATE;
        if method.access & flags == flags
            && method.direct_refs_in.is_empty()
            && !method.lambda_refs_in.is_empty()
        {
            method.kind = MethodKind::LambdaImpl;
        }
    }
}
