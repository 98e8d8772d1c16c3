//! Fixed-point auto matching across strictness levels.
//!
//! Each pass ranks every unmatched side A subject against its candidates on
//! the worker pool, drops proposals that compete for the same destination and
//! commits the rest single-threaded through [`MatchState`].

use std::collections::HashMap;
use std::hash::Hash;

use rayon::ThreadPool;
use tracing::info;

use super::ops::MatchState;
use super::table::{MatchEntity, MatchTable};
use crate::cache::Cache;
use crate::classifier::{
    self, Classifier, ClassifierLevel, Env, PotentialEq, check_rank, max_mismatch, max_score, rank,
};
use crate::config::{MatcherConfig, Thresholds};
use crate::error::MatchError;
use crate::executor::{BatchControl, run_batch};
use crate::graph::ClassGraph;
use crate::model::{ClassId, FieldId, MethodId, Side, VarId};

type Commit<T> = fn(&mut MatchState<'_>, T, T) -> Result<(), MatchError>;

pub struct AutoMatcher<'a> {
    pub(crate) graph: &'a ClassGraph,
    pub(crate) table: &'a mut MatchTable,
    pub(crate) cache: &'a Cache,
    pub(crate) pool: &'a ThreadPool,
    pub(crate) config: &'a MatcherConfig,
    pub(crate) control: &'a BatchControl,
    pub(crate) assume_both: bool,
}

/// Subjects of one pass: each unit ranks `subject` against `pools[pool]`.
struct Units<T> {
    units: Vec<(T, usize)>,
    pools: Vec<Vec<T>>,
}

impl<T> Units<T> {
    fn new() -> Self {
        Self {
            units: Vec::new(),
            pools: Vec::new(),
        }
    }

    fn push(&mut self, subjects: Vec<T>, candidates: Vec<T>) {
        if subjects.is_empty() || candidates.is_empty() {
            return;
        }
        let pool = self.pools.len();
        self.pools.push(candidates);
        self.units.extend(subjects.into_iter().map(|s| (s, pool)));
    }
}

/// Drops every proposal whose destination is claimed more than once.
pub(crate) fn sanitize<T: Copy + Eq + Hash>(proposals: Vec<(T, T)>) -> Vec<(T, T)> {
    let mut claims: HashMap<T, usize> = HashMap::new();
    for (_, dst) in &proposals {
        *claims.entry(*dst).or_default() += 1;
    }
    proposals
        .into_iter()
        .filter(|(_, dst)| claims.get(dst) == Some(&1))
        .collect()
}

impl<'a> AutoMatcher<'a> {
    fn env(&self) -> Env<'_> {
        Env {
            graph: self.graph,
            matches: self.table,
            cache: self.cache,
            assume_both: self.assume_both,
        }
    }

    /// Whether `id` may take part in an automatic match.
    fn eligible<T: MatchEntity>(&self, id: T) -> bool {
        let links = T::links(self.table);
        links.peer(id).is_none()
            && links.is_matchable(id)
            && (!self.assume_both || id.is_name_obfuscated(self.graph))
    }

    fn auto_class(&self, class: ClassId) -> bool {
        let c = self.graph.class(class);
        c.is_real() && c.is_input() && !c.is_array() && self.eligible(class)
    }

    pub fn auto_match_all(&mut self) -> Result<(), MatchError> {
        if self.auto_match_classes(ClassifierLevel::Initial)? {
            self.auto_match_classes(ClassifierLevel::Initial)?;
        }
        for level in [
            ClassifierLevel::Intermediate,
            ClassifierLevel::Full,
            ClassifierLevel::Extra,
        ] {
            self.auto_match_level(level)?;
        }
        loop {
            let args = self.auto_match_args(ClassifierLevel::Full)?;
            let vars = self.auto_match_vars(ClassifierLevel::Full)?;
            if !args && !vars {
                break;
            }
        }
        Ok(())
    }

    fn auto_match_level(&mut self, level: ClassifierLevel) -> Result<(), MatchError> {
        let mut classes_before = true;
        loop {
            let methods = self.auto_match_methods(level)?;
            let fields = self.auto_match_fields(level)?;
            let mut matched_any = methods || fields;
            if !matched_any && !classes_before {
                break;
            }
            classes_before = self.auto_match_classes(level)?;
            matched_any |= classes_before;
            if !matched_any {
                break;
            }
        }
        Ok(())
    }

    pub fn auto_match_classes(&mut self, level: ClassifierLevel) -> Result<bool, MatchError> {
        let g = self.graph;
        let mut units = Units::new();
        let subjects: Vec<ClassId> = g.classes(Side::A).iter().copied().filter(|c| self.auto_class(*c)).collect();
        let candidates: Vec<ClassId> = g.classes(Side::B).iter().copied().filter(|c| self.auto_class(*c)).collect();
        units.push(subjects, candidates);
        self.run_pass(
            "classes",
            units,
            classifier::class::CLASSIFIERS,
            level,
            self.config.classes,
            |state, a, b| state.match_classes(a, b),
        )
    }

    fn matched_classes(&self) -> Vec<(ClassId, ClassId)> {
        self.graph
            .classes(Side::A)
            .iter()
            .filter_map(|a| self.table.class(*a).map(|b| (*a, b)))
            .collect()
    }

    pub fn auto_match_methods(&mut self, level: ClassifierLevel) -> Result<bool, MatchError> {
        let g = self.graph;
        let mut units = Units::new();
        for (a, b) in self.matched_classes() {
            let pick = |c: ClassId| -> Vec<MethodId> { g.real_methods(c).filter(|m| self.eligible(*m)).collect() };
            units.push(pick(a), pick(b));
        }
        self.run_pass(
            "methods",
            units,
            classifier::method::CLASSIFIERS,
            level,
            self.config.methods,
            |state, a, b| state.match_methods(a, b),
        )
    }

    pub fn auto_match_fields(&mut self, level: ClassifierLevel) -> Result<bool, MatchError> {
        let g = self.graph;
        let mut units = Units::new();
        for (a, b) in self.matched_classes() {
            let pick = |c: ClassId| -> Vec<FieldId> { g.real_fields(c).filter(|f| self.eligible(*f)).collect() };
            units.push(pick(a), pick(b));
        }
        self.run_pass(
            "fields",
            units,
            classifier::field::CLASSIFIERS,
            level,
            self.config.fields,
            |state, a, b| state.match_fields(a, b),
        )
    }

    fn var_units(&self, args: bool) -> Units<VarId> {
        let g = self.graph;
        let mut units = Units::new();
        for (a, b) in self.table.methods().pairs() {
            let (a, b) = if g.method_side(a) == Side::A { (a, b) } else { (b, a) };
            let pick = |m: MethodId| -> Vec<VarId> {
                let method = g.method(m);
                let list = if args { method.args() } else { method.vars() };
                list.iter().copied().filter(|v| self.eligible(*v)).collect()
            };
            units.push(pick(a), pick(b));
        }
        units
    }

    pub fn auto_match_args(&mut self, level: ClassifierLevel) -> Result<bool, MatchError> {
        let units = self.var_units(true);
        self.run_pass(
            "args",
            units,
            classifier::var::CLASSIFIERS,
            level,
            self.config.args,
            |state, a, b| state.match_vars(a, b),
        )
    }

    pub fn auto_match_vars(&mut self, level: ClassifierLevel) -> Result<bool, MatchError> {
        let units = self.var_units(false);
        self.run_pass(
            "vars",
            units,
            classifier::var::CLASSIFIERS,
            level,
            self.config.vars,
            |state, a, b| state.match_vars(a, b),
        )
    }

    fn run_pass<T: PotentialEq>(
        &mut self,
        kind: &'static str,
        units: Units<T>,
        table: &[Classifier<T>],
        level: ClassifierLevel,
        thresholds: Thresholds,
        commit: Commit<T>,
    ) -> Result<bool, MatchError> {
        let total = units.units.len();
        if total == 0 {
            return Ok(false);
        }
        let max = max_score(table, level);
        let max_mismatch = max_mismatch(max, thresholds);

        let proposals = {
            let env = self.env();
            let results = run_batch(self.pool, &units.units, self.control, |(src, pool)| {
                let ranking = rank(&env, *src, &units.pools[*pool], table, level, max_mismatch);
                check_rank(&ranking, thresholds, max).then(|| ranking[0].subject)
            })?;
            results
                .into_iter()
                .map(|(index, dst)| (units.units[index].0, dst))
                .collect::<Vec<_>>()
        };
        let proposals = sanitize(proposals);

        let mut state = MatchState::new(self.graph, self.table, self.cache);
        let mut matched = 0;
        for (a, b) in proposals {
            let links = T::links(state.table());
            if links.peer(a).is_some() || links.peer(b).is_some() {
                continue;
            }
            commit(&mut state, a, b)?;
            matched += 1;
        }

        info!(
            level = ?level,
            "auto matched {matched} {kind} ({} unmatched, {total} total)",
            total - matched
        );
        Ok(matched > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contested_destinations_are_dropped() {
        let proposals = vec![(1, 10), (2, 20), (3, 10), (4, 30)];
        assert_eq!(sanitize(proposals), vec![(2, 20), (4, 30)]);
    }
}
