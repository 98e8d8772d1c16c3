//! The matching session: one loaded project, its match state and the worker pool.
//!
//! Structural data is fixed once [`Session::load`] returns; afterwards only
//! matches, matchable flags and name variants change.

use anyhow::{Context, Result};
use rayon::ThreadPool;
use tracing::info;

use crate::archive::InputFile;
use crate::cache::Cache;
use crate::classifier::{
    self, ClassifierLevel, Env, PotentialEq, RankResult, Classifier, rank,
};
use crate::config::{MatcherConfig, ProjectConfig};
use crate::error::MatchError;
use crate::executor::{BatchControl, build_pool};
use crate::extract::FeatureExtractor;
use crate::graph::ClassGraph;
use crate::matching::{
    self, AutoMatcher, MatchEntity, MatchRecord, MatchState, MatchStatus, MatchTable,
};
use crate::model::{ClassId, EntityRef, FieldId, MethodId, NameType, Side, VarId};
use crate::propagate::{self, RemapTable, UidCounters};

pub struct Session {
    graph: ClassGraph,
    matches: MatchTable,
    cache: Cache,
    config: MatcherConfig,
    inputs: Vec<InputFile>,
    uids: UidCounters,
    pool: ThreadPool,
    assume_both: bool,
}

fn seed_uids(config: &MatcherConfig) -> UidCounters {
    UidCounters {
        class: config.next_class_uid,
        method: config.next_method_uid,
        field: config.next_field_uid,
    }
}

impl Session {
    pub fn new(config: MatcherConfig) -> Result<Self> {
        let pool = build_pool(config.threads)?;
        Ok(Self {
            graph: ClassGraph::default(),
            matches: MatchTable::default(),
            cache: Cache::new(),
            uids: seed_uids(&config),
            config,
            inputs: Vec::new(),
            pool,
            assume_both: true,
        })
    }

    /// Wraps an already built graph, e.g. one produced by [`crate::extract::build_graph`].
    pub fn from_graph(graph: ClassGraph, config: MatcherConfig, assume_both: bool) -> Result<Self> {
        let mut session = Self::new(config)?;
        session.graph = graph;
        session.assume_both = assume_both;
        Ok(session)
    }

    /// Drops every loaded class and match.
    pub fn reset(&mut self) {
        self.graph = ClassGraph::default();
        self.matches.clear();
        self.cache.clear();
        self.inputs.clear();
        self.uids = seed_uids(&self.config);
    }

    /// Loads the project's archives; on failure the session is left empty.
    pub fn load(&mut self, project: &ProjectConfig) -> Result<()> {
        self.reset();
        if let Err(e) = self.try_load(project) {
            self.reset();
            return Err(e);
        }
        Ok(())
    }

    fn try_load(&mut self, project: &ProjectConfig) -> Result<()> {
        let graph = FeatureExtractor::new(&self.pool)
            .load(project)
            .context("Failed to load project inputs")?;

        let mut inputs = Vec::new();
        for side in [Side::A, Side::B] {
            for path in project.inputs(side) {
                inputs.push(InputFile::fingerprint(path)?);
            }
        }

        self.graph = graph;
        self.inputs = inputs;
        self.assume_both = project.assume_both_or_none_obfuscated;
        info!(
            inputs = self.inputs.len(),
            classes = self.graph.class_count(),
            methods = self.graph.method_count(),
            fields = self.graph.field_count(),
            "session loaded"
        );
        Ok(())
    }

    pub fn graph(&self) -> &ClassGraph {
        &self.graph
    }

    pub fn matches(&self) -> &MatchTable {
        &self.matches
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn inputs(&self) -> &[InputFile] {
        &self.inputs
    }

    pub fn uid_counters(&self) -> UidCounters {
        self.uids
    }

    pub fn assume_both(&self) -> bool {
        self.assume_both
    }

    pub fn env(&self) -> Env<'_> {
        Env {
            graph: &self.graph,
            matches: &self.matches,
            cache: &self.cache,
            assume_both: self.assume_both,
        }
    }

    pub fn state(&mut self) -> MatchState<'_> {
        MatchState::new(&self.graph, &mut self.matches, &self.cache)
    }

    /// Finds a class by internal name (`pkg/Cls`) or descriptor (`Lpkg/Cls;`).
    pub fn find_class(&self, side: Side, name: &str) -> Option<ClassId> {
        let desc = if name.starts_with('[') || (name.starts_with('L') && name.ends_with(';')) {
            name.to_string()
        } else {
            format!("L{name};")
        };
        self.graph.lookup(side, &desc)
    }

    pub fn match_classes(&mut self, a: ClassId, b: ClassId) -> Result<(), MatchError> {
        self.state().match_classes(a, b)
    }

    pub fn match_methods(&mut self, a: MethodId, b: MethodId) -> Result<(), MatchError> {
        self.state().match_methods(a, b)
    }

    pub fn match_fields(&mut self, a: FieldId, b: FieldId) -> Result<(), MatchError> {
        self.state().match_fields(a, b)
    }

    pub fn match_vars(&mut self, a: VarId, b: VarId) -> Result<(), MatchError> {
        self.state().match_vars(a, b)
    }

    pub fn unmatch_class(&mut self, class: ClassId) {
        self.state().unmatch_class(class);
    }

    pub fn unmatch_method(&mut self, method: MethodId) {
        self.state().unmatch_method(method);
    }

    pub fn unmatch_field(&mut self, field: FieldId) {
        self.state().unmatch_field(field);
    }

    pub fn unmatch_var(&mut self, var: VarId) {
        self.state().unmatch_var(var);
    }

    pub fn set_class_matchable(&mut self, class: ClassId, matchable: bool) {
        self.state().set_class_matchable(class, matchable);
    }

    pub fn set_method_matchable(&mut self, method: MethodId, matchable: bool) {
        self.state().set_method_matchable(method, matchable);
    }

    pub fn set_field_matchable(&mut self, field: FieldId, matchable: bool) {
        self.state().set_field_matchable(field, matchable);
    }

    pub fn set_var_matchable(&mut self, var: VarId, matchable: bool) {
        self.state().set_var_matchable(var, matchable);
    }

    pub fn match_unobfuscated(&mut self) -> usize {
        self.state().match_unobfuscated()
    }

    fn auto(&mut self, control: &BatchControl, run: impl FnOnce(&mut AutoMatcher<'_>) -> Result<bool, MatchError>) -> Result<bool, MatchError> {
        let mut auto = AutoMatcher {
            graph: &self.graph,
            table: &mut self.matches,
            cache: &self.cache,
            pool: &self.pool,
            config: &self.config,
            control,
            assume_both: self.assume_both,
        };
        run(&mut auto)
    }

    /// Runs every automatic matching pass to a fixed point.
    pub fn auto_match_all(&mut self, control: &BatchControl) -> Result<(), MatchError> {
        self.auto(control, |auto| auto.auto_match_all().map(|()| true))?;
        Ok(())
    }

    pub fn auto_match_classes(&mut self, level: ClassifierLevel, control: &BatchControl) -> Result<bool, MatchError> {
        self.auto(control, |auto| auto.auto_match_classes(level))
    }

    pub fn auto_match_members(&mut self, level: ClassifierLevel, control: &BatchControl) -> Result<bool, MatchError> {
        self.auto(control, |auto| {
            let methods = auto.auto_match_methods(level)?;
            let fields = auto.auto_match_fields(level)?;
            Ok(methods || fields)
        })
    }

    pub fn auto_match_vars(&mut self, level: ClassifierLevel, control: &BatchControl) -> Result<bool, MatchError> {
        self.auto(control, |auto| {
            let args = auto.auto_match_args(level)?;
            let vars = auto.auto_match_vars(level)?;
            Ok(args || vars)
        })
    }

    fn rank_against<T: PotentialEq>(
        &self,
        subject: T,
        candidates: &[T],
        table: &[Classifier<T>],
        level: ClassifierLevel,
    ) -> Vec<RankResult<T>> {
        rank(&self.env(), subject, candidates, table, level, f64::INFINITY)
    }

    /// Real input classes of `side`, arrays excluded.
    fn input_classes(&self, side: Side) -> impl Iterator<Item = ClassId> + '_ {
        self.graph.classes(side).iter().copied().filter(|c| {
            let class = self.graph.class(*c);
            class.is_real() && class.is_input() && !class.is_array()
        })
    }

    /// Classes on the other side an entity of `owner` may pair with: the owner's match, else every input class.
    fn candidate_owners(&self, owner: ClassId) -> Vec<ClassId> {
        match self.matches.class(owner) {
            Some(peer) => vec![peer],
            None => self.input_classes(self.graph.class(owner).side().opposite()).collect(),
        }
    }

    /// Scores every opposite side input class against `class` with a full per-classifier breakdown.
    pub fn rank_class(&self, class: ClassId, level: ClassifierLevel) -> Vec<RankResult<ClassId>> {
        let side = self.graph.class(class).side();
        if side == Side::Shared {
            return Vec::new();
        }
        let candidates: Vec<ClassId> = self.input_classes(side.opposite()).collect();
        self.rank_against(class, &candidates, classifier::class::CLASSIFIERS, level)
    }

    pub fn rank_method(&self, method: MethodId, level: ClassifierLevel) -> Vec<RankResult<MethodId>> {
        if method.side(&self.graph) == Side::Shared {
            return Vec::new();
        }
        let candidates: Vec<MethodId> = self
            .candidate_owners(self.graph.method(method).owner())
            .into_iter()
            .flat_map(|c| self.graph.real_methods(c))
            .collect();
        self.rank_against(method, &candidates, classifier::method::CLASSIFIERS, level)
    }

    pub fn rank_field(&self, field: FieldId, level: ClassifierLevel) -> Vec<RankResult<FieldId>> {
        if field.side(&self.graph) == Side::Shared {
            return Vec::new();
        }
        let candidates: Vec<FieldId> = self
            .candidate_owners(self.graph.field(field).owner())
            .into_iter()
            .flat_map(|c| self.graph.real_fields(c))
            .collect();
        self.rank_against(field, &candidates, classifier::field::CLASSIFIERS, level)
    }

    /// Ranks against the same-kind variables of the matched method; empty while the method is unmatched.
    pub fn rank_var(&self, var: VarId, level: ClassifierLevel) -> Vec<RankResult<VarId>> {
        let v = self.graph.var(var);
        let Some(peer) = self.matches.method(v.method()) else {
            return Vec::new();
        };
        let peer = self.graph.method(peer);
        let candidates = if v.is_arg() { peer.args() } else { peer.vars() };
        self.rank_against(var, candidates, classifier::var::CLASSIFIERS, level)
    }

    pub fn status(&self, inputs_only: bool) -> MatchStatus {
        MatchStatus::collect(&self.graph, &self.matches, inputs_only)
    }

    pub fn match_records(&self) -> Vec<MatchRecord> {
        matching::match_records(&self.graph, &self.matches)
    }

    pub fn apply_match_records(&mut self, records: &[MatchRecord]) -> Result<usize, MatchError> {
        let mut state = MatchState::new(&self.graph, &mut self.matches, &self.cache);
        matching::apply_match_records(&mut state, &self.graph, records)
    }

    pub fn propagate_names(&mut self, from: Side) -> usize {
        propagate::propagate_names(&mut self.graph, &self.matches, from)
    }

    pub fn assign_uids(&mut self) -> usize {
        propagate::assign_uids(&mut self.graph, &self.matches, &mut self.uids)
    }

    pub fn remap_table(&self, side: Side, ty: NameType) -> RemapTable {
        propagate::remap_table(&self.graph, side, ty)
    }

    pub fn name(&self, entity: impl Into<EntityRef>, ty: NameType) -> Option<String> {
        self.graph.display_name(entity.into(), ty)
    }

    pub fn set_mapped_name(&mut self, entity: impl Into<EntityRef>, name: Option<String>) {
        self.graph.names_mut(entity.into()).mapped = name;
    }

    pub fn set_aux_name(&mut self, entity: impl Into<EntityRef>, index: usize, name: Option<String>) {
        self.graph.names_mut(entity.into()).set_aux(index, name);
    }

    pub fn set_uid(&mut self, entity: impl Into<EntityRef>, uid: Option<u32>) {
        self.graph.names_mut(entity.into()).uid = uid;
    }

    pub fn set_comment(&mut self, entity: impl Into<EntityRef>, comment: Option<String>) {
        self.graph.names_mut(entity.into()).comment = comment;
    }
}
