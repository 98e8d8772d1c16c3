use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::LoadError;
use crate::graph::NamePatterns;
use crate::model::Side;

pub const PROJECT_ENV: &str = "CLASS_MATCHER_PROJECT";

/// Inputs and obfuscation settings of a matching project, read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub inputs_a: Vec<PathBuf>,
    pub inputs_b: Vec<PathBuf>,
    pub classpath_a: Vec<PathBuf>,
    pub classpath_b: Vec<PathBuf>,
    pub shared_classpath: Vec<PathBuf>,
    /// Full-match regex over internal class names (`pkg/Cls`) that are not obfuscated.
    pub non_obfuscated_class_pattern_a: Option<String>,
    pub non_obfuscated_class_pattern_b: Option<String>,
    pub non_obfuscated_member_pattern_a: Option<String>,
    pub non_obfuscated_member_pattern_b: Option<String>,
    pub assume_both_or_none_obfuscated: bool,
    pub matcher: MatcherConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            inputs_a: Vec::new(),
            inputs_b: Vec::new(),
            classpath_a: Vec::new(),
            classpath_b: Vec::new(),
            shared_classpath: Vec::new(),
            non_obfuscated_class_pattern_a: None,
            non_obfuscated_class_pattern_b: None,
            non_obfuscated_member_pattern_a: None,
            non_obfuscated_member_pattern_b: None,
            assume_both_or_none_obfuscated: true,
            matcher: MatcherConfig::default(),
        }
    }
}

impl ProjectConfig {
    /// Reads a project file; relative paths are resolved against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project file: {}", path.display()))?;
        let mut config: ProjectConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse project file: {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));
        config.resolve_relative(base);
        Ok(config)
    }

    fn resolve_relative(&mut self, base: &Path) {
        for list in [
            &mut self.inputs_a,
            &mut self.inputs_b,
            &mut self.classpath_a,
            &mut self.classpath_b,
            &mut self.shared_classpath,
        ] {
            for p in list.iter_mut() {
                if p.is_relative() {
                    *p = base.join(&*p);
                }
            }
        }
    }

    pub fn inputs(&self, side: Side) -> &[PathBuf] {
        match side {
            Side::A => &self.inputs_a,
            Side::B => &self.inputs_b,
            Side::Shared => &[],
        }
    }

    pub fn classpath(&self, side: Side) -> &[PathBuf] {
        match side {
            Side::A => &self.classpath_a,
            Side::B => &self.classpath_b,
            Side::Shared => &self.shared_classpath,
        }
    }

    pub fn patterns(&self) -> Result<NamePatterns, LoadError> {
        NamePatterns::new(
            self.non_obfuscated_class_pattern_a.as_deref(),
            self.non_obfuscated_member_pattern_a.as_deref(),
            self.non_obfuscated_class_pattern_b.as_deref(),
            self.non_obfuscated_member_pattern_b.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub absolute: f64,
    pub relative: f64,
}

impl Thresholds {
    pub const fn new(absolute: f64, relative: f64) -> Self {
        Self { absolute, relative }
    }
}

/// Ranking thresholds, worker count and uid counter seeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub classes: Thresholds,
    pub methods: Thresholds,
    pub fields: Thresholds,
    pub args: Thresholds,
    pub vars: Thresholds,
    /// Worker threads; `None` uses the available parallelism.
    pub threads: Option<usize>,
    pub next_class_uid: u32,
    pub next_method_uid: u32,
    pub next_field_uid: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            classes: Thresholds::new(0.8, 0.08),
            methods: Thresholds::new(0.8, 0.08),
            fields: Thresholds::new(0.8, 0.08),
            args: Thresholds::new(0.85, 0.085),
            vars: Thresholds::new(0.85, 0.085),
            threads: None,
            next_class_uid: 1,
            next_method_uid: 1,
            next_field_uid: 1,
        }
    }
}

pub fn resolve_project_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.project.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var(PROJECT_ENV) {
        return Ok(PathBuf::from(p));
    }

    anyhow::bail!("No project file given; pass --project or set {PROJECT_ENV}")
}

pub fn resolve_matcher_config(cli: &Cli, project: &ProjectConfig) -> MatcherConfig {
    let mut config = project.matcher.clone();
    if cli.threads.is_some() {
        config.threads = cli.threads;
    }
    config
}
