use anyhow::{Context, Result};
use clap::Parser;
use class_matcher::archive::InputFile;
use class_matcher::classifier::{self, ClassifierLevel, ClassifierResult, max_score, normalized_score};
use class_matcher::cli::{Cli, Commands};
use class_matcher::config::{ProjectConfig, resolve_matcher_config, resolve_project_path};
use class_matcher::executor::BatchControl;
use class_matcher::matching::{MatchEntity, MatchRecord, MatchStatus};
use class_matcher::model::Side;
use class_matcher::session::Session;
use serde::Serialize;
use std::time::Instant;
use tracing::trace;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct StatusOutput<'a> {
    inputs: &'a [InputFile],
    seeded: usize,
    status: MatchStatus,
}

#[derive(Debug, Serialize)]
struct MatchOutput {
    seeded: usize,
    status: MatchStatus,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pairs: Option<Vec<MatchRecord>>,
}

#[derive(Debug, Serialize)]
struct Candidate {
    class: String,
    score: f64,
    normalized: f64,
    results: Vec<ClassifierResult>,
}

#[derive(Debug, Serialize)]
struct RankOutput {
    class: String,
    level: ClassifierLevel,
    max_score: f64,
    candidates: Vec<Candidate>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_path = resolve_project_path(&cli)?;
    let project = ProjectConfig::load(&project_path)?;
    let mut session = Session::new(resolve_matcher_config(&cli, &project))?;
    session.load(&project)?;
    let seeded = session.match_unobfuscated();

    match cli.command {
        Commands::Status => {
            let output = StatusOutput {
                inputs: session.inputs(),
                seeded,
                status: session.status(true),
            };
            print_json(&output)?;
        }
        Commands::Match { pairs } => {
            let start = Instant::now();
            let control = BatchControl::with_progress(|fraction| trace!(fraction, "batch progress"));
            session.auto_match_all(&control)?;
            let output = MatchOutput {
                seeded,
                status: session.status(true),
                duration_ms: start.elapsed().as_millis() as u64,
                pairs: pairs.then(|| session.match_records()),
            };
            print_json(&output)?;
        }
        Commands::Rank {
            class_name,
            top,
            level,
        } => {
            let level = ClassifierLevel::from(level);
            let class = session
                .find_class(Side::A, &class_name)
                .with_context(|| format!("Class not found on side A: {class_name}"))?;
            let max = max_score(classifier::class::CLASSIFIERS, level);
            let graph = session.graph();
            let candidates = session
                .rank_class(class, level)
                .into_iter()
                .take(top)
                .map(|r| Candidate {
                    class: r.subject.path(graph),
                    score: r.score,
                    normalized: normalized_score(r.score, max),
                    results: r.results,
                })
                .collect();
            let output = RankOutput {
                class: class.path(graph),
                level,
                max_score: max,
                candidates,
            };
            print_json(&output)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
