use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::classifier::ClassifierLevel;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-matcher")]
#[command(about = "Match classes and members between two versions of an obfuscated JVM program")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project file; falls back to CLASS_MATCHER_PROJECT.
    #[arg(long, value_name = "FILE", global = true)]
    pub project: Option<PathBuf>,

    #[arg(long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Load, seed unobfuscated names, auto-match everything and print the status.
    Match {
        /// Also print every matched pair.
        #[arg(long)]
        pairs: bool,
    },
    /// Load and seed unobfuscated names only.
    Status,
    /// Print the best candidates for a side A class with per-classifier scores.
    Rank {
        class_name: String,

        #[arg(long, value_name = "N", default_value_t = 5)]
        top: usize,

        #[arg(long, value_enum, default_value_t = LevelArg::Full)]
        level: LevelArg,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LevelArg {
    Initial,
    Intermediate,
    Full,
    Extra,
}

impl From<LevelArg> for ClassifierLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Initial => ClassifierLevel::Initial,
            LevelArg::Intermediate => ClassifierLevel::Intermediate,
            LevelArg::Full => ClassifierLevel::Full,
            LevelArg::Extra => ClassifierLevel::Extra,
        }
    }
}
