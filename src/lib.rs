//! # class-matcher
//!
//! Matches classes, methods, fields and variables between two versions of a
//! JVM program whose identifiers may be obfuscated on either side.
//!
//! ## Architecture
//!
//! - **classfile**: Binary class-file parsing and instruction decoding
//! - **archive**: Jar/directory access and input fingerprints
//! - **model**: Entity ids, sides and name variants
//! - **graph**: Class graph arena with lazy classpath resolution
//! - **extract**: Ingestion and the ordered enrichment passes
//! - **matching**: Match table, match/unmatch operations, auto matching, status and records
//! - **classifier**: Weighted similarity classifiers and ranking
//! - **executor**: Parallel ranking batches with progress and cancellation
//! - **cache**: Per-session memoization cleared on every match change
//! - **propagate**: Name and uid propagation, remap tables
//! - **session**: One loaded project and its match state

pub mod archive;
pub mod cache;
pub mod classfile;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod graph;
pub mod matching;
pub mod model;
pub mod propagate;
pub mod session;

#[cfg(test)]
mod testkit;
