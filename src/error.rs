use std::path::PathBuf;

use thiserror::Error;

use crate::classfile::ClassFileError;

/// Fatal ingestion failures; the session is reset to empty when one occurs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no inputs configured for side {0}")]
    NoInputs(&'static str),
    #[error("input does not exist: {0}")]
    MissingInput(PathBuf),
    #[error("failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("corrupt class file {entry} in {path}: {source}")]
    ClassFile {
        path: PathBuf,
        entry: String,
        #[source]
        source: ClassFileError,
    },
    #[error("class file {entry} in {path} declares {declared}")]
    MisplacedClass {
        path: PathBuf,
        entry: String,
        declared: String,
    },
    #[error("invalid descriptor {descriptor} referenced from {class}")]
    InvalidDescriptor { class: String, descriptor: String },
    #[error("invalid {what} pattern: {source}")]
    Pattern {
        what: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// Rejected match requests. No state is mutated when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("{0} is not a side A entity")]
    NotSideA(String),
    #[error("{0} is not a side B entity")]
    NotSideB(String),
    #[error("array dimensions differ: {a} vs {b}")]
    ArrayDimensions { a: usize, b: usize },
    #[error("owners of {a} and {b} are not matched to each other")]
    OwnersNotMatched { a: String, b: String },
    #[error("cannot match an argument with a local variable: {a} vs {b}")]
    VarKindMismatch { a: String, b: String },
    #[error("{0} is not matchable")]
    NotMatchable(String),
    #[error("unknown entity path: {0}")]
    UnknownPath(String),
    #[error("batch cancelled")]
    Cancelled,
}
