use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PostDeseqError {
    #[error("malformed record in {path} line {line}: {reason}")]
    MalformedRecord {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("malformed gene identifier (expected <locus>.<version>): {0}")]
    MalformedIdentifier(String),

    #[error("annotation key {key} appears {count} times in the annotation table")]
    AnnotationLookupAmbiguity { key: String, count: usize },

    #[error("unknown addressing mode: {0} (expected direct or locus-versioned)")]
    UnknownAddressingMode(String),

    #[error("unknown duplicate key policy: {0} (expected first or reject)")]
    UnknownDuplicatePolicy(String),

    #[error("annotation code not found in the annotation index: {0}")]
    UnknownAnnotation(String),

    #[error("no annotation selected (use --annotation or --annotation-file)")]
    NoAnnotationSelected,

    #[error("annotation table {path} has no key column {column}")]
    AnnotationKeyColumnMissing { path: String, column: String },

    #[error("failed to parse annotation table: {0}")]
    AnnotationParse(String),

    #[error("failed to read workbook {path}: {reason}")]
    Workbook { path: String, reason: String },

    #[error("missing config file {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("{path} line {line}: {source}")]
    AtLine {
        path: String,
        line: usize,
        #[source]
        source: Box<PostDeseqError>,
    },

    #[error("{file} writes the same output names as {other} (shared stem {stem})")]
    OutputNameCollision {
        file: String,
        other: String,
        stem: String,
    },

    #[error("{failed} input file(s) failed")]
    FilesFailed { failed: usize, input_errors: bool },

    #[error("processing {file} failed")]
    FileFailed {
        file: String,
        #[source]
        source: Box<PostDeseqError>,
    },
}

impl PostDeseqError {
    /// True for errors caused by the content of an input file rather than
    /// by configuration or the filesystem.
    pub fn is_input_error(&self) -> bool {
        match self {
            PostDeseqError::MalformedRecord { .. } | PostDeseqError::MalformedIdentifier(_) => true,
            PostDeseqError::FilesFailed { input_errors, .. } => *input_errors,
            PostDeseqError::AtLine { source, .. } | PostDeseqError::FileFailed { source, .. } => {
                source.is_input_error()
            }
            _ => false,
        }
    }
}
