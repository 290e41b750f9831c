use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum QcError {
    #[error("invalid external identifier: {0}")]
    InvalidExternalId(String),

    #[error("base directory not found: {0}")]
    BaseDirNotFound(PathBuf),

    #[error("no genome folders with an annotation file found under {0}")]
    #[diagnostic(help("each genome needs its own subfolder holding one .gbff/.gbk/.genbank file"))]
    NoGenomes(PathBuf),

    #[error("failed to read annotation {path}: {message}")]
    Annotation { path: PathBuf, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("quality scorer failed: {0}")]
    Scorer(String),

    #[error("no quality report found in {0}")]
    ReportMissing(PathBuf),

    #[error("failed to parse quality report {path}: {message}")]
    ReportParse { path: PathBuf, message: String },

    #[error("quality report {path} has no {column} column")]
    ColumnNotFound { path: PathBuf, column: &'static str },

    #[error("failed to write table {path}: {message}")]
    TableWrite { path: PathBuf, message: String },

    #[error("output file was not created: {0}")]
    OutputMissing(PathBuf),

    #[error("output has {rows} rows, below the minimum of {min_rows}")]
    TooFewRows { rows: usize, min_rows: usize },
}
