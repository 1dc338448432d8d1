use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::data::model::Field;

/// Errors that abort a stage (or a single model fit).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed delimited input: {0}")]
    Csv(#[from] csv::Error),

    #[error("{path} contains no data rows")]
    EmptyInput { path: PathBuf },

    #[error("model `{model}` needs more than {params} rows, got {rows}")]
    InsufficientData {
        model: String,
        rows: usize,
        params: usize,
    },

    #[error("model `{model}` has a rank-deficient design (column `{column}`)")]
    RankDeficient { model: String, column: String },

    #[error("`{full}` is not a nested extension of `{reduced}`: {reason}")]
    NotNested {
        reduced: String,
        full: String,
        reason: String,
    },

    #[error("model `{model}` cannot be specified: {reason}")]
    InvalidModel { model: String, reason: String },

    #[error("distribution error: {0}")]
    Distribution(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid exclusion pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A single cell that could not be parsed. The value is recorded as missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldParseWarning {
    /// Zero-based data row (header excluded).
    pub row: usize,
    pub field: Field,
    pub raw: String,
}

/// Fit-quality flags attached to a mixed-effects fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitWarning {
    /// Group-level variance collapsed to (near) zero.
    Singular { variance: f64 },
    /// The variance-ratio search hit its evaluation budget.
    NotConverged { evaluations: usize },
}

impl std::fmt::Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitWarning::Singular { variance } => {
                write!(f, "boundary (singular) fit: group variance {variance:.3e}")
            }
            FitWarning::NotConverged { evaluations } => {
                write!(f, "failed to converge after {evaluations} evaluations")
            }
        }
    }
}
