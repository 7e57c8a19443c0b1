use std::io;
use thiserror::Error;

/// Errors surfaced by the statistics core and its loaders.
///
/// Malformed frequency fields and alleles missing from a population are not
/// errors; they resolve to `None` inside the parser and calculator.
#[derive(Debug, Error)]
pub enum SnpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}
