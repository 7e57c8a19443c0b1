//! Analysis settings, read from an optional YAML file.

use crate::error::SnpError;
use crate::parse::AlleleMatching;
use crate::process::MissingPolicy;

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Whether allele symbols match frequency fields case-insensitively
    #[serde(default)]
    pub allele_matching: AlleleMatching,

    /// Default number of SNPs in ranked views
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Count missing values as 0 in per-chromosome chart means
    #[serde(default)]
    pub zero_fill_presentation: bool,

    /// Emit single-line JSON
    #[serde(default)]
    pub compact_json: bool,
}

fn default_top_n() -> usize {
    10
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            allele_matching: AlleleMatching::default(),
            top_n: default_top_n(),
            zero_fill_presentation: false,
            compact_json: false,
        }
    }
}

impl AnalysisConfig {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, SnpError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_yaml::from_str(&content).map_err(|e| {
            SnpError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SnpError> {
        if self.top_n == 0 {
            return Err(SnpError::Config("top_n must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn missing_policy(&self) -> MissingPolicy {
        if self.zero_fill_presentation {
            MissingPolicy::ZeroFill
        } else {
            MissingPolicy::Exclude
        }
    }
}
