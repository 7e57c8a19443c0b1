use crate::error::SnpError;
use crate::parse::{extract_frequency, AlleleMatching, FrequencyMap};
use crate::process::{Population, SnpRecord};

use serde::{Serialize, Serializer};
use std::fmt;

/// p-values strictly below this are flagged as significant for annotation.
pub const SIGNIFICANCE_THRESHOLD: f64 = 1e-58;

/// Lower bounds of the Moderate, Great and Very great differentiation bands.
const MODERATE_FST: f64 = 0.05;
const GREAT_FST: f64 = 0.15;
const VERY_GREAT_FST: f64 = 0.25;

/// Derived allele frequencies of one SNP in both populations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DafPair {
    pub beb: Option<f64>,
    pub pjl: Option<f64>,
}

/// Wright's FST for one allele observed in both populations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlleleFst {
    pub snp_id: String,
    pub allele: String,
    pub fst: f64,
    pub category: FstCategory,
}

/// Ordinal level of genetic differentiation derived from an FST value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FstCategory {
    LittleDiff,
    ModerateDiff,
    GreatDiff,
    VeryGreatDiff,
    NoData,
}

impl FstCategory {
    pub fn label(&self) -> &'static str {
        match self {
            FstCategory::LittleDiff => "Little genetic diff.",
            FstCategory::ModerateDiff => "Moderate genetic diff.",
            FstCategory::GreatDiff => "Great genetic diff.",
            FstCategory::VeryGreatDiff => "Very great genetic diff.",
            FstCategory::NoData => "No data",
        }
    }
}

impl fmt::Display for FstCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for FstCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Maps an FST value onto its differentiation band.
///
/// Each threshold belongs to the band above it, so `0.05` is `ModerateDiff`.
pub fn classify_fst(fst: Option<f64>) -> FstCategory {
    match fst {
        None => FstCategory::NoData,
        Some(v) if v.is_nan() => FstCategory::NoData,
        Some(v) if v < MODERATE_FST => FstCategory::LittleDiff,
        Some(v) if v < GREAT_FST => FstCategory::ModerateDiff,
        Some(v) if v < VERY_GREAT_FST => FstCategory::GreatDiff,
        Some(_) => FstCategory::VeryGreatDiff,
    }
}

/// Extracts the risk-allele frequency from each population's field.
///
/// The risk allele is taken as the derived allele. A missing field or an
/// allele the population never reports gives `None` for that side only.
pub fn calculate_daf(record: &SnpRecord, matching: AlleleMatching) -> DafPair {
    DafPair {
        beb: extract_frequency(record.frequency_field(Population::Beb), &record.risk_allele, matching),
        pjl: extract_frequency(record.frequency_field(Population::Pjl), &record.risk_allele, matching),
    }
}

/// Absolute DAF difference between the populations, defined only when both
/// sides were measured.
pub fn calculate_delta_af(daf_a: Option<f64>, daf_b: Option<f64>) -> Option<f64> {
    match (daf_a, daf_b) {
        (Some(a), Some(b)) => Some((a - b).abs()),
        _ => None,
    }
}

/// Wright's FST between two populations from the frequency of one allele.
///
/// # Arguments
/// * `p1` - Allele frequency in the first population, in [0, 1]
/// * `p2` - Allele frequency in the second population, in [0, 1]
///
/// # Returns
/// * `(H_t - H_s) / H_t`, or exactly 0 when the allele is fixed or absent in
///   the pooled sample (`H_t == 0`)
/// * `SnpError::InvalidInput` if either frequency lies outside [0, 1]
pub fn calculate_fst(p1: f64, p2: f64) -> Result<f64, SnpError> {
    for p in [p1, p2] {
        if !(0.0..=1.0).contains(&p) {
            return Err(SnpError::InvalidInput(format!(
                "allele frequency {} is outside [0, 1]",
                p
            )));
        }
    }

    let p_bar = (p1 + p2) / 2.0;
    let h_s = (p1 * (1.0 - p1) + p2 * (1.0 - p2)) / 2.0;
    let h_t = p_bar * (1.0 - p_bar);

    if h_t == 0.0 {
        return Ok(0.0);
    }
    Ok((h_t - h_s) / h_t)
}

/// FST at the risk allele, `None` unless both populations report it.
pub fn calculate_risk_allele_fst(daf: &DafPair) -> Result<Option<f64>, SnpError> {
    match (daf.beb, daf.pjl) {
        (Some(beb), Some(pjl)) => calculate_fst(beb, pjl).map(Some),
        _ => Ok(None),
    }
}

/// Computes FST for every allele present in both frequency maps.
///
/// Alleles seen in only one population are skipped rather than treated as
/// frequency zero. Values are rounded to five decimals.
pub fn calculate_allele_fst(
    snp_id: &str,
    beb: &FrequencyMap,
    pjl: &FrequencyMap,
) -> Result<Vec<AlleleFst>, SnpError> {
    let mut results = Vec::new();
    for (allele, &p_beb) in beb {
        let Some(&p_pjl) = pjl.get(allele) else {
            continue;
        };
        let fst = calculate_fst(p_beb, p_pjl).map_err(|e| match e {
            SnpError::InvalidInput(msg) => {
                SnpError::InvalidInput(format!("SNP {} allele {}: {}", snp_id, allele, msg))
            }
            other => other,
        })?;
        let fst = round_to(fst, 5);
        results.push(AlleleFst {
            snp_id: snp_id.to_string(),
            allele: allele.clone(),
            fst,
            category: classify_fst(Some(fst)),
        });
    }
    Ok(results)
}

pub fn is_significant(p_value: Option<f64>) -> bool {
    matches!(p_value, Some(p) if p < SIGNIFICANCE_THRESHOLD)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Five-number summary used for box plots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FiveNumberSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Min, quartiles and max with linear interpolation between order statistics.
pub fn five_number_summary(values: &[f64]) -> Option<FiveNumberSummary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    Some(FiveNumberSummary {
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}

// `sorted` must be non-empty and ascending.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
