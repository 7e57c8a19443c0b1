use crate::error::SnpError;
use crate::process::{Chromosome, SnpRecord};

use flate2::read::MultiGzDecoder;
use itertools::Itertools;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Allele symbol to frequency for one population at one site.
pub type FrequencyMap = BTreeMap<String, f64>;

/// Columns every SNP table must provide.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "snp_id",
    "risk_allele",
    "chromosome",
    "position",
    "p_value",
    "beb",
    "pjl",
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// How allele symbols are compared against frequency fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AlleleMatching {
    #[default]
    Exact,
    CaseInsensitive,
}

/// Extracts the frequency of `allele` from a field like `"A: 0.802, G: 0.198"`.
///
/// Returns the first matching entry. A missing or malformed field, or an
/// allele the field does not mention, yields `None`.
///
/// Lookup goes through [`parse_frequencies`], so the whole allele symbol must
/// match: `"A"` is never found inside `"GA"`.
pub fn extract_frequency(field: Option<&str>, allele: &str, matching: AlleleMatching) -> Option<f64> {
    let allele = allele.trim();
    if allele.is_empty() {
        return None;
    }
    let key = match matching {
        AlleleMatching::Exact => allele.to_string(),
        AlleleMatching::CaseInsensitive => allele.to_uppercase(),
    };
    parse_frequencies(field, matching).get(&key).copied()
}

/// Parses every `allele: frequency` entry of a field.
///
/// Entries without a colon or with a non-numeric frequency are skipped. When
/// an allele repeats, its first entry wins.
pub fn parse_frequencies(field: Option<&str>, matching: AlleleMatching) -> FrequencyMap {
    let mut frequencies = FrequencyMap::new();
    let Some(field) = field else {
        return frequencies;
    };

    for entry in field.split(',') {
        let Some((allele, value)) = entry.split_once(':') else {
            continue;
        };
        let allele = allele.trim();
        if allele.is_empty() {
            continue;
        }
        let freq = match value.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => f,
            _ => continue,
        };
        let key = match matching {
            AlleleMatching::Exact => allele.to_string(),
            AlleleMatching::CaseInsensitive => allele.to_uppercase(),
        };
        frequencies.entry(key).or_insert(freq);
    }

    frequencies
}

/// Normalizes a column header: trimmed, inner whitespace to `_`, lower-case.
pub fn normalize_header(name: &str) -> String {
    WHITESPACE.replace_all(name.trim(), "_").to_lowercase()
}

/// Opens a table for reading, decompressing `.gz` transparently.
pub fn open_table_reader(path: &Path) -> Result<Box<dyn Read>, SnpError> {
    let file = File::open(path)?;
    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Tab for `.tsv`/`.txt` (optionally gzipped), comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_lowercase();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    if name.ends_with(".tsv") || name.ends_with(".txt") {
        b'\t'
    } else {
        b','
    }
}

/// Loads SNP records from a CSV/TSV export of the SNP table.
pub fn load_snp_records(path: &Path) -> Result<Vec<SnpRecord>, SnpError> {
    debug!("Loading SNP records from {}", path.display());
    let reader = open_table_reader(path)?;
    read_snp_records(reader, delimiter_for(path))
}

/// Column positions resolved from the header row.
struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, SnpError> {
        let positions: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (normalize_header(h), i))
            .collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !positions.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(SnpError::MissingColumn(missing.iter().join(", ")));
        }

        Ok(ColumnIndex { positions })
    }

    /// Trimmed cell, `None` when the column is absent or the cell is empty.
    fn get<'r>(&self, row: &'r csv::StringRecord, column: &str) -> Option<&'r str> {
        let idx = *self.positions.get(column)?;
        row.get(idx).map(str::trim).filter(|s| !s.is_empty())
    }

    /// Like `get`, but an empty cell in a required column is fatal.
    fn require<'r>(
        &self,
        row: &'r csv::StringRecord,
        column: &str,
        snp_id: &str,
        line: usize,
    ) -> Result<&'r str, SnpError> {
        self.get(row, column).ok_or_else(|| {
            SnpError::Parse(format!("Empty {} for {} on line {}", column, snp_id, line))
        })
    }

    fn get_f64(&self, row: &csv::StringRecord, column: &str) -> Option<f64> {
        self.get(row, column).and_then(|s| s.parse::<f64>().ok())
    }
}

/// Reads SNP records from any reader holding a delimited table with a header.
///
/// A table lacking a required column fails before any row is read. An empty
/// identifier, chromosome, risk allele, position or p-value is a `Parse` error
/// naming the line. Rows with a chromosome outside 1-22/X/Y are skipped with a
/// warning.
pub fn read_snp_records<R: Read>(reader: R, delimiter: u8) -> Result<Vec<SnpRecord>, SnpError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let columns = ColumnIndex::from_headers(rdr.headers()?)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (row_idx, result) in rdr.records().enumerate() {
        let row = result?;
        let line = row_idx + 2;

        let snp_id = columns
            .get(&row, "snp_id")
            .ok_or_else(|| SnpError::Parse(format!("Empty snp_id on line {}", line)))?
            .to_string();

        let chrom_raw = columns.require(&row, "chromosome", &snp_id, line)?;
        let chromosome = match chrom_raw.parse::<Chromosome>() {
            Ok(c) => c,
            Err(_) => {
                warn!(
                    "Skipping {} on line {}: unrecognised chromosome '{}'",
                    snp_id, line, chrom_raw
                );
                skipped += 1;
                continue;
            }
        };

        let risk_allele = columns.require(&row, "risk_allele", &snp_id, line)?.to_string();

        let position_raw = columns.require(&row, "position", &snp_id, line)?;
        let position = parse_position(position_raw).ok_or_else(|| {
            SnpError::Parse(format!(
                "Invalid position '{}' for {} on line {}",
                position_raw, snp_id, line
            ))
        })?;

        let p_raw = columns.require(&row, "p_value", &snp_id, line)?;
        let p_value = p_raw.parse::<f64>().map_err(|_| {
            SnpError::Parse(format!("Invalid p_value '{}' for {} on line {}", p_raw, snp_id, line))
        })?;

        records.push(SnpRecord {
            snp_id,
            risk_allele,
            chromosome,
            position,
            p_value: Some(p_value),
            odds_ratio: columns.get_f64(&row, "odds_ratio"),
            beb: columns.get(&row, "beb").map(String::from),
            pjl: columns.get(&row, "pjl").map(String::from),
            mapped_gene: columns.get(&row, "mapped_gene").map(String::from),
            trait_name: columns.get(&row, "trait").map(String::from),
            daf_beb: columns.get_f64(&row, "daf_beb"),
            daf_pjl: columns.get_f64(&row, "daf_pjl"),
            delta_af: columns.get_f64(&row, "delta_af"),
            fst_beb: columns.get_f64(&row, "fst_beb"),
            fst_pjl: columns.get_f64(&row, "fst_pjl"),
        });
    }

    debug!("Loaded {} SNP records ({} skipped)", records.len(), skipped);
    Ok(records)
}

// Spreadsheet exports sometimes write integer columns as "12345.0".
fn parse_position(s: &str) -> Option<u64> {
    if let Ok(p) = s.parse::<u64>() {
        return Some(p);
    }
    let f = s.parse::<f64>().ok()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}
