use crate::error::SnpError;
use crate::parse::{parse_frequencies, AlleleMatching};
use crate::stats::{
    calculate_allele_fst, calculate_daf, calculate_delta_af, calculate_risk_allele_fst,
    classify_fst, is_significant, mean, AlleleFst, FstCategory,
};

use csv::WriterBuilder;
use log::debug;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Chromosomes in display order. Grouping and sorting follow this order,
/// never lexicographic order.
pub const CHROMOSOME_ORDER: [&str; 24] = [
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y",
];

/// Number of rows listed under `top_differences` in a chromosome DAF summary.
const TOP_DIFFERENCES: usize = 5;

/// A human chromosome, ordered 1..22, X, Y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chromosome(u8); // index into CHROMOSOME_ORDER

impl Chromosome {
    pub fn name(&self) -> &'static str {
        CHROMOSOME_ORDER[self.0 as usize]
    }

    /// Zero-based position in the display order.
    pub fn rank(&self) -> usize {
        self.0 as usize
    }
}

impl FromStr for Chromosome {
    type Err = SnpError;

    /// Accepts `"7"`, `" chr7 "`, `"Chr7"`, `"x"`; rejects anything outside 1-22/X/Y.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let name = upper.strip_prefix("CHR").unwrap_or(upper.as_str());
        CHROMOSOME_ORDER
            .iter()
            .position(|&c| c == name)
            .map(|i| Chromosome(i as u8))
            .ok_or_else(|| SnpError::Parse(format!("Unknown chromosome '{}'", s)))
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Serialize for Chromosome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// The two comparison populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
pub enum Population {
    #[serde(rename = "BEB")]
    #[value(name = "BEB")]
    Beb,
    #[serde(rename = "PJL")]
    #[value(name = "PJL")]
    Pjl,
}

impl Population {
    pub const ALL: [Population; 2] = [Population::Beb, Population::Pjl];

    pub fn label(&self) -> &'static str {
        match self {
            Population::Beb => "BEB",
            Population::Pjl => "PJL",
        }
    }
}

impl FromStr for Population {
    type Err = SnpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BEB" => Ok(Population::Beb),
            "PJL" => Ok(Population::Pjl),
            _ => Err(SnpError::InvalidInput(format!("Invalid population '{}'", s))),
        }
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One SNP with its raw population frequency fields and derived statistics.
///
/// `daf_*`, `delta_af` and `fst_*` are caches; `recompute_statistics`
/// rebuilds them from `beb`, `pjl` and `risk_allele`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnpRecord {
    pub snp_id: String,
    pub risk_allele: String,
    pub chromosome: Chromosome,
    pub position: u64,
    pub p_value: Option<f64>,
    pub odds_ratio: Option<f64>,
    pub beb: Option<String>,
    pub pjl: Option<String>,
    pub mapped_gene: Option<String>,
    #[serde(rename = "trait")]
    pub trait_name: Option<String>,
    pub daf_beb: Option<f64>,
    pub daf_pjl: Option<f64>,
    pub delta_af: Option<f64>,
    pub fst_beb: Option<f64>,
    pub fst_pjl: Option<f64>,
}

/// A per-SNP value that can be aggregated or ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    DafBeb,
    DafPjl,
    DeltaAf,
    FstBeb,
    FstPjl,
    PValue,
}

impl Metric {
    pub fn daf(population: Population) -> Metric {
        match population {
            Population::Beb => Metric::DafBeb,
            Population::Pjl => Metric::DafPjl,
        }
    }

    pub fn fst(population: Population) -> Metric {
        match population {
            Population::Beb => Metric::FstBeb,
            Population::Pjl => Metric::FstPjl,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Metric::DafBeb => "daf_beb",
            Metric::DafPjl => "daf_pjl",
            Metric::DeltaAf => "delta_af",
            Metric::FstBeb => "fst_beb",
            Metric::FstPjl => "fst_pjl",
            Metric::PValue => "p_value",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::DafBeb => "DAF (BEB)",
            Metric::DafPjl => "DAF (PJL)",
            Metric::DeltaAf => "Delta_AF",
            Metric::FstBeb => "FST (BEB)",
            Metric::FstPjl => "FST (PJL)",
            Metric::PValue => "p-value",
        }
    }
}

impl SnpRecord {
    /// Value of `metric`; NaN counts as missing.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        let value = match metric {
            Metric::DafBeb => self.daf_beb,
            Metric::DafPjl => self.daf_pjl,
            Metric::DeltaAf => self.delta_af,
            Metric::FstBeb => self.fst_beb,
            Metric::FstPjl => self.fst_pjl,
            Metric::PValue => self.p_value,
        };
        value.filter(|v| !v.is_nan())
    }

    pub fn frequency_field(&self, population: Population) -> Option<&str> {
        match population {
            Population::Beb => self.beb.as_deref(),
            Population::Pjl => self.pjl.as_deref(),
        }
    }

    pub fn is_significant(&self) -> bool {
        is_significant(self.p_value)
    }
}

/// How missing values enter a per-chromosome mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Leave missing values out of numerator and denominator.
    #[default]
    Exclude,
    /// Count missing values as 0. Presentation only.
    ZeroFill,
}

/// Returns fresh copies of `records` with DAF, Delta_AF and FST recomputed
/// from the raw frequency fields. The input is left untouched.
pub fn recompute_statistics(
    records: &[SnpRecord],
    matching: AlleleMatching,
) -> Result<Vec<SnpRecord>, SnpError> {
    let recomputed = records
        .iter()
        .map(|r| recompute_record(r, matching))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        "Recomputed statistics for {} SNPs ({} with FST)",
        recomputed.len(),
        recomputed.iter().filter(|r| r.fst_beb.is_some()).count()
    );
    Ok(recomputed)
}

/// Recomputes the derived columns of a single record.
///
/// Both `fst_beb` and `fst_pjl` receive the pairwise BEB-vs-PJL FST at the
/// risk allele.
pub fn recompute_record(record: &SnpRecord, matching: AlleleMatching) -> Result<SnpRecord, SnpError> {
    let daf = calculate_daf(record, matching);
    let fst = calculate_risk_allele_fst(&daf).map_err(|e| match e {
        SnpError::InvalidInput(msg) => SnpError::InvalidInput(format!("SNP {}: {}", record.snp_id, msg)),
        other => other,
    })?;

    Ok(SnpRecord {
        daf_beb: daf.beb,
        daf_pjl: daf.pjl,
        delta_af: calculate_delta_af(daf.beb, daf.pjl),
        fst_beb: fst,
        fst_pjl: fst,
        ..record.clone()
    })
}

/// FST for every allele shared by both populations across all records,
/// sorted ascending by FST. Ties keep input order.
pub fn allele_fst_table(
    records: &[SnpRecord],
    matching: AlleleMatching,
) -> Result<Vec<AlleleFst>, SnpError> {
    let mut table = Vec::new();
    for record in records {
        let beb = parse_frequencies(record.beb.as_deref(), matching);
        let pjl = parse_frequencies(record.pjl.as_deref(), matching);
        table.extend(calculate_allele_fst(&record.snp_id, &beb, &pjl)?);
    }
    table.sort_by(|a, b| a.fst.total_cmp(&b.fst));
    Ok(table)
}

/// Mean of one metric for one chromosome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChromosomeMean {
    pub chromosome: Chromosome,
    pub mean: f64,
    /// Number of values that entered the mean.
    pub n: usize,
}

/// Groups values of `metric` by chromosome in chromosome order.
///
/// Under `MissingPolicy::Exclude`, chromosomes without any value are absent.
pub fn group_values(
    records: &[SnpRecord],
    metric: Metric,
    policy: MissingPolicy,
) -> BTreeMap<Chromosome, Vec<f64>> {
    let mut groups: BTreeMap<Chromosome, Vec<f64>> = BTreeMap::new();
    for record in records {
        let value = match (record.metric(metric), policy) {
            (Some(v), _) => v,
            (None, MissingPolicy::ZeroFill) => 0.0,
            (None, MissingPolicy::Exclude) => continue,
        };
        groups.entry(record.chromosome).or_default().push(value);
    }
    groups
}

/// Per-chromosome mean of `metric`, ordered 1..22, X, Y.
pub fn group_mean(records: &[SnpRecord], metric: Metric, policy: MissingPolicy) -> Vec<ChromosomeMean> {
    group_values(records, metric, policy)
        .into_iter()
        .filter_map(|(chromosome, values)| {
            mean(&values).map(|m| ChromosomeMean {
                chromosome,
                mean: m,
                n: values.len(),
            })
        })
        .collect()
}

/// All per-chromosome means side by side, one row per chromosome present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChromosomeMeanRow {
    pub chromosome: Chromosome,
    pub snps: usize,
    pub daf_beb: Option<f64>,
    pub daf_pjl: Option<f64>,
    pub delta_af: Option<f64>,
    pub fst_beb: Option<f64>,
    pub fst_pjl: Option<f64>,
}

pub fn chromosome_mean_table(records: &[SnpRecord], policy: MissingPolicy) -> Vec<ChromosomeMeanRow> {
    let mut counts: BTreeMap<Chromosome, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.chromosome).or_default() += 1;
    }

    let lookup = |metric: Metric| -> BTreeMap<Chromosome, f64> {
        group_mean(records, metric, policy)
            .into_iter()
            .map(|m| (m.chromosome, m.mean))
            .collect()
    };
    let daf_beb = lookup(Metric::DafBeb);
    let daf_pjl = lookup(Metric::DafPjl);
    let delta_af = lookup(Metric::DeltaAf);
    let fst_beb = lookup(Metric::FstBeb);
    let fst_pjl = lookup(Metric::FstPjl);

    counts
        .into_iter()
        .map(|(chromosome, snps)| ChromosomeMeanRow {
            chromosome,
            snps,
            daf_beb: daf_beb.get(&chromosome).copied(),
            daf_pjl: daf_pjl.get(&chromosome).copied(),
            delta_af: delta_af.get(&chromosome).copied(),
            fst_beb: fst_beb.get(&chromosome).copied(),
            fst_pjl: fst_pjl.get(&chromosome).copied(),
        })
        .collect()
}

/// The `n` records with the highest (or lowest) `metric`.
///
/// Records without a value are skipped. The sort is stable, so equal values
/// keep their input order. `n` beyond the available count returns them all.
pub fn top_n(records: &[SnpRecord], metric: Metric, n: usize, descending: bool) -> Vec<&SnpRecord> {
    let mut ranked: Vec<(&SnpRecord, f64)> = records
        .iter()
        .filter_map(|r| r.metric(metric).map(|v| (r, v)))
        .collect();
    ranked.sort_by(|a, b| {
        if descending {
            b.1.total_cmp(&a.1)
        } else {
            a.1.total_cmp(&b.1)
        }
    });
    ranked.into_iter().take(n).map(|(r, _)| r).collect()
}

/// A SNP ranked by FST for one population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSnp {
    #[serde(rename = "SNP ID")]
    pub snp_id: String,
    #[serde(rename = "FST")]
    pub fst: Option<f64>,
    #[serde(rename = "Category")]
    pub category: FstCategory,
    #[serde(rename = "Allele")]
    pub allele: String,
}

impl RankedSnp {
    fn from_record(record: &SnpRecord, population: Population) -> Self {
        let fst = record.metric(Metric::fst(population));
        RankedSnp {
            snp_id: record.snp_id.clone(),
            fst,
            category: classify_fst(fst),
            allele: record.risk_allele.clone(),
        }
    }
}

/// Top `n` SNPs by FST in `population`, each tagged with its category.
pub fn ranked_fst(records: &[SnpRecord], population: Population, n: usize) -> Vec<RankedSnp> {
    top_n(records, Metric::fst(population), n, true)
        .into_iter()
        .map(|r| RankedSnp::from_record(r, population))
        .collect()
}

/// FST of the requested SNPs in `population`, highest first.
///
/// Requested SNPs lacking an FST are kept with `NoData` and listed last.
/// Identifiers not present in `records` are ignored.
pub fn selected_fst(records: &[SnpRecord], population: Population, snp_ids: &[String]) -> Vec<RankedSnp> {
    let mut selected: Vec<RankedSnp> = records
        .iter()
        .filter(|r| snp_ids.iter().any(|id| id == &r.snp_id))
        .map(|r| RankedSnp::from_record(r, population))
        .collect();
    selected.sort_by(|a, b| match (a.fst, b.fst) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    selected
}

/// Records whose p-value falls below the significance threshold.
pub fn significant_snps(records: &[SnpRecord]) -> Vec<&SnpRecord> {
    records.iter().filter(|r| r.is_significant()).collect()
}

/// One SNP in a chromosome DAF comparison. Missing DAFs are shown as 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DafComparisonRow {
    pub snp_id: String,
    pub position: u64,
    pub risk_allele: String,
    pub daf_beb: f64,
    pub daf_pjl: f64,
    pub difference: f64,
    pub higher_in: Population,
}

/// BEB vs PJL DAF overview for one chromosome.
///
/// This is a presentation view: missing DAFs are zero-filled, so
/// `difference` here is not the analytical Delta_AF.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChromosomeDafSummary {
    pub chromosome: Chromosome,
    pub count: usize,
    pub avg_daf_beb: f64,
    pub avg_daf_pjl: f64,
    pub mean_difference: f64,
    pub higher_in_beb: usize,
    pub higher_in_pjl: usize,
    pub data: Vec<DafComparisonRow>,
    pub top_differences: Vec<DafComparisonRow>,
}

/// Summarizes DAF differences on `chromosome`; `None` if it has no SNPs.
pub fn summarize_chromosome_daf(records: &[SnpRecord], chromosome: Chromosome) -> Option<ChromosomeDafSummary> {
    let data: Vec<DafComparisonRow> = records
        .iter()
        .filter(|r| r.chromosome == chromosome)
        .map(|r| {
            let daf_beb = r.daf_beb.unwrap_or(0.0);
            let daf_pjl = r.daf_pjl.unwrap_or(0.0);
            DafComparisonRow {
                snp_id: r.snp_id.clone(),
                position: r.position,
                risk_allele: r.risk_allele.clone(),
                daf_beb,
                daf_pjl,
                difference: (daf_beb - daf_pjl).abs(),
                higher_in: if daf_beb > daf_pjl {
                    Population::Beb
                } else {
                    Population::Pjl
                },
            }
        })
        .collect();

    if data.is_empty() {
        return None;
    }

    let column_mean = |f: fn(&DafComparisonRow) -> f64| -> f64 {
        data.iter().map(f).sum::<f64>() / data.len() as f64
    };
    let higher_in_beb = data.iter().filter(|d| d.higher_in == Population::Beb).count();

    let mut top_differences = data.clone();
    top_differences.sort_by(|a, b| b.difference.total_cmp(&a.difference));
    top_differences.truncate(TOP_DIFFERENCES);

    Some(ChromosomeDafSummary {
        chromosome,
        count: data.len(),
        avg_daf_beb: column_mean(|d| d.daf_beb),
        avg_daf_pjl: column_mean(|d| d.daf_pjl),
        mean_difference: column_mean(|d| d.difference),
        higher_in_beb,
        higher_in_pjl: data.len() - higher_in_beb,
        top_differences,
        data,
    })
}

/// Browse-page search over loaded records.
///
/// An all-digit query matches a chromosome name or an exact position; a
/// single character matches the risk allele; anything else is a
/// case-insensitive substring search on SNP id, risk allele and mapped gene.
pub fn search_records<'a>(records: &'a [SnpRecord], query: &str) -> Vec<&'a SnpRecord> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    if query.chars().all(|c| c.is_ascii_digit()) {
        let position = query.parse::<u64>().ok();
        return records
            .iter()
            .filter(|r| r.chromosome.name() == query || Some(r.position) == position)
            .collect();
    }

    if query.chars().count() == 1 {
        return records
            .iter()
            .filter(|r| r.risk_allele.eq_ignore_ascii_case(query))
            .collect();
    }

    let needle = query.to_lowercase();
    let contains = |s: &str| s.to_lowercase().contains(&needle);
    records
        .iter()
        .filter(|r| {
            contains(&r.snp_id)
                || contains(&r.risk_allele)
                || r.mapped_gene.as_deref().map_or(false, contains)
        })
        .collect()
}

fn or_dash(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Plain-text summary of one SNP, `-` for missing values.
pub fn snp_report(record: &SnpRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("rsID: {}\n", record.snp_id));
    out.push_str(&format!("Risk Allele: {}\n", record.risk_allele));
    out.push_str(&format!("Chromosome: {}\n", record.chromosome));
    out.push_str(&format!("Position: {}\n", record.position));
    out.push_str(&format!("Gene: {}\n", record.mapped_gene.as_deref().unwrap_or("-")));
    out.push_str(&format!("Trait: {}\n", record.trait_name.as_deref().unwrap_or("-")));
    out.push_str(&format!("P-Value: {}\n", or_dash(record.p_value)));
    out.push_str(&format!("Odds Ratio: {}\n", or_dash(record.odds_ratio)));
    out.push_str(&format!("BEB: {}\n", record.beb.as_deref().unwrap_or("-")));
    out.push_str(&format!("PJL: {}\n", record.pjl.as_deref().unwrap_or("-")));
    out.push_str("\nSummary Statistics:\n");
    out.push_str(&format!("delta_af: {}\n", or_dash(record.delta_af)));
    out.push_str(&format!("daf_beb: {}\n", or_dash(record.daf_beb)));
    out.push_str(&format!("daf_pjl: {}\n", or_dash(record.daf_pjl)));
    out.push_str(&format!("fst_beb: {}\n", or_dash(record.fst_beb)));
    out.push_str(&format!("fst_pjl: {}\n", or_dash(record.fst_pjl)));
    for population in Population::ALL {
        out.push_str(&format!(
            "fst_{}_category: {}\n",
            population.label().to_lowercase(),
            classify_fst(record.metric(Metric::fst(population)))
        ));
    }
    out.push_str(&format!("significant: {}\n", if record.is_significant() { "yes" } else { "no" }));
    out
}

/// Closes every entry of a bulk report.
pub const REPORT_SEPARATOR: &str = "\n--------------------------------\n\n";

/// Several SNP reports in one document, each followed by [`REPORT_SEPARATOR`].
pub fn snp_reports<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a SnpRecord>,
{
    records
        .into_iter()
        .map(|r| format!("{}{}", snp_report(r), REPORT_SEPARATOR))
        .collect()
}

/// Formats an Option<f64> to a string, representing None or NaN as "NA".
/// Floating point values are formatted to six decimal places.
pub fn format_optional_float(val_opt: Option<f64>) -> String {
    match val_opt {
        Some(f) if !f.is_nan() => format!("{:.6}", f),
        _ => "NA".to_string(),
    }
}

/// p-values can be far smaller than six decimals can show.
fn format_p_value(val_opt: Option<f64>) -> String {
    match val_opt {
        Some(f) if !f.is_nan() => format!("{:e}", f),
        _ => "NA".to_string(),
    }
}

pub fn create_csv_writer(output_file: &Path) -> Result<csv::Writer<BufWriter<File>>, SnpError> {
    let file = File::create(output_file)?;
    Ok(WriterBuilder::new().has_headers(false).from_writer(BufWriter::new(file)))
}

/// Writes records with their derived statistics, one row per SNP.
pub fn write_records_csv<W: Write>(writer: &mut csv::Writer<W>, records: &[SnpRecord]) -> Result<(), SnpError> {
    writer.write_record([
        "snp_id",
        "risk_allele",
        "chromosome",
        "position",
        "p_value",
        "odds_ratio",
        "beb",
        "pjl",
        "daf_beb",
        "daf_pjl",
        "delta_af",
        "fst_beb",
        "fst_pjl",
        "fst_category",
        "significant",
    ])?;
    for r in records {
        let row: Vec<String> = vec![
            r.snp_id.clone(),
            r.risk_allele.clone(),
            r.chromosome.name().to_string(),
            r.position.to_string(),
            format_p_value(r.p_value),
            format_optional_float(r.odds_ratio),
            r.beb.clone().unwrap_or_default(),
            r.pjl.clone().unwrap_or_default(),
            format_optional_float(r.daf_beb),
            format_optional_float(r.daf_pjl),
            format_optional_float(r.delta_af),
            format_optional_float(r.fst_beb),
            format_optional_float(r.fst_pjl),
            classify_fst(r.fst_beb).label().to_string(),
            r.is_significant().to_string(),
        ];
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_chromosome_means_csv<W: Write>(
    writer: &mut csv::Writer<W>,
    rows: &[ChromosomeMeanRow],
) -> Result<(), SnpError> {
    writer.write_record([
        "chromosome",
        "snps",
        "mean_daf_beb",
        "mean_daf_pjl",
        "mean_delta_af",
        "mean_fst_beb",
        "mean_fst_pjl",
    ])?;
    for row in rows {
        writer.write_record(&[
            row.chromosome.name().to_string(),
            row.snps.to_string(),
            format_optional_float(row.daf_beb),
            format_optional_float(row.daf_pjl),
            format_optional_float(row.delta_af),
            format_optional_float(row.fst_beb),
            format_optional_float(row.fst_pjl),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_allele_fst_csv<W: Write>(writer: &mut csv::Writer<W>, rows: &[AlleleFst]) -> Result<(), SnpError> {
    writer.write_record(["SNP ID", "Allele", "FST", "Category"])?;
    for row in rows {
        writer.write_record(&[
            row.snp_id.clone(),
            row.allele.clone(),
            format!("{:.5}", row.fst),
            row.category.label().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
