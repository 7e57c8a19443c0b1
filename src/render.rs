//! Chart payloads handed to the presentation layer.
//!
//! The core never draws anything. It builds a [`Chart`] from records and a
//! [`ChartRenderer`] turns it into whatever the front end consumes; the only
//! renderer shipped here emits JSON.

use crate::error::SnpError;
use crate::process::{
    group_mean, group_values, Chromosome, ChromosomeMean, Metric, MissingPolicy, Population,
    SnpRecord,
};
use crate::stats::{five_number_summary, FiveNumberSummary, SIGNIFICANCE_THRESHOLD};

use chrono::Utc;
use serde::Serialize;

pub const NO_DATA_MESSAGE: &str = "No data available.";

/// Charts the CLI and any serving layer can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ChartKind {
    DafHistogram,
    DafLine,
    DeltaAfBar,
    FstComparison,
    DeltaAfManhattan,
    FstManhattan,
    DeltaAfBox,
    FstBox,
    PValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStyle {
    Bar,
    Line,
}

/// One population's per-chromosome means.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<ChromosomeMean>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub snp_id: String,
    pub chromosome: Chromosome,
    pub position: u64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChromosomeBox {
    pub chromosome: Chromosome,
    pub n: usize,
    #[serde(flatten)]
    pub summary: FiveNumberSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chart {
    ChromosomeMeans {
        title: String,
        y_label: String,
        style: SeriesStyle,
        series: Vec<Series>,
    },
    Manhattan {
        title: String,
        y_label: String,
        points: Vec<ScatterPoint>,
    },
    BoxPlot {
        title: String,
        y_label: String,
        boxes: Vec<ChromosomeBox>,
    },
    PValueStrip {
        title: String,
        threshold: f64,
        points: Vec<ScatterPoint>,
        significant: Vec<ScatterPoint>,
    },
}

impl Chart {
    pub fn title(&self) -> &str {
        match self {
            Chart::ChromosomeMeans { title, .. }
            | Chart::Manhattan { title, .. }
            | Chart::BoxPlot { title, .. }
            | Chart::PValueStrip { title, .. } => title,
        }
    }

    /// True when there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        match self {
            Chart::ChromosomeMeans { series, .. } => series.iter().all(|s| s.points.is_empty()),
            Chart::Manhattan { points, .. } => points.is_empty(),
            Chart::BoxPlot { boxes, .. } => boxes.is_empty(),
            Chart::PValueStrip { points, .. } => points.is_empty(),
        }
    }
}

/// Turns a chart into its presentation form.
pub trait ChartRenderer {
    fn render(&self, chart: &Chart) -> Result<String, SnpError>;
}

#[derive(Serialize)]
struct ChartEnvelope<'a> {
    status: &'static str,
    title: &'a str,
    generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chart: Option<&'a Chart>,
}

/// Renders charts as JSON. Empty charts become an explicit `no_data` payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer {
    pub compact: bool,
}

impl ChartRenderer for JsonRenderer {
    fn render(&self, chart: &Chart) -> Result<String, SnpError> {
        let envelope = if chart.is_empty() {
            ChartEnvelope {
                status: "no_data",
                title: chart.title(),
                generated_at: Utc::now().to_rfc3339(),
                message: Some(NO_DATA_MESSAGE),
                chart: None,
            }
        } else {
            ChartEnvelope {
                status: "ok",
                title: chart.title(),
                generated_at: Utc::now().to_rfc3339(),
                message: None,
                chart: Some(chart),
            }
        };
        to_json(&envelope, self.compact)
    }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<String, SnpError> {
    if compact {
        Ok(serde_json::to_string(value)?)
    } else {
        Ok(serde_json::to_string_pretty(value)?)
    }
}

/// Builds the chart of the requested kind from `records`.
///
/// `policy` only matters for the per-chromosome mean charts.
pub fn build_chart(kind: ChartKind, records: &[SnpRecord], policy: MissingPolicy) -> Chart {
    match kind {
        ChartKind::DafHistogram => daf_means_chart(records, policy, SeriesStyle::Bar),
        ChartKind::DafLine => daf_means_chart(records, policy, SeriesStyle::Line),
        ChartKind::DeltaAfBar => Chart::ChromosomeMeans {
            title: "Mean ΔAF by Chromosome".to_string(),
            y_label: "Mean Absolute Difference in Allele Frequencies (ΔAF)".to_string(),
            style: SeriesStyle::Bar,
            series: vec![Series {
                name: "Delta_AF".to_string(),
                points: group_mean(records, Metric::DeltaAf, policy),
            }],
        },
        ChartKind::FstComparison => Chart::ChromosomeMeans {
            title: "Comparison of Mean FST Values for PJL and BEB Populations by Chromosome".to_string(),
            y_label: "Mean FST".to_string(),
            style: SeriesStyle::Bar,
            series: [Population::Pjl, Population::Beb]
                .iter()
                .map(|&p| Series {
                    name: p.label().to_string(),
                    points: group_mean(records, Metric::fst(p), policy),
                })
                .collect(),
        },
        ChartKind::DeltaAfManhattan => manhattan_chart(records, Metric::DeltaAf, "Manhattan Plot of Delta_AF"),
        ChartKind::FstManhattan => manhattan_chart(records, Metric::FstBeb, "FST (BEB) by Genomic Position"),
        ChartKind::DeltaAfBox => box_chart(records, Metric::DeltaAf, "Delta_AF Distribution Across Chromosomes"),
        ChartKind::FstBox => box_chart(records, Metric::FstPjl, "FST (PJL) Distribution by Chromosome"),
        ChartKind::PValues => p_value_chart(records),
    }
}

fn daf_means_chart(records: &[SnpRecord], policy: MissingPolicy, style: SeriesStyle) -> Chart {
    // Without zero-fill, only SNPs measured in both populations are compared.
    let paired: Vec<SnpRecord> = match policy {
        MissingPolicy::Exclude => records
            .iter()
            .filter(|r| r.metric(Metric::DafBeb).is_some() && r.metric(Metric::DafPjl).is_some())
            .cloned()
            .collect(),
        MissingPolicy::ZeroFill => records.to_vec(),
    };

    let title = match style {
        SeriesStyle::Bar => "Mean daf_beb and daf_pjl by Chromosome",
        SeriesStyle::Line => "Mean daf_beb and daf_pjl by Chromosome (Line Chart)",
    };

    Chart::ChromosomeMeans {
        title: title.to_string(),
        y_label: "Mean Derived Allele Frequency (DAF)".to_string(),
        style,
        series: Population::ALL
            .iter()
            .map(|&p| Series {
                name: p.label().to_lowercase(),
                points: group_mean(&paired, Metric::daf(p), policy),
            })
            .collect(),
    }
}

fn scatter_points(records: &[SnpRecord], metric: Metric) -> Vec<ScatterPoint> {
    let mut points: Vec<ScatterPoint> = records
        .iter()
        .filter_map(|r| {
            r.metric(metric).map(|value| ScatterPoint {
                snp_id: r.snp_id.clone(),
                chromosome: r.chromosome,
                position: r.position,
                value,
            })
        })
        .collect();
    points.sort_by_key(|p| (p.chromosome, p.position));
    points
}

fn manhattan_chart(records: &[SnpRecord], metric: Metric, title: &str) -> Chart {
    Chart::Manhattan {
        title: title.to_string(),
        y_label: metric.label().to_string(),
        points: scatter_points(records, metric),
    }
}

fn box_chart(records: &[SnpRecord], metric: Metric, title: &str) -> Chart {
    let boxes = group_values(records, metric, MissingPolicy::Exclude)
        .into_iter()
        .filter_map(|(chromosome, values)| {
            five_number_summary(&values).map(|summary| ChromosomeBox {
                chromosome,
                n: values.len(),
                summary,
            })
        })
        .collect();
    Chart::BoxPlot {
        title: title.to_string(),
        y_label: metric.label().to_string(),
        boxes,
    }
}

fn p_value_chart(records: &[SnpRecord]) -> Chart {
    let points = scatter_points(records, Metric::PValue);
    let significant = points
        .iter()
        .filter(|p| p.value < SIGNIFICANCE_THRESHOLD)
        .cloned()
        .collect();
    Chart::PValueStrip {
        title: "p-values Grouped by Chromosome".to_string(),
        threshold: SIGNIFICANCE_THRESHOLD,
        points,
        significant,
    }
}
