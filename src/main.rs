use snpdiff::config::AnalysisConfig;
use snpdiff::parse::{load_snp_records, AlleleMatching};
use snpdiff::process::{
    allele_fst_table, chromosome_mean_table, create_csv_writer, format_optional_float,
    ranked_fst, recompute_statistics, search_records, selected_fst, significant_snps, snp_report,
    snp_reports, summarize_chromosome_daf, write_allele_fst_csv, write_chromosome_means_csv, write_records_csv,
    Chromosome, Population, RankedSnp, SnpRecord,
};
use snpdiff::render::{build_chart, to_json, ChartKind, ChartRenderer, JsonRenderer, NO_DATA_MESSAGE};
use snpdiff::stats::SIGNIFICANCE_THRESHOLD;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, warn};
use prettytable::{row, Table};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// DAF, ΔAF and FST statistics for SNPs compared between BEB and PJL
#[derive(Parser, Debug)]
#[command(name = "snpdiff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recompute DAF, Delta_AF and FST and write every SNP to CSV
    Recompute {
        #[command(flatten)]
        input: InputArgs,

        /// Output CSV file
        #[arg(short, long, default_value = "snp_statistics.csv")]
        output: PathBuf,
    },

    /// Per-chromosome means of DAF, Delta_AF and FST
    Summary {
        #[command(flatten)]
        input: InputArgs,

        /// Also write the table to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Highest-FST SNPs for one population
    Top {
        #[command(flatten)]
        input: InputArgs,

        /// Population to rank by
        #[arg(short, long, value_enum, ignore_case = true)]
        population: Population,

        /// Number of SNPs to list (defaults to the configured top_n)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// FST of selected SNPs for one population, highest first
    Fst {
        #[command(flatten)]
        input: InputArgs,

        /// Population to report
        #[arg(short, long, value_enum, ignore_case = true)]
        population: Population,

        /// Comma-separated SNP identifiers
        #[arg(long, value_delimiter = ',', required = true)]
        snps: Vec<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// SNPs with p-value below the significance threshold
    Significant {
        #[command(flatten)]
        input: InputArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// FST for every allele shared by both populations
    Alleles {
        #[command(flatten)]
        input: InputArgs,

        /// Output CSV file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a chart payload as JSON
    Chart {
        #[command(flatten)]
        input: InputArgs,

        /// Chart to build
        #[arg(short, long, value_enum)]
        kind: ChartKind,

        /// Count missing values as 0 in chromosome means
        #[arg(long)]
        zero_fill: bool,

        /// Output JSON file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// BEB vs PJL DAF overview for one chromosome
    DafSummary {
        #[command(flatten)]
        input: InputArgs,

        /// Chromosome (1-22, X or Y)
        #[arg(short, long)]
        chromosome: String,
    },

    /// Search SNPs by id, chromosome, position, risk allele or gene
    Search {
        #[command(flatten)]
        input: InputArgs,

        /// Search text
        #[arg(short, long)]
        query: String,
    },

    /// Plain-text report for one or more SNPs
    Report {
        #[command(flatten)]
        input: InputArgs,

        /// Comma-separated SNP identifiers, e.g. rs123456,rs7903146
        #[arg(short, long = "snp-id", value_delimiter = ',', required = true)]
        snp_ids: Vec<String>,

        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// SNP table as CSV or TSV, optionally gzipped
    #[arg(short, long)]
    input: PathBuf,

    /// YAML analysis configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Allele matching mode, overrides the configuration
    #[arg(long, value_enum)]
    allele_matching: Option<AlleleMatching>,

    /// Use derived columns stored in the table instead of recomputing them
    #[arg(long)]
    use_cached: bool,
}

/// Configuration and records for one run.
struct Dataset {
    config: AnalysisConfig,
    records: Vec<SnpRecord>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Recompute { input, output } => run_recompute(&input, &output),
        Commands::Summary { input, output } => run_summary(&input, output.as_deref()),
        Commands::Top {
            input,
            population,
            count,
            json,
        } => run_top(&input, population, count, json),
        Commands::Fst {
            input,
            population,
            snps,
            json,
        } => run_fst(&input, population, &snps, json),
        Commands::Significant { input, json } => run_significant(&input, json),
        Commands::Alleles { input, output } => run_alleles(&input, output.as_deref()),
        Commands::Chart {
            input,
            kind,
            zero_fill,
            output,
        } => run_chart(&input, kind, zero_fill, output.as_deref()),
        Commands::DafSummary { input, chromosome } => run_daf_summary(&input, &chromosome),
        Commands::Search { input, query } => run_search(&input, &query),
        Commands::Report {
            input,
            snp_ids,
            output,
        } => run_report(&input, &snp_ids, output.as_deref()),
    }
}

fn load_dataset(args: &InputArgs) -> Result<Dataset> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_yaml(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(matching) = args.allele_matching {
        config.allele_matching = matching;
    }
    debug!("Configuration: {:?}", config);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Loading {}", args.input.display()));

    let loaded = load_snp_records(&args.input)
        .with_context(|| format!("Failed to load SNP table: {}", args.input.display()));
    spinner.finish_and_clear();
    let loaded = loaded?;
    info!("Loaded {} SNPs from {}", loaded.len(), args.input.display());

    let records = if args.use_cached {
        loaded
    } else {
        recompute_statistics(&loaded, config.allele_matching).context("Failed to recompute statistics")?
    };

    Ok(Dataset { config, records })
}

fn run_recompute(args: &InputArgs, output: &Path) -> Result<()> {
    let data = load_dataset(args)?;
    let mut writer = create_csv_writer(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;
    write_records_csv(&mut writer, &data.records)?;
    println!(
        "{}",
        format!("Wrote statistics for {} SNPs to {}", data.records.len(), output.display()).green()
    );
    Ok(())
}

fn run_summary(args: &InputArgs, output: Option<&Path>) -> Result<()> {
    let data = load_dataset(args)?;
    let rows = chromosome_mean_table(&data.records, data.config.missing_policy());
    if rows.is_empty() {
        println!("{}", NO_DATA_MESSAGE.yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["Chromosome", "SNPs", "DAF BEB", "DAF PJL", "ΔAF", "FST BEB", "FST PJL"]);
    for r in &rows {
        table.add_row(row![
            r.chromosome,
            r.snps,
            format_optional_float(r.daf_beb),
            format_optional_float(r.daf_pjl),
            format_optional_float(r.delta_af),
            format_optional_float(r.fst_beb),
            format_optional_float(r.fst_pjl)
        ]);
    }
    table.printstd();

    if let Some(path) = output {
        let mut writer = create_csv_writer(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        write_chromosome_means_csv(&mut writer, &rows)?;
        info!("Chromosome means written to {}", path.display());
    }
    Ok(())
}

fn print_ranked(ranked: &[RankedSnp], json: bool, compact: bool) -> Result<()> {
    if json {
        println!("{}", to_json(ranked, compact)?);
        return Ok(());
    }
    if ranked.is_empty() {
        println!("{}", NO_DATA_MESSAGE.yellow());
        return Ok(());
    }
    let mut table = Table::new();
    table.add_row(row!["SNP ID", "Allele", "FST", "Category"]);
    for r in ranked {
        table.add_row(row![r.snp_id, r.allele, format_optional_float(r.fst), r.category]);
    }
    table.printstd();
    Ok(())
}

fn run_top(args: &InputArgs, population: Population, count: Option<usize>, json: bool) -> Result<()> {
    let data = load_dataset(args)?;
    let n = count.unwrap_or(data.config.top_n);
    let ranked = ranked_fst(&data.records, population, n);
    if !json {
        println!("{}", format!("Top {} SNPs by FST ({})", n, population).cyan().bold());
    }
    print_ranked(&ranked, json, data.config.compact_json)
}

fn run_fst(args: &InputArgs, population: Population, snps: &[String], json: bool) -> Result<()> {
    let data = load_dataset(args)?;
    let selected = selected_fst(&data.records, population, snps);
    if selected.len() < snps.len() {
        warn!("{} of {} requested SNPs were not found", snps.len() - selected.len(), snps.len());
    }
    print_ranked(&selected, json, data.config.compact_json)
}

fn run_significant(args: &InputArgs, json: bool) -> Result<()> {
    let data = load_dataset(args)?;
    let significant = significant_snps(&data.records);
    if json {
        println!("{}", to_json(&significant, data.config.compact_json)?);
        return Ok(());
    }

    println!(
        "{}",
        format!("{} SNPs with p-value < {:e}", significant.len(), SIGNIFICANCE_THRESHOLD)
            .cyan()
            .bold()
    );
    if significant.is_empty() {
        return Ok(());
    }
    let mut table = Table::new();
    table.add_row(row!["SNP ID", "Chromosome", "Position", "p-value"]);
    for r in significant {
        let p = r.p_value.map_or_else(|| "NA".to_string(), |p| format!("{:e}", p));
        table.add_row(row![r.snp_id, r.chromosome, r.position, p]);
    }
    table.printstd();
    Ok(())
}

fn run_alleles(args: &InputArgs, output: Option<&Path>) -> Result<()> {
    let data = load_dataset(args)?;
    let rows = allele_fst_table(&data.records, data.config.allele_matching)?;
    match output {
        Some(path) => {
            let mut writer = create_csv_writer(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_allele_fst_csv(&mut writer, &rows)?;
            info!("FST for {} alleles written to {}", rows.len(), path.display());
        }
        None => {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(io::stdout());
            write_allele_fst_csv(&mut writer, &rows)?;
        }
    }
    Ok(())
}

fn run_chart(args: &InputArgs, kind: ChartKind, zero_fill: bool, output: Option<&Path>) -> Result<()> {
    let mut data = load_dataset(args)?;
    if zero_fill {
        data.config.zero_fill_presentation = true;
    }
    let chart = build_chart(kind, &data.records, data.config.missing_policy());
    if chart.is_empty() {
        warn!("{}: {}", chart.title(), NO_DATA_MESSAGE);
    }

    let renderer = JsonRenderer {
        compact: data.config.compact_json,
    };
    let payload = renderer.render(&chart)?;
    match output {
        Some(path) => {
            std::fs::write(path, payload)
                .with_context(|| format!("Failed to write chart: {}", path.display()))?;
            info!("Chart written to {}", path.display());
        }
        None => println!("{}", payload),
    }
    Ok(())
}

fn run_daf_summary(args: &InputArgs, chromosome: &str) -> Result<()> {
    let chromosome: Chromosome = chromosome.parse()?;
    let data = load_dataset(args)?;
    match summarize_chromosome_daf(&data.records, chromosome) {
        Some(summary) => println!("{}", to_json(&summary, data.config.compact_json)?),
        None => println!(
            "{}",
            to_json(
                &serde_json::json!({ "data": [], "summary": {}, "top_differences": [] }),
                data.config.compact_json
            )?
        ),
    }
    Ok(())
}

fn run_search(args: &InputArgs, query: &str) -> Result<()> {
    let data = load_dataset(args)?;
    let results = search_records(&data.records, query);
    if results.is_empty() {
        println!("{}", format!("No results found for '{}'.", query).red());
        return Ok(());
    }

    println!("{}", format!("Found {} result(s) for '{}'.", results.len(), query).green());
    let mut table = Table::new();
    table.add_row(row!["SNP ID", "Risk Allele", "Chromosome", "Position", "Gene", "ΔAF"]);
    for r in results {
        table.add_row(row![
            r.snp_id,
            r.risk_allele,
            r.chromosome,
            r.position,
            r.mapped_gene.as_deref().unwrap_or("-"),
            format_optional_float(r.delta_af)
        ]);
    }
    table.printstd();
    Ok(())
}

fn run_report(args: &InputArgs, snp_ids: &[String], output: Option<&Path>) -> Result<()> {
    let data = load_dataset(args)?;
    let (found, missing): (Vec<_>, Vec<_>) = snp_ids
        .iter()
        .map(|id| (id, data.records.iter().find(|r| &r.snp_id == id)))
        .partition(|(_, record)| record.is_some());

    if found.is_empty() {
        bail!("SNP not found: {}", snp_ids.join(", "));
    }
    if !missing.is_empty() {
        warn!(
            "{} of {} requested SNPs were not found: {}",
            missing.len(),
            snp_ids.len(),
            missing.iter().map(|(id, _)| id.as_str()).join(", ")
        );
    }

    let records: Vec<&SnpRecord> = found.into_iter().filter_map(|(_, record)| record).collect();
    let report = if records.len() == 1 {
        snp_report(records[0])
    } else {
        snp_reports(records.iter().copied())
    };
    match output {
        Some(path) => {
            std::fs::write(path, &report)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            info!("Report for {} SNPs written to {}", records.len(), path.display());
        }
        None => print!("{}", report),
    }
    Ok(())
}
