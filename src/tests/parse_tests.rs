use crate::error::SnpError;
use crate::parse::*;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

const HEADER: &str = "SNP ID,Risk Allele,Chromosome,Position,P Value,Odds Ratio,BEB,PJL,Mapped Gene";

#[test]
fn test_extract_frequency_present_and_absent() {
    let field = Some("A: 0.8, G: 0.2");
    assert_eq!(extract_frequency(field, "A", AlleleMatching::Exact), Some(0.8));
    assert_eq!(extract_frequency(field, "G", AlleleMatching::Exact), Some(0.2));
    assert_eq!(extract_frequency(field, "T", AlleleMatching::Exact), None);
}

#[test]
fn test_extract_frequency_null_and_empty_fields() {
    assert_eq!(extract_frequency(None, "A", AlleleMatching::Exact), None);
    assert_eq!(extract_frequency(Some(""), "A", AlleleMatching::Exact), None);
    assert_eq!(extract_frequency(Some("   "), "A", AlleleMatching::Exact), None);
    assert_eq!(extract_frequency(Some("A: 0.5"), "", AlleleMatching::Exact), None);
}

#[test]
fn test_extract_frequency_true_zero_is_not_absence() {
    let field = Some("A: 0, G: 1");
    assert_eq!(extract_frequency(field, "A", AlleleMatching::Exact), Some(0.0));
    assert_eq!(extract_frequency(field, "C", AlleleMatching::Exact), None);
}

#[test]
fn test_extract_frequency_malformed_number() {
    assert_eq!(extract_frequency(Some("A: 0.8.1"), "A", AlleleMatching::Exact), None);
    assert_eq!(extract_frequency(Some("A: n/a"), "A", AlleleMatching::Exact), None);
    assert_eq!(extract_frequency(Some("garbage"), "A", AlleleMatching::Exact), None);
}

#[test]
fn test_extract_frequency_first_occurrence_and_spacing() {
    assert_eq!(extract_frequency(Some("A:0.3,A: 0.9"), "A", AlleleMatching::Exact), Some(0.3));
    assert_eq!(extract_frequency(Some("C:   0.125"), "C", AlleleMatching::Exact), Some(0.125));
}

#[test]
fn test_extract_frequency_does_not_match_inside_longer_allele() {
    let field = Some("GA: 0.3, A: 0.7");
    assert_eq!(extract_frequency(field, "A", AlleleMatching::Exact), Some(0.7));
    assert_eq!(extract_frequency(Some("GA: 0.3"), "A", AlleleMatching::Exact), None);
}

#[test]
fn test_extract_frequency_case_matching() {
    let field = Some("a: 0.4, g: 0.6");
    assert_eq!(extract_frequency(field, "A", AlleleMatching::Exact), None);
    assert_eq!(extract_frequency(field, "A", AlleleMatching::CaseInsensitive), Some(0.4));
}

#[test]
fn test_extract_frequency_scientific_notation() {
    let field = Some("A: 1e-05, G: 0.99999");
    let single = extract_frequency(field, "A", AlleleMatching::Exact);
    assert_eq!(single, Some(1e-5));
    assert_eq!(single, parse_frequencies(field, AlleleMatching::Exact).get("A").copied());
    assert_eq!(extract_frequency(field, "G", AlleleMatching::Exact), Some(0.99999));
}

#[test]
fn test_extract_frequency_agrees_with_parse_frequencies() {
    let fields = [
        "A: 0.8, G: 0.2",
        "GA: 0.3, A: 0.7",
        "A:0.3,A: 0.9",
        "a: 0.4, g: 0.6",
        "A: 0.8, junk, G: x, T: 2.5E-3",
    ];
    for field in fields {
        for matching in [AlleleMatching::Exact, AlleleMatching::CaseInsensitive] {
            let map = parse_frequencies(Some(field), matching);
            for (allele, freq) in &map {
                assert_eq!(extract_frequency(Some(field), allele, matching), Some(*freq), "{}", field);
            }
        }
    }
}

#[test]
fn test_parse_frequencies_all_alleles() {
    let map = parse_frequencies(Some("A: 0.8, G: 0.2"), AlleleMatching::Exact);
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("A"), Some(&0.8));
    assert_eq!(map.get("G"), Some(&0.2));
}

#[test]
fn test_parse_frequencies_missing_field_is_empty() {
    assert!(parse_frequencies(None, AlleleMatching::Exact).is_empty());
    assert!(parse_frequencies(Some(""), AlleleMatching::Exact).is_empty());
}

#[test]
fn test_parse_frequencies_skips_bad_entries() {
    let map = parse_frequencies(Some("A: 0.8, junk, G: x, : 0.3, T: 0.1, C: NaN"), AlleleMatching::Exact);
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("A"), Some(&0.8));
    assert_eq!(map.get("T"), Some(&0.1));
}

#[test]
fn test_parse_frequencies_case_insensitive_uppercases_keys() {
    let map = parse_frequencies(Some("a: 0.4, G: 0.6"), AlleleMatching::CaseInsensitive);
    assert_eq!(map.get("A"), Some(&0.4));
    assert_eq!(map.get("G"), Some(&0.6));
    assert!(map.get("a").is_none());
}

#[test]
fn test_normalize_header() {
    assert_eq!(normalize_header(" SNP ID "), "snp_id");
    assert_eq!(normalize_header("P  Value"), "p_value");
    assert_eq!(normalize_header("beb"), "beb");
}

#[test]
fn test_delimiter_for_extensions() {
    use std::path::Path;
    assert_eq!(delimiter_for(Path::new("snps.csv")), b',');
    assert_eq!(delimiter_for(Path::new("snps.tsv")), b'\t');
    assert_eq!(delimiter_for(Path::new("snps.TSV.gz")), b'\t');
    assert_eq!(delimiter_for(Path::new("snps.csv.gz")), b',');
}

#[test]
fn test_read_snp_records_basic() {
    let data = format!(
        "{}\n\
         rs1,A,1,1000,1e-59,1.2,\"A: 0.8, G: 0.2\",\"A: 0.6, G: 0.4\",TCF7L2\n\
         rs2,T,chr10,2000.0,0.03,,\"C: 0.5, T: 0.5\",,\n",
        HEADER
    );
    let records = read_snp_records(data.as_bytes(), b',').unwrap();
    assert_eq!(records.len(), 2);

    let first = &records[0];
    assert_eq!(first.snp_id, "rs1");
    assert_eq!(first.chromosome.name(), "1");
    assert_eq!(first.position, 1000);
    assert_eq!(first.p_value, Some(1e-59));
    assert_eq!(first.odds_ratio, Some(1.2));
    assert_eq!(first.beb.as_deref(), Some("A: 0.8, G: 0.2"));
    assert_eq!(first.mapped_gene.as_deref(), Some("TCF7L2"));
    assert_eq!(first.daf_beb, None);

    let second = &records[1];
    assert_eq!(second.chromosome.name(), "10");
    assert_eq!(second.position, 2000);
    assert_eq!(second.odds_ratio, None);
    assert_eq!(second.pjl, None);
    assert_eq!(second.mapped_gene, None);
}

#[test]
fn test_read_snp_records_missing_required_column() {
    let data = "snp_id,risk_allele,chromosome,position,beb,pjl\nrs1,A,1,10,A: 1,A: 1\n";
    match read_snp_records(data.as_bytes(), b',') {
        Err(SnpError::MissingColumn(cols)) => assert_eq!(cols, "p_value"),
        other => panic!("expected MissingColumn, got {:?}", other),
    }
}

#[test]
fn test_read_snp_records_reports_every_missing_column() {
    let data = "snp_id,position\nrs1,10\n";
    match read_snp_records(data.as_bytes(), b',') {
        Err(SnpError::MissingColumn(cols)) => {
            assert_eq!(cols, "risk_allele, chromosome, p_value, beb, pjl")
        }
        other => panic!("expected MissingColumn, got {:?}", other),
    }
}

#[test]
fn test_read_snp_records_skips_unknown_chromosome() {
    let data = format!("{}\nrs1,A,MT,5,0.1,,A: 1,A: 1,\nrs2,A,X,6,0.1,,A: 1,A: 1,\n", HEADER);
    let records = read_snp_records(data.as_bytes(), b',').unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].snp_id, "rs2");
}

#[test]
fn test_read_snp_records_invalid_position_is_fatal() {
    let data = format!("{}\nrs1,A,1,abc,0.1,,A: 1,A: 1,\n", HEADER);
    match read_snp_records(data.as_bytes(), b',') {
        Err(SnpError::Parse(msg)) => assert!(msg.contains("line 2"), "{}", msg),
        other => panic!("expected Parse error, got {:?}", other),
    }
}

#[test]
fn test_read_snp_records_invalid_p_value_is_fatal() {
    let data = format!("{}\nrs1,A,1,10,tiny,,A: 1,A: 1,\n", HEADER);
    assert!(matches!(read_snp_records(data.as_bytes(), b','), Err(SnpError::Parse(_))));
}

#[test]
fn test_read_snp_records_empty_required_cells_are_fatal() {
    let cases = [
        ("rs1,A,,10,1e-60,,A: 1,A: 1,", "Empty chromosome for rs1 on line 2"),
        ("rs2,A,1,10,,,A: 1,A: 1,", "Empty p_value for rs2 on line 2"),
        ("rs3,,1,10,0.001,,A: 1,A: 1,", "Empty risk_allele for rs3 on line 2"),
        ("rs4,A,1,,0.001,,A: 1,A: 1,", "Empty position for rs4 on line 2"),
    ];
    for (row, expected) in cases {
        let data = format!("{}\n{}\n", HEADER, row);
        match read_snp_records(data.as_bytes(), b',') {
            Err(SnpError::Parse(msg)) => assert_eq!(msg, expected),
            other => panic!("expected Parse error for '{}', got {:?}", row, other),
        }
    }
}

#[test]
fn test_read_snp_records_empty_chromosome_is_not_skipped() {
    // a later valid row must not hide the bad one
    let data = format!(
        "{}\nrs1,A,,10,1e-60,,A: 1,A: 1,\nrs2,A,2,20,0.5,,A: 1,A: 1,\n",
        HEADER
    );
    assert!(matches!(read_snp_records(data.as_bytes(), b','), Err(SnpError::Parse(_))));
}

#[test]
fn test_read_snp_records_keeps_cached_columns() {
    let data = "snp_id\trisk_allele\tchromosome\tposition\tp_value\tbeb\tpjl\tdaf_beb\tfst_pjl\n\
                rs9\tG\t22\t99\t0.5\tG: 0.1\tG: 0.3\t0.1\t0.042\n";
    let records = read_snp_records(data.as_bytes(), b'\t').unwrap();
    assert_eq!(records[0].daf_beb, Some(0.1));
    assert_eq!(records[0].fst_pjl, Some(0.042));
    assert_eq!(records[0].daf_pjl, None);
}

#[test]
fn test_load_snp_records_from_gzip() -> Result<(), Box<dyn std::error::Error>> {
    let file = tempfile::Builder::new().suffix(".csv.gz").tempfile()?;
    {
        let mut encoder = GzEncoder::new(file.reopen()?, Compression::default());
        writeln!(encoder, "{}", HEADER)?;
        writeln!(encoder, "rs1,A,2,10,0.01,,\"A: 0.5\",\"A: 0.25\",")?;
        encoder.finish()?;
    }
    let records = load_snp_records(file.path())?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chromosome.name(), "2");
    Ok(())
}

#[test]
fn test_load_snp_records_plain_tsv() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = tempfile::Builder::new().suffix(".tsv").tempfile()?;
    writeln!(file, "snp_id\trisk_allele\tchromosome\tposition\tp_value\tbeb\tpjl")?;
    writeln!(file, "rs7\tC\t7\t70\t1e-3\tC: 0.2, T: 0.8\tC: 0.3, T: 0.7")?;
    file.flush()?;
    let records = load_snp_records(file.path())?;
    assert_eq!(records[0].snp_id, "rs7");
    assert_eq!(records[0].pjl.as_deref(), Some("C: 0.3, T: 0.7"));
    Ok(())
}

#[test]
fn test_load_snp_records_missing_file() {
    let missing = NamedTempFile::new().unwrap().path().with_extension("absent.csv");
    assert!(matches!(load_snp_records(&missing), Err(SnpError::Io(_))));
}
