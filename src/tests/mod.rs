mod parse_tests;
mod stats_tests;

use crate::process::{Chromosome, SnpRecord};

/// Builds a record with raw frequency fields and no cached statistics.
pub(crate) fn make_snp(
    snp_id: &str,
    chromosome: &str,
    position: u64,
    risk_allele: &str,
    beb: Option<&str>,
    pjl: Option<&str>,
) -> SnpRecord {
    SnpRecord {
        snp_id: snp_id.to_string(),
        risk_allele: risk_allele.to_string(),
        chromosome: chromosome.parse::<Chromosome>().unwrap(),
        position,
        p_value: Some(1e-8),
        odds_ratio: None,
        beb: beb.map(String::from),
        pjl: pjl.map(String::from),
        mapped_gene: None,
        trait_name: None,
        daf_beb: None,
        daf_pjl: None,
        delta_af: None,
        fst_beb: None,
        fst_pjl: None,
    }
}
