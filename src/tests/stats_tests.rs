use super::make_snp;
use crate::error::SnpError;
use crate::parse::{parse_frequencies, AlleleMatching};
use crate::stats::*;

use rand::Rng;

const EPS: f64 = 1e-12;

#[test]
fn test_fst_no_differentiation() {
    assert_eq!(calculate_fst(0.5, 0.5).unwrap(), 0.0);
    assert!(calculate_fst(0.3, 0.3).unwrap().abs() < EPS);
}

#[test]
fn test_fst_fixed_allele_convention() {
    // H_t == 0 is defined as 0, not NaN
    assert_eq!(calculate_fst(0.0, 0.0).unwrap(), 0.0);
    assert_eq!(calculate_fst(1.0, 1.0).unwrap(), 0.0);
}

#[test]
fn test_fst_maximal_differentiation() {
    let fst = calculate_fst(1.0, 0.0).unwrap();
    assert!(fst > 0.9, "FST {} too low for fixed difference", fst);
    assert!((fst - 1.0).abs() < EPS);
}

#[test]
fn test_fst_known_value() {
    // p_bar = 0.5, H_t = 0.25, H_s = 0.16
    let fst = calculate_fst(0.8, 0.2).unwrap();
    assert!((fst - 0.36).abs() < 1e-9, "got {}", fst);
}

#[test]
fn test_fst_symmetry_random() {
    let mut rng = rand::thread_rng();
    for _ in 0..1000 {
        let p1: f64 = rng.gen_range(0.0..=1.0);
        let p2: f64 = rng.gen_range(0.0..=1.0);
        let a = calculate_fst(p1, p2).unwrap();
        let b = calculate_fst(p2, p1).unwrap();
        assert!((a - b).abs() < EPS, "fst({}, {}) = {} but reversed = {}", p1, p2, a, b);
        assert!(a >= -EPS && a <= 1.0 + EPS, "FST {} outside [0, 1]", a);
    }
}

#[test]
fn test_fst_rejects_out_of_range() {
    assert!(matches!(calculate_fst(1.2, 0.5), Err(SnpError::InvalidInput(_))));
    assert!(matches!(calculate_fst(0.5, -0.01), Err(SnpError::InvalidInput(_))));
    assert!(matches!(calculate_fst(f64::NAN, 0.5), Err(SnpError::InvalidInput(_))));
}

#[test]
fn test_delta_af() {
    assert_eq!(calculate_delta_af(Some(0.3), Some(0.3)), Some(0.0));
    assert_eq!(calculate_delta_af(Some(0.8), None), None);
    assert_eq!(calculate_delta_af(None, Some(0.8)), None);
    assert_eq!(calculate_delta_af(None, None), None);
    let d = calculate_delta_af(Some(0.2), Some(0.7)).unwrap();
    assert!((d - 0.5).abs() < EPS);
}

#[test]
fn test_delta_af_is_absolute() {
    assert_eq!(
        calculate_delta_af(Some(0.9), Some(0.4)),
        calculate_delta_af(Some(0.4), Some(0.9))
    );
}

#[test]
fn test_classify_boundaries() {
    assert_eq!(classify_fst(Some(0.049)), FstCategory::LittleDiff);
    assert_eq!(classify_fst(Some(0.05)), FstCategory::ModerateDiff);
    assert_eq!(classify_fst(Some(0.1499)), FstCategory::ModerateDiff);
    assert_eq!(classify_fst(Some(0.15)), FstCategory::GreatDiff);
    assert_eq!(classify_fst(Some(0.25)), FstCategory::VeryGreatDiff);
    assert_eq!(classify_fst(Some(0.9)), FstCategory::VeryGreatDiff);
    assert_eq!(classify_fst(Some(-0.01)), FstCategory::LittleDiff);
    assert_eq!(classify_fst(None), FstCategory::NoData);
    assert_eq!(classify_fst(Some(f64::NAN)), FstCategory::NoData);
}

#[test]
fn test_category_labels() {
    assert_eq!(FstCategory::LittleDiff.to_string(), "Little genetic diff.");
    assert_eq!(FstCategory::VeryGreatDiff.label(), "Very great genetic diff.");
    assert_eq!(serde_json::to_string(&FstCategory::NoData).unwrap(), "\"No data\"");
}

#[test]
fn test_calculate_daf_per_population() {
    let snp = make_snp("rs1", "1", 10, "A", Some("A: 0.8, G: 0.2"), Some("G: 1.0"));
    let daf = calculate_daf(&snp, AlleleMatching::Exact);
    assert_eq!(daf.beb, Some(0.8));
    assert_eq!(daf.pjl, None);

    let missing = make_snp("rs2", "1", 10, "A", None, None);
    assert_eq!(calculate_daf(&missing, AlleleMatching::Exact), DafPair::default());
}

#[test]
fn test_risk_allele_fst_requires_both_populations() {
    let both = DafPair { beb: Some(1.0), pjl: Some(0.0) };
    assert!((calculate_risk_allele_fst(&both).unwrap().unwrap() - 1.0).abs() < EPS);

    let one = DafPair { beb: Some(0.4), pjl: None };
    assert_eq!(calculate_risk_allele_fst(&one).unwrap(), None);
}

#[test]
fn test_allele_fst_skips_one_sided_alleles() {
    let beb = parse_frequencies(Some("A: 0.8, G: 0.2"), AlleleMatching::Exact);
    let pjl = parse_frequencies(Some("A: 0.2, C: 0.8"), AlleleMatching::Exact);
    let results = calculate_allele_fst("rs1", &beb, &pjl).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].allele, "A");
    assert_eq!(results[0].fst, 0.36);
    assert_eq!(results[0].category, FstCategory::VeryGreatDiff);
}

#[test]
fn test_allele_fst_invalid_frequency_names_snp() {
    let beb = parse_frequencies(Some("A: 1.5"), AlleleMatching::Exact);
    let pjl = parse_frequencies(Some("A: 0.5"), AlleleMatching::Exact);
    match calculate_allele_fst("rs42", &beb, &pjl) {
        Err(SnpError::InvalidInput(msg)) => assert!(msg.contains("rs42"), "{}", msg),
        other => panic!("expected InvalidInput, got {:?}", other),
    }
}

#[test]
fn test_significance_threshold() {
    assert!(is_significant(Some(1e-59)));
    assert!(!is_significant(Some(1e-57)));
    assert!(!is_significant(Some(SIGNIFICANCE_THRESHOLD)));
    assert!(!is_significant(None));
}

#[test]
fn test_round_to() {
    assert_eq!(round_to(0.123456, 5), 0.12346);
    assert_eq!(round_to(0.0, 5), 0.0);
}

#[test]
fn test_mean() {
    assert_eq!(mean(&[]), None);
    assert_eq!(mean(&[0.2, 0.4]), Some(0.30000000000000004));
}

#[test]
fn test_five_number_summary() {
    let s = five_number_summary(&[5.0, 1.0, 3.0, 2.0, 4.0]).unwrap();
    assert_eq!(s.min, 1.0);
    assert_eq!(s.q1, 2.0);
    assert_eq!(s.median, 3.0);
    assert_eq!(s.q3, 4.0);
    assert_eq!(s.max, 5.0);

    let even = five_number_summary(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    assert!((even.median - 2.5).abs() < EPS);
    assert!((even.q1 - 1.75).abs() < EPS);

    assert!(five_number_summary(&[]).is_none());
    assert!(five_number_summary(&[f64::NAN]).is_none());
}
