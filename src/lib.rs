//! Population-genetics statistics for SNPs compared between the BEB and PJL
//! populations: derived allele frequency, ΔAF, Wright's FST, differentiation
//! categories and per-chromosome aggregation for charting.

pub mod config;
pub mod error;
pub mod parse;
pub mod process;
pub mod render;
pub mod stats;

pub use crate::error::SnpError;

#[cfg(test)]
mod tests;
