//! Measurement plumbing around the core.
//!
//! Everything here exists for the `symtrans` binary: parsing and validating
//! the command line, generating test matrices, evicting caches between
//! samples, averaging sample times and appending them to result files. None
//! of it is needed to check or transpose a matrix.

pub mod cache;
pub mod config;
pub mod pattern;
pub mod results;
pub mod stats;

pub use cache::{clear_all_caches, CacheSizes};
pub use config::{BenchConfig, RunPlan, MIN_SAMPLES};
pub use pattern::TestPattern;
pub use results::{spot_check, ResultsStore, RunRecord, SpotCheck, BASELINE_CODE};
pub use stats::{trimmed_mean, TrimmedMean};
