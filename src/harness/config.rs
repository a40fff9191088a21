use std::path::PathBuf;

use clap::Parser;

use crate::engine::Mode;
use crate::error::{configuration_error, Result};
use crate::harness::pattern::TestPattern;
use crate::tiling::{compute_block_size, dimension_from_exponent};

/// Fewest samples a run accepts; the trimmed mean keeps the middle 40%.
pub const MIN_SAMPLES: usize = 25;

/// Command line of the `symtrans` benchmark binary.
///
/// ```text
/// symtrans <CODE> <MODE> <EXPONENT> <TEST> <SAMPLES> [THREADS]
/// ```
#[derive(Parser, Debug, Clone)]
#[command(name = "symtrans")]
#[command(about = "Benchmarks symmetry check and transposition of square f32 matrices")]
#[command(version)]
pub struct BenchConfig {
    /// Label of the build being measured. Averages recorded with mode 1 and
    /// label SO0 are the sequential baseline for speedup.
    pub code: String,

    /// Strategy: 1 sequential, 2 blocked, 3 recursive, 4 parallel local-flag
    /// work-sharing, 5 parallel reduction work-sharing, 6 parallel local-flag
    /// block-based, 7 parallel reduction block-based
    pub mode: u32,

    /// Matrix side as a power of two, from 4 (16) to 12 (4096)
    pub exponent: u32,

    /// Test matrix: 0 random, 1 static random, 2 symmetric, 3 worst case
    pub test: u32,

    /// Number of timed samples (at least 25)
    pub samples: usize,

    /// Worker threads; required by modes 4 to 7, ignored otherwise
    pub threads: Option<usize>,

    /// Directory the result files are appended to
    #[arg(long, default_value = ".")]
    pub results_dir: PathBuf,

    /// Skip cache eviction before each sample
    #[arg(long)]
    pub no_flush: bool,
}

/// A validated [`BenchConfig`], with every derived parameter resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub code: String,
    pub mode: Mode,
    pub n: usize,
    pub pattern: TestPattern,
    pub samples: usize,
    pub threads: usize,
    pub block: usize,
    pub results_dir: PathBuf,
    pub flush: bool,
}

impl BenchConfig {
    /// Checks every argument and derives the dimension, thread count and block
    /// size.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` for an unknown mode or test pattern, an exponent
    /// outside `4..=12`, fewer than [`MIN_SAMPLES`] samples, a missing or zero
    /// thread count in a parallel mode, or a dimension too small to split into
    /// two tiles.
    pub fn validate(&self) -> Result<RunPlan> {
        let mode = Mode::from_id(self.mode)?;
        let n = dimension_from_exponent(self.exponent)?;
        let pattern = TestPattern::from_id(self.test)?;

        if self.samples < MIN_SAMPLES {
            return Err(configuration_error(format!(
                "invalid samples number {}: it has to be at least {MIN_SAMPLES}",
                self.samples
            )));
        }

        let threads = if mode.is_parallel() {
            match self.threads {
                Some(t) if t > 0 => t,
                Some(_) => {
                    return Err(configuration_error(
                        "invalid number of threads: it has to be positive",
                    ))
                }
                None => {
                    return Err(configuration_error(format!(
                        "mode {mode} needs a thread count"
                    )))
                }
            }
        } else {
            1
        };

        let block = compute_block_size::<f32>(n, threads)?;

        Ok(RunPlan {
            code: self.code.clone(),
            mode,
            n,
            pattern,
            samples: self.samples,
            threads,
            block,
            results_dir: self.results_dir.clone(),
            flush: !self.no_flush,
        })
    }
}
