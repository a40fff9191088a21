//! Strategy selection and the check-then-transpose state machine.
//!
//! A [`Mode`] names one strategy family: a checker and the transposer with the
//! same traversal. Running a mode always goes through
//!
//! ```text
//! NotStarted ──check──▶ Checked { symmetric } ──┬─ symmetric ──▶ release destination ──▶ Done
//!                                               └─ otherwise ──▶ transpose            ──▶ Done
//! ```
//!
//! and never mixes a checker and a transposer from different families.

use std::fmt;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{configuration_error, Result};
use crate::matrix::{Element, SquareMatrix};
use crate::symmetry::CheckStrategy;
use crate::tiling::validate_dimension;
use crate::transpose::TransposeStrategy;

/// Strategy family. The discriminants are the ids accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Mode {
    Sequential = 1,
    Blocked = 2,
    Recursive = 3,
    ParallelLocalWorkSharing = 4,
    ParallelReductionWorkSharing = 5,
    ParallelLocalBlockBased = 6,
    ParallelReductionBlockBased = 7,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Sequential,
        Mode::Blocked,
        Mode::Recursive,
        Mode::ParallelLocalWorkSharing,
        Mode::ParallelReductionWorkSharing,
        Mode::ParallelLocalBlockBased,
        Mode::ParallelReductionBlockBased,
    ];

    /// Looks a mode up by id.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` for an id outside `1..=7`.
    pub fn from_id(id: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.id() == id)
            .ok_or_else(|| configuration_error(format!("unknown mode {id}: expected 1..=7")))
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    /// Whether this mode runs on a worker pool.
    pub fn is_parallel(self) -> bool {
        self.id() >= Mode::ParallelLocalWorkSharing.id()
    }

    /// Whether matrices for this mode use the aligned row layout. Only the
    /// sequential mode reads rows at no particular granularity.
    pub fn needs_aligned_rows(self) -> bool {
        self != Mode::Sequential
    }

    /// Whether the strategies of this mode are driven by a block size.
    pub fn uses_blocks(self) -> bool {
        matches!(
            self,
            Mode::Blocked
                | Mode::Recursive
                | Mode::ParallelLocalBlockBased
                | Mode::ParallelReductionBlockBased
        )
    }

    pub fn checker(self) -> CheckStrategy {
        match self {
            Mode::Sequential => CheckStrategy::Naive,
            Mode::Blocked => CheckStrategy::Blocked,
            Mode::Recursive => CheckStrategy::Recursive,
            Mode::ParallelLocalWorkSharing | Mode::ParallelLocalBlockBased => {
                CheckStrategy::ParallelLocal
            }
            Mode::ParallelReductionWorkSharing | Mode::ParallelReductionBlockBased => {
                CheckStrategy::ParallelReduction
            }
        }
    }

    pub fn transposer(self) -> TransposeStrategy {
        match self {
            Mode::Sequential => TransposeStrategy::Naive,
            Mode::Blocked => TransposeStrategy::Blocked,
            Mode::Recursive => TransposeStrategy::Recursive,
            Mode::ParallelLocalWorkSharing | Mode::ParallelReductionWorkSharing => {
                TransposeStrategy::ParallelWorkSharing
            }
            Mode::ParallelLocalBlockBased | Mode::ParallelReductionBlockBased => {
                TransposeStrategy::ParallelBlockBased
            }
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Mode::Sequential => "sequential",
            Mode::Blocked => "blocked",
            Mode::Recursive => "recursive",
            Mode::ParallelLocalWorkSharing => "parallel local-flag work-sharing",
            Mode::ParallelReductionWorkSharing => "parallel reduction work-sharing",
            Mode::ParallelLocalBlockBased => "parallel local-flag block-based",
            Mode::ParallelReductionBlockBased => "parallel reduction block-based",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.name())
    }
}

/// Where an [`ExecutionEngine`] is in its current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Checked { symmetric: bool },
    Done,
}

/// Result of one check-then-transpose run.
#[derive(Debug)]
pub enum ExecutionOutcome<T: Element> {
    /// The source was symmetric: no transpose ran and the destination was
    /// released. The source itself is the answer.
    Elided,
    /// The source was not symmetric; this is the populated destination.
    Transposed(SquareMatrix<T>),
}

impl<T: Element> ExecutionOutcome<T> {
    /// `true` when the transpose was skipped.
    pub fn elided(&self) -> bool {
        matches!(self, ExecutionOutcome::Elided)
    }

    pub fn transposed(&self) -> Option<&SquareMatrix<T>> {
        match self {
            ExecutionOutcome::Elided => None,
            ExecutionOutcome::Transposed(t) => Some(t),
        }
    }

    pub fn into_transposed(self) -> Option<SquareMatrix<T>> {
        match self {
            ExecutionOutcome::Elided => None,
            ExecutionOutcome::Transposed(t) => Some(t),
        }
    }
}

/// Runs one mode, on its own worker pool when the mode is parallel.
///
/// The pool is built once in [`new`](Self::new) and reused by every
/// [`run`](Self::run), so its start-up cost stays outside the timed region.
pub struct ExecutionEngine {
    mode: Mode,
    threads: usize,
    pool: Option<ThreadPool>,
    state: EngineState,
}

impl ExecutionEngine {
    /// Creates an engine for `mode`.
    ///
    /// Sequential modes never create a pool and run on the calling thread
    /// whatever `threads` says.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if `threads == 0` or the pool cannot be built.
    pub fn new(mode: Mode, threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(configuration_error("thread count must be positive"));
        }

        let pool = if mode.is_parallel() {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("symtrans-worker-{i}"))
                .build()
                .map_err(|e| configuration_error(format!("cannot start {threads} workers: {e}")))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            mode,
            threads,
            pool,
            state: EngineState::NotStarted,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Worker count: the pool size for parallel modes, 1 otherwise.
    pub fn threads(&self) -> usize {
        if self.pool.is_some() {
            self.threads
        } else {
            1
        }
    }

    /// State reached by the last run.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Checks `source` and, unless it is symmetric, transposes it into
    /// `destination`.
    ///
    /// `destination` is consumed: it is dropped (released) when the transpose
    /// is elided and handed back in [`ExecutionOutcome::Transposed`]
    /// otherwise. `source` is never modified.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if the dimensions are invalid or differ, or if
    /// `block == 0`. Nothing is checked or written in that case.
    pub fn run<T: Element>(
        &mut self,
        source: &SquareMatrix<T>,
        destination: SquareMatrix<T>,
        block: usize,
    ) -> Result<ExecutionOutcome<T>> {
        self.state = EngineState::NotStarted;
        validate_run(source, &destination, source.dim(), block)?;

        let mode = self.mode;
        let state = &mut self.state;
        let outcome = match &self.pool {
            Some(pool) => {
                pool.install(|| check_then_transpose(mode, source, destination, block, state))
            }
            None => check_then_transpose(mode, source, destination, block, state),
        };
        Ok(outcome)
    }
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("mode", &self.mode)
            .field("threads", &self.threads())
            .field("state", &self.state)
            .finish()
    }
}

/// Runs the checker of `mode` on `source` and, when it is not symmetric, the
/// matching transposer into `destination`.
///
/// Parallel modes run on the current rayon pool; use [`ExecutionEngine`] for
/// a pool of a fixed size. `n` is the dimension both matrices must have.
///
/// # Errors
///
/// `ConfigurationError` if `n` is not a valid dimension, either matrix is not
/// `n × n`, or `block == 0`.
pub fn run_symmetry_check_and_transpose<T: Element>(
    mode: Mode,
    source: &SquareMatrix<T>,
    destination: SquareMatrix<T>,
    n: usize,
    block: usize,
) -> Result<ExecutionOutcome<T>> {
    validate_run(source, &destination, n, block)?;
    let mut state = EngineState::NotStarted;
    Ok(check_then_transpose(mode, source, destination, block, &mut state))
}

fn validate_run<T: Element>(
    source: &SquareMatrix<T>,
    destination: &SquareMatrix<T>,
    n: usize,
    block: usize,
) -> Result<()> {
    validate_dimension(n)?;
    if source.dim() != n || destination.dim() != n {
        return Err(configuration_error(format!(
            "expected {n}x{n} matrices, got source {s}x{s} and destination {d}x{d}",
            s = source.dim(),
            d = destination.dim()
        )));
    }
    if block == 0 {
        return Err(configuration_error("block size must be positive"));
    }
    Ok(())
}

fn check_then_transpose<T: Element>(
    mode: Mode,
    source: &SquareMatrix<T>,
    mut destination: SquareMatrix<T>,
    block: usize,
    state: &mut EngineState,
) -> ExecutionOutcome<T> {
    let symmetric = mode.checker().check(source, block);
    *state = EngineState::Checked { symmetric };

    let outcome = if symmetric {
        destination.release();
        ExecutionOutcome::Elided
    } else {
        mode.transposer().transpose(source, &mut destination, block);
        ExecutionOutcome::Transposed(destination)
    };

    *state = EngineState::Done;
    outcome
}
