//! Symmetry checkers.
//!
//! Every checker answers the same question, whether `M[i][j]` matches
//! `M[j][i]` (see [`Element::matches`]) for every pair, and must give the same
//! answer on the same input. They differ only in traversal order and
//! concurrency:
//!
//! | Checker                     | Traversal                                   | Early exit                         |
//! |-----------------------------|---------------------------------------------|------------------------------------|
//! | [`check_sym`]               | strict lower triangle, row-major            | first mismatch                     |
//! | [`check_sym_blocked`]       | lower-triangle tiles, row-major in a tile   | first mismatch                     |
//! | [`check_sym_recursive`]     | quadrant recursion, above-diagonal skipped  | first failing quadrant             |
//! | [`par_check_sym_local`]     | parallel over rows                          | shared flag, checked per row       |
//! | [`par_check_sym_reduction`] | parallel over rows                          | none across workers (AND-reduce)   |

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::matrix::{Element, SquareMatrix};
use crate::tiling::Region;
use crate::MIN_TILE;

/// Checker strategy, one per family of [`Mode`](crate::Mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStrategy {
    Naive,
    Blocked,
    Recursive,
    ParallelLocal,
    ParallelReduction,
}

impl CheckStrategy {
    pub const ALL: [CheckStrategy; 5] = [
        CheckStrategy::Naive,
        CheckStrategy::Blocked,
        CheckStrategy::Recursive,
        CheckStrategy::ParallelLocal,
        CheckStrategy::ParallelReduction,
    ];

    /// Runs this checker on `m`. `block` is ignored by the strategies that do
    /// not tile.
    ///
    /// # Panics
    ///
    /// Panics if a tiling strategy is given `block == 0`.
    pub fn check<T: Element>(self, m: &SquareMatrix<T>, block: usize) -> bool {
        match self {
            CheckStrategy::Naive => check_sym(m),
            CheckStrategy::Blocked => check_sym_blocked(m, block),
            CheckStrategy::Recursive => check_sym_recursive(m, Region::full(m.dim()), block),
            CheckStrategy::ParallelLocal => par_check_sym_local(m),
            CheckStrategy::ParallelReduction => par_check_sym_reduction(m),
        }
    }

    pub fn is_parallel(self) -> bool {
        matches!(
            self,
            CheckStrategy::ParallelLocal | CheckStrategy::ParallelReduction
        )
    }
}

/// Whether row `i` matches column `i` over the strict lower triangle (`j < i`).
#[inline(always)]
fn row_matches_column<T: Element>(m: &SquareMatrix<T>, i: usize) -> bool {
    let row = m.row(i);
    row[..i]
        .iter()
        .enumerate()
        .all(|(j, &x)| T::matches(x, m.get(j, i)))
}

/// Scans the strict lower triangle row by row, stopping at the first mismatch.
///
/// ```text
///   j → 0 1 2 .. n-1
/// i 0   .
/// ↓ 1   x .
///   2   x x .
///  ..   x x x .
/// ```
pub fn check_sym<T: Element>(m: &SquareMatrix<T>) -> bool {
    (1..m.dim()).all(|i| row_matches_column(m, i))
}

/// Tile-by-tile scan of the lower-triangle tiles (`tile column <= tile row`),
/// row-major inside each tile.
///
/// Diagonal tiles are scanned whole; comparing a pair twice cannot change the
/// answer.
///
/// # Panics
///
/// Panics if `block == 0`.
pub fn check_sym_blocked<T: Element>(m: &SquareMatrix<T>, block: usize) -> bool {
    assert!(block > 0, "block size must be positive");
    let n = m.dim();

    for i in (0..n).step_by(block) {
        let k_end = (i + block).min(n);
        for j in (0..=i).step_by(block) {
            let l_end = (j + block).min(n);
            for k in i..k_end {
                let row_k = m.row(k);
                for l in j..l_end {
                    if !T::matches(row_k[l], m.get(l, k)) {
                        return false;
                    }
                }
            }
        }
    }
    true
}

/// Divide-and-conquer check of `region`.
///
/// Once both extents are at most `block` the region is scanned directly,
/// restricted to `col < row`. Otherwise both ranges are halved and the
/// quadrants are visited top-left, bottom-left, top-right, bottom-right,
/// skipping any quadrant that lies entirely on or above the diagonal. On a
/// region straddling the diagonal that is always the top-right one; regions
/// strictly below it keep all four. A later quadrant is never started once an
/// earlier one failed.
///
/// # Panics
///
/// Panics if `block == 0`.
pub fn check_sym_recursive<T: Element>(m: &SquareMatrix<T>, region: Region, block: usize) -> bool {
    assert!(block > 0, "block size must be positive");
    recurse_check(m, region, block)
}

fn recurse_check<T: Element>(m: &SquareMatrix<T>, region: Region, block: usize) -> bool {
    if region.fits(block) {
        return (region.row_start..region.row_end).all(|i| {
            let row = m.row(i);
            let j_end = region.col_end.min(i);
            (region.col_start..j_end).all(|j| T::matches(row[j], m.get(j, i)))
        });
    }

    let q = region.split();
    [q.top_left, q.bottom_left, q.top_right, q.bottom_right]
        .into_iter()
        .filter(Region::reaches_below_diagonal)
        .all(|quadrant| recurse_check(m, quadrant, block))
}

/// Shared stop signal for cooperative cancellation.
///
/// Workers poll [`should_stop`](Self::should_stop) at iteration boundaries;
/// nothing is ever interrupted mid-iteration.
#[derive(Debug, Default)]
pub struct CancellationFlag {
    stopped: AtomicBool,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn should_stop(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn signal(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Parallel row scan with a shared mismatch flag.
///
/// Each outer iteration reads the flag first and is skipped once it is set.
/// The worker that finds a mismatch sets the flag and abandons the rest of its
/// own row; rows already in flight on other workers run to completion.
pub fn par_check_sym_local<T: Element>(m: &SquareMatrix<T>) -> bool {
    let mismatch = CancellationFlag::new();

    (1..m.dim())
        .into_par_iter()
        .with_min_len(MIN_TILE)
        .for_each(|i| {
            if mismatch.should_stop() {
                return;
            }
            if !row_matches_column(m, i) {
                mismatch.signal();
            }
        });

    !mismatch.should_stop()
}

/// Parallel row scan combined with a logical-AND reduction.
///
/// Every outer iteration is visited; within one worker's fold, rows after a
/// local mismatch are skipped by the `symmetric &&` guard. There is no
/// cross-worker cancellation and no atomic.
pub fn par_check_sym_reduction<T: Element>(m: &SquareMatrix<T>) -> bool {
    (1..m.dim())
        .into_par_iter()
        .with_min_len(MIN_TILE)
        .fold(|| true, |symmetric, i| symmetric && row_matches_column(m, i))
        .reduce(|| true, |a, b| a && b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{allocate, allocate_aligned};

    fn symmetric(n: usize) -> SquareMatrix<f32> {
        let mut m = allocate_aligned::<f32>(n, MIN_TILE).unwrap();
        m.fill_with(|i, j| (i * j) as f32 + (i + j) as f32 * 0.25);
        m
    }

    fn all_agree(m: &SquareMatrix<f32>, block: usize) -> bool {
        let answers: Vec<bool> = CheckStrategy::ALL
            .iter()
            .map(|s| s.check(m, block))
            .collect();
        assert!(
            answers.windows(2).all(|w| w[0] == w[1]),
            "checkers disagree: {answers:?}"
        );
        answers[0]
    }

    #[test]
    fn test_symmetric_detected() {
        for n in [16, 32, 64, 128] {
            let m = symmetric(n);
            for block in [8, 16] {
                assert!(all_agree(&m, block), "n={n} block={block}");
            }
        }
    }

    #[test]
    fn test_single_mismatch_anywhere() {
        let n = 32;
        for (i, j) in [(1, 0), (0, 31), (31, 30), (17, 4), (20, 10), (8, 23), (15, 16)] {
            let mut m = symmetric(n);
            m.set(i, j, -100.0);
            assert!(!all_agree(&m, 8), "mismatch at ({i},{j}) missed");
        }
    }

    #[test]
    fn test_diagonal_is_ignored() {
        let mut m = symmetric(16);
        for i in 0..16 {
            m.set(i, i, i as f32 * 3.0 - 7.0);
        }
        assert!(all_agree(&m, 8));
    }

    #[test]
    fn test_tolerance() {
        let mut m = symmetric(16);
        let v = m.get(3, 9);
        m.set(3, 9, v + 1e-7);
        assert!(all_agree(&m, 8));
        m.set(3, 9, v + 1e-3);
        assert!(!all_agree(&m, 8));
    }

    #[test]
    fn test_nan_counts_as_mismatch() {
        let mut m = symmetric(16);
        m.set(5, 2, f32::NAN);
        assert!(!all_agree(&m, 8));
    }

    #[test]
    fn test_standard_layout_works_too() {
        let mut m = allocate::<f64>(16).unwrap();
        m.fill(5.0);
        assert!(CheckStrategy::Naive.check(&m, 8));
        assert!(CheckStrategy::Recursive.check(&m, 8));
    }

    #[test]
    fn test_recursive_sub_region() {
        let mut m = symmetric(32);
        // Mismatch inside the bottom-left quarter only
        m.set(20, 3, 1000.0);
        let top_left = Region::full(32).split().top_left;
        assert!(check_sym_recursive(&m, top_left, 8));
        assert!(!check_sym_recursive(&m, Region::full(32), 8));
    }

    #[test]
    fn test_recursive_visits_off_diagonal_sub_quadrants() {
        // (20, 10) sits in the top-right quarter of the bottom-left quadrant
        let mut m = symmetric(32);
        m.set(20, 10, 1000.0);
        assert!(!check_sym_recursive(&m, Region::full(32), 8));
        let mut m = symmetric(64);
        m.set(41, 26, 1000.0);
        assert!(!check_sym_recursive(&m, Region::full(64), 8));
    }

    #[test]
    fn test_recursive_with_block_larger_than_matrix() {
        let m = symmetric(16);
        assert!(check_sym_recursive(&m, Region::full(16), 64));
    }

    #[test]
    fn test_cancellation_flag() {
        let flag = CancellationFlag::new();
        assert!(!flag.should_stop());
        flag.signal();
        assert!(flag.should_stop());
        flag.signal();
        assert!(flag.should_stop());
    }

    #[test]
    #[should_panic(expected = "block size must be positive")]
    fn test_blocked_rejects_zero_block() {
        let m = symmetric(16);
        check_sym_blocked(&m, 0);
    }

    #[test]
    fn test_is_parallel() {
        assert!(!CheckStrategy::Naive.is_parallel());
        assert!(CheckStrategy::ParallelLocal.is_parallel());
        assert!(CheckStrategy::ParallelReduction.is_parallel());
    }
}
