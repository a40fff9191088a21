//! Block size ("sublength") selection.
//!
//! Every blocked, recursive and parallel strategy walks the matrix in square
//! tiles of one shared side length. The side is derived once per benchmark
//! run from the matrix side `n`, the worker count and the L1 data cache:
//!
//! ```text
//! max_tile = sqrt(l1d_bytes / (2 * size_of::<T>()))     // source + destination tile
//! raw      = max(min(n / 2, max_tile / threads), min_tile)
//! block    = largest power of two <= raw
//! ```
//!
//! Rounding down to a power of two keeps the block a multiple of the unroll
//! width and a divisor of `n`, so no tile ever straddles the matrix edge.

use std::mem;

use crate::error::{configuration_error, Result};
use crate::matrix::Element;
use crate::{L1D_CACHE_BYTES, MAX_DIMENSION, MIN_DIMENSION, MIN_TILE};

/// Inputs of the block size computation that do not change between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingPolicy {
    /// Smallest block side; the unroll width of the inner copy loop.
    pub min_tile: usize,
    /// L1 data cache capacity in bytes.
    pub l1d_cache_bytes: usize,
}

impl Default for TilingPolicy {
    fn default() -> Self {
        Self {
            min_tile: MIN_TILE,
            l1d_cache_bytes: L1D_CACHE_BYTES,
        }
    }
}

impl TilingPolicy {
    /// Creates a policy, rejecting a zero or non-power-of-two `min_tile` and an
    /// empty cache.
    pub fn new(min_tile: usize, l1d_cache_bytes: usize) -> Result<Self> {
        if min_tile == 0 || !min_tile.is_power_of_two() {
            return Err(configuration_error(format!(
                "minimum tile must be a positive power of two, got {min_tile}"
            )));
        }
        if l1d_cache_bytes == 0 {
            return Err(configuration_error("L1 data cache size must be positive"));
        }
        Ok(Self {
            min_tile,
            l1d_cache_bytes,
        })
    }

    /// Side of the largest pair of `T` tiles that fits in L1 together.
    pub fn max_tile<T: Element>(&self) -> usize {
        let elems = self.l1d_cache_bytes / (2 * mem::size_of::<T>());
        (elems as f64).sqrt() as usize
    }

    /// Computes the block size for an `n × n` matrix of `T` processed by
    /// `threads` workers.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if `n` is not a power of two in
    /// `[MIN_DIMENSION, MAX_DIMENSION]`, if `threads == 0`, or if `n / 2` is
    /// smaller than `min_tile` (the matrix cannot hold two tiles per side).
    pub fn block_size<T: Element>(&self, n: usize, threads: usize) -> Result<usize> {
        validate_dimension(n)?;
        if threads == 0 {
            return Err(configuration_error("thread count must be positive"));
        }
        let half = n / 2;
        if half < self.min_tile {
            return Err(configuration_error(format!(
                "dimension {n} is under the limit: n/2 = {half} is smaller than the minimum tile {}",
                self.min_tile
            )));
        }

        let per_thread = self.max_tile::<T>() / threads;
        let raw = half.min(per_thread).max(self.min_tile);

        Ok(floor_power_of_two(raw))
    }
}

/// Block size under the default policy. See [`TilingPolicy::block_size`].
pub fn compute_block_size<T: Element>(n: usize, threads: usize) -> Result<usize> {
    TilingPolicy::default().block_size::<T>(n, threads)
}

/// Checks that `n` is a power of two within `[MIN_DIMENSION, MAX_DIMENSION]`.
pub fn validate_dimension(n: usize) -> Result<()> {
    if n == 0 || !n.is_power_of_two() {
        return Err(configuration_error(format!(
            "dimension must be a power of two, got {n}"
        )));
    }
    if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&n) {
        return Err(configuration_error(format!(
            "dimension {n} outside [{MIN_DIMENSION}, {MAX_DIMENSION}]"
        )));
    }
    Ok(())
}

/// Turns a command-line exponent into a dimension, `2^exponent`.
pub fn dimension_from_exponent(exponent: u32) -> Result<usize> {
    let n = 1usize
        .checked_shl(exponent)
        .ok_or_else(|| configuration_error(format!("exponent {exponent} is too large")))?;
    validate_dimension(n).map_err(|_| {
        configuration_error(format!(
            "invalid dimension exponent {exponent}: it has to be between {} and {}",
            MIN_DIMENSION.trailing_zeros(),
            MAX_DIMENSION.trailing_zeros()
        ))
    })?;
    Ok(n)
}

/// Immutable descriptor of the rectangular sub-region
/// `[row_start, row_end) × [col_start, col_end)` walked by the recursive
/// strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

/// The four halves-by-halves parts of a [`Region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quadrants {
    pub top_left: Region,
    pub top_right: Region,
    pub bottom_left: Region,
    pub bottom_right: Region,
}

impl Region {
    /// The whole `n × n` matrix.
    pub fn full(n: usize) -> Self {
        Self {
            row_start: 0,
            row_end: n,
            col_start: 0,
            col_end: n,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.row_end - self.row_start
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.col_end - self.col_start
    }

    /// Whether both extents are at most `block`, i.e. the recursion bottoms out.
    #[inline]
    pub fn fits(&self, block: usize) -> bool {
        self.rows() <= block && self.cols() <= block
    }

    /// Whether the region holds any cell strictly below the diagonal
    /// (`col < row`).
    #[inline]
    pub fn reaches_below_diagonal(&self) -> bool {
        self.rows() > 0 && self.cols() > 0 && self.col_start + 1 < self.row_end
    }

    /// Splits both ranges at their midpoint.
    pub fn split(&self) -> Quadrants {
        let mid_r = self.row_start + self.rows() / 2;
        let mid_c = self.col_start + self.cols() / 2;
        let part = |row_start, row_end, col_start, col_end| Region {
            row_start,
            row_end,
            col_start,
            col_end,
        };
        Quadrants {
            top_left: part(self.row_start, mid_r, self.col_start, mid_c),
            top_right: part(self.row_start, mid_r, mid_c, self.col_end),
            bottom_left: part(mid_r, self.row_end, self.col_start, mid_c),
            bottom_right: part(mid_r, self.row_end, mid_c, self.col_end),
        }
    }
}

#[inline]
fn floor_power_of_two(x: usize) -> usize {
    debug_assert!(x > 0);
    1 << (usize::BITS - 1 - x.leading_zeros())
}
