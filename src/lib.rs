//! Symmetry detection and transposition of square dense matrices, with the
//! cache-blocked, recursive and parallel strategies needed to benchmark them
//! against each other.
//!
//! The core is four layers:
//!
//! - [`matrix`]: ownership of square matrices stored as an index of
//!   independently allocated (optionally aligned) rows.
//! - [`symmetry`]: checkers answering "is `M == Mᵗ`?".
//! - [`transpose`]: transposers writing `T = Mᵗ` into a destination buffer.
//! - [`engine`]: runs the checker of a [`Mode`] and, only when the matrix is
//!   not symmetric, the matching transposer.
//!
//! [`tiling`] derives the block size shared by every blocked, recursive and
//! parallel strategy. [`harness`] is the measurement plumbing used by the
//! `symtrans` binary and is not needed to use the core.
//!
//! ```
//! use symtrans::{allocate_for_mode, compute_block_size, ExecutionEngine, Mode};
//!
//! let n = 64;
//! let mode = Mode::Blocked;
//! let block = compute_block_size::<f32>(n, 1).unwrap();
//!
//! let mut source = allocate_for_mode::<f32>(mode, n).unwrap();
//! source.fill_with(|i, j| (i * n + j) as f32);
//! let destination = allocate_for_mode::<f32>(mode, n).unwrap();
//!
//! let mut engine = ExecutionEngine::new(mode, 1).unwrap();
//! let outcome = engine.run(&source, destination, block).unwrap();
//!
//! let transposed = outcome.transposed().unwrap();
//! assert_eq!(transposed.get(3, 5), source.get(5, 3));
//! ```

pub mod engine;
pub mod error;
pub mod harness;
pub mod matrix;
pub mod symmetry;
pub mod tiling;
pub mod transpose;
pub mod utils;

pub use engine::{run_symmetry_check_and_transpose, ExecutionEngine, ExecutionOutcome, Mode};
pub use error::{Result, SymtransError};
pub use matrix::{allocate, allocate_aligned, allocate_for_mode, release, Element, SquareMatrix};
pub use tiling::{compute_block_size, TilingPolicy};

/// Width of the unrolled inner copy loop, in elements. Also the smallest
/// block size and the row alignment (in elements) of aligned matrices.
pub const MIN_TILE: usize = 8;

/// Smallest accepted matrix side.
pub const MIN_DIMENSION: usize = 1 << 4;

/// Largest accepted matrix side.
pub const MAX_DIMENSION: usize = 1 << 12;

/// Level 1 data cache capacity in bytes, detected by the build script.
pub const L1D_CACHE_BYTES: usize = parse_usize(env!("SYMTRANS_L1D_CACHE_BYTES"));

/// Absolute tolerance under which `M[i][j]` and `M[j][i]` count as equal.
pub const SYMMETRY_TOLERANCE: f64 = 1e-6;

const fn parse_usize(raw: &str) -> usize {
    let bytes = raw.as_bytes();
    let mut value = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        assert!(digit.is_ascii_digit(), "cache size must be decimal");
        value = value * 10 + (digit - b'0') as usize;
        i += 1;
    }
    value
}
