//! Square matrix storage.
//!
//! A [`SquareMatrix`] is a two-tier structure: an index of `n` row handles,
//! each row an [`AlignedRow`] of exactly `n` elements allocated on its own.
//! Rows are deliberately *not* one contiguous slab: every row starts at an
//! address that satisfies the matrix's row alignment, which is what the
//! blocked, recursive and parallel strategies read at tile granularity.
//!
//! Two allocation variants exist with identical logical contents:
//!
//! | Variant   | Row alignment                     | Used by                         |
//! |-----------|-----------------------------------|---------------------------------|
//! | Standard  | natural alignment of `T`          | [`Mode::Sequential`]            |
//! | Aligned   | `align_elems * size_of::<T>()`    | every other [`Mode`]            |

use std::fmt;
use std::mem;

use num::{Float, NumCast};

use crate::engine::Mode;
use crate::error::{allocation_error, configuration_error, Result};
use crate::utils::AlignedRow;
use crate::{MIN_TILE, SYMMETRY_TOLERANCE};

mod private {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Floating-point element type of a matrix: `f32` or `f64`.
///
/// The all-zero bit pattern must be a valid value, which is why the trait is
/// sealed to the two IEEE float types.
pub trait Element: Float + Default + fmt::Debug + Send + Sync + 'static + private::Sealed {
    /// Absolute tolerance used by every symmetry checker.
    fn tolerance() -> Self {
        <Self as NumCast>::from(SYMMETRY_TOLERANCE).unwrap_or_else(Self::epsilon)
    }

    /// Lossy conversion from `f64`, used by the test-data generators.
    fn from_f64(value: f64) -> Self {
        <Self as NumCast>::from(value).unwrap_or_else(Self::nan)
    }

    /// Whether `a` and `b` are close enough to count as a symmetric pair.
    ///
    /// NaN never matches anything.
    #[inline(always)]
    fn matches(a: Self, b: Self) -> bool {
        (a - b).abs() <= Self::tolerance()
    }
}

impl Element for f32 {}
impl Element for f64 {}

/// Physical row layout of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// Rows carry only the natural alignment of the element type.
    Standard,
    /// Every row starts at a multiple of `align_elems` elements.
    Aligned {
        /// Alignment in elements.
        align_elems: usize,
    },
}

/// A square `n × n` matrix owned as an index of independently allocated rows.
pub struct SquareMatrix<T> {
    rows: Vec<AlignedRow<T>>,
    n: usize,
    layout: RowLayout,
}

impl<T: Element> SquareMatrix<T> {
    fn with_row_alignment(n: usize, layout: RowLayout) -> Result<Self> {
        if n == 0 {
            return Err(configuration_error("matrix dimension must be positive"));
        }

        let align_bytes = match layout {
            RowLayout::Standard => mem::align_of::<T>(),
            RowLayout::Aligned { align_elems } => {
                if align_elems == 0 {
                    return Err(configuration_error("row alignment must be positive"));
                }
                align_elems.saturating_mul(mem::size_of::<T>())
            }
        };

        let mut rows = Vec::new();
        rows.try_reserve_exact(n).map_err(|_| {
            allocation_error(
                n.saturating_mul(mem::size_of::<AlignedRow<T>>()),
                mem::align_of::<AlignedRow<T>>(),
                "cannot allocate the row index",
            )
        })?;

        // On failure `rows` is dropped here, releasing every row built so far.
        for _ in 0..n {
            rows.push(AlignedRow::zeroed(n, align_bytes)?);
        }

        Ok(SquareMatrix { rows, n, layout })
    }

    /// Side length. Zero once the matrix has been released.
    #[inline(always)]
    pub fn dim(&self) -> usize {
        self.n
    }

    /// True after [`release`](Self::release).
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn layout(&self) -> RowLayout {
        self.layout
    }

    #[inline(always)]
    pub fn row(&self, i: usize) -> &[T] {
        &self.rows[i]
    }

    #[inline(always)]
    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.rows[i]
    }

    /// The row index, for splitting rows across workers.
    pub fn rows(&self) -> &[AlignedRow<T>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [AlignedRow<T>] {
        &mut self.rows
    }

    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> T {
        self.rows[i][j]
    }

    #[inline(always)]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        self.rows[i][j] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.rows.iter_mut().for_each(|row| row.fill(value));
    }

    /// Sets every `M[i][j]` to `f(i, j)`, row by row.
    pub fn fill_with<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, usize) -> T,
    {
        for (i, row) in self.rows.iter_mut().enumerate() {
            for (j, x) in row.iter_mut().enumerate() {
                *x = f(i, j);
            }
        }
    }

    /// Whether every row starts at a multiple of `align_bytes`.
    pub fn rows_aligned_to(&self, align_bytes: usize) -> bool {
        self.rows.iter().all(|row| row.is_aligned_to(align_bytes))
    }

    /// Frees every row, then the row index.
    ///
    /// Calling it again on a released matrix does nothing.
    pub fn release(&mut self) {
        drop(mem::take(&mut self.rows));
        self.n = 0;
    }
}

impl<T: Element> PartialEq for SquareMatrix<T> {
    /// Element-wise equality; the row layout is not compared.
    fn eq(&self, other: &Self) -> bool {
        self.n == other.n
            && self
                .rows
                .iter()
                .zip(other.rows.iter())
                .all(|(a, b)| a[..] == b[..])
    }
}

impl<T: Element> fmt::Debug for SquareMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SquareMatrix")
            .field("n", &self.n)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// Allocates a zero-filled `n × n` matrix with the standard layout.
///
/// # Errors
///
/// - `ConfigurationError` if `n == 0`, before anything is allocated
/// - `AllocationError` if the row index or any row cannot be allocated; rows
///   already allocated are released first
pub fn allocate<T: Element>(n: usize) -> Result<SquareMatrix<T>> {
    SquareMatrix::with_row_alignment(n, RowLayout::Standard)
}

/// Allocates a zero-filled `n × n` matrix whose rows are aligned to
/// `align_elems * size_of::<T>()` bytes.
///
/// The alignment is independent of the block size later used by the
/// algorithms; [`allocate_for_mode`] fixes it to [`MIN_TILE`].
///
/// # Errors
///
/// As [`allocate`], plus `ConfigurationError` when `align_elems == 0` and
/// `LayoutError` when the byte alignment is not a power of two.
pub fn allocate_aligned<T: Element>(n: usize, align_elems: usize) -> Result<SquareMatrix<T>> {
    SquareMatrix::with_row_alignment(n, RowLayout::Aligned { align_elems })
}

/// Allocates with the layout a mode expects: standard for
/// [`Mode::Sequential`], aligned to [`MIN_TILE`] elements otherwise.
pub fn allocate_for_mode<T: Element>(mode: Mode, n: usize) -> Result<SquareMatrix<T>> {
    if mode.needs_aligned_rows() {
        allocate_aligned(n, MIN_TILE)
    } else {
        allocate(n)
    }
}

/// Releases `matrix`; a no-op if it was already released.
pub fn release<T: Element>(matrix: &mut SquareMatrix<T>) {
    matrix.release();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SymtransError;

    #[test]
    fn test_allocate_shape() {
        let m = allocate::<f32>(16).unwrap();
        assert_eq!(m.dim(), 16);
        assert_eq!(m.rows().len(), 16);
        assert!(m.rows().iter().all(|row| row.len() == 16));
        assert_eq!(m.layout(), RowLayout::Standard);
    }

    #[test]
    fn test_allocate_zero_is_configuration_error() {
        let err = allocate::<f64>(0).unwrap_err();
        assert!(matches!(err, SymtransError::ConfigurationError { .. }));
        let err = allocate_aligned::<f64>(0, 8).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_allocate_aligned_rows() {
        let m = allocate_aligned::<f32>(32, MIN_TILE).unwrap();
        assert_eq!(m.layout(), RowLayout::Aligned { align_elems: MIN_TILE });
        assert!(m.rows_aligned_to(MIN_TILE * mem::size_of::<f32>()));

        let m = allocate_aligned::<f64>(32, 16).unwrap();
        assert!(m.rows_aligned_to(16 * mem::size_of::<f64>()));
    }

    #[test]
    fn test_zero_alignment_rejected() {
        let err = allocate_aligned::<f32>(16, 0).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_non_power_of_two_alignment_rejected() {
        let err = allocate_aligned::<f32>(16, 3).unwrap_err();
        assert!(matches!(err, SymtransError::LayoutError { alignment: 12, .. }));
    }

    #[test]
    fn test_allocate_for_mode() {
        let m = allocate_for_mode::<f32>(Mode::Sequential, 16).unwrap();
        assert_eq!(m.layout(), RowLayout::Standard);
        let m = allocate_for_mode::<f32>(Mode::ParallelReductionBlockBased, 16).unwrap();
        assert_eq!(m.layout(), RowLayout::Aligned { align_elems: MIN_TILE });
    }

    #[test]
    fn test_fill_get_set() {
        let mut m = allocate::<f64>(4).unwrap();
        m.fill_with(|i, j| (i * 10 + j) as f64);
        assert_eq!(m.get(2, 3), 23.0);
        m.set(2, 3, -1.0);
        assert_eq!(m.row(2), &[20.0, 21.0, 22.0, -1.0]);
        m.fill(5.0);
        assert!(m.rows().iter().all(|row| row.iter().all(|&x| x == 5.0)));
    }

    #[test]
    fn test_equality_ignores_layout() {
        let mut a = allocate::<f32>(16).unwrap();
        let mut b = allocate_aligned::<f32>(16, MIN_TILE).unwrap();
        a.fill_with(|i, j| (i + 2 * j) as f32);
        b.fill_with(|i, j| (i + 2 * j) as f32);
        assert_eq!(a, b);
        b.set(0, 1, 0.5);
        assert_ne!(a, b);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut m = allocate::<f32>(16).unwrap();
        release(&mut m);
        assert!(m.is_empty());
        assert!(m.rows().is_empty());
        release(&mut m);
        assert_eq!(m.dim(), 0);
    }

    #[test]
    fn test_element_matches() {
        assert!(f32::matches(5.0, 5.0));
        assert!(f32::matches(1.0, 1.0 + 1e-7));
        assert!(!f32::matches(5.0, 3.0));
        assert!(!f64::matches(f64::NAN, f64::NAN));
        assert_eq!(f64::tolerance(), SYMMETRY_TOLERANCE);
    }
}
