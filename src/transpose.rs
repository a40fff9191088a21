//! Transposers.
//!
//! Each transposer writes the full transpose `T[j][i] = M[i][j]` into a
//! caller-provided destination of the same dimension, and each mirrors the
//! traversal of one checker in [`symmetry`](crate::symmetry). They never
//! exploit symmetry: every destination cell is written exactly once, so all of
//! them produce bit-identical output for the same input.
//!
//! The blocked and recursive variants copy one column segment of `M` into one
//! row segment of `T` per step, unrolled by [`MIN_TILE`]:
//!
//! ```text
//! T[k][l .. l+W] = M[l .. l+W][k]        W = MIN_TILE
//! ```

use rayon::prelude::*;

use crate::matrix::{Element, SquareMatrix};
use crate::tiling::Region;
use crate::utils::{prefetch_read, prefetch_write};
use crate::MIN_TILE;

// `gather_column` unrolls by hand.
const _: () = assert!(MIN_TILE == 8);

/// Transposer strategy, one per family of [`Mode`](crate::Mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransposeStrategy {
    Naive,
    Blocked,
    Recursive,
    ParallelWorkSharing,
    ParallelBlockBased,
}

impl TransposeStrategy {
    pub const ALL: [TransposeStrategy; 5] = [
        TransposeStrategy::Naive,
        TransposeStrategy::Blocked,
        TransposeStrategy::Recursive,
        TransposeStrategy::ParallelWorkSharing,
        TransposeStrategy::ParallelBlockBased,
    ];

    /// Writes `mᵗ` into `t` with this strategy. `block` is ignored by the
    /// strategies that do not tile.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions differ, or if a tiling strategy is given
    /// `block == 0`.
    pub fn transpose<T: Element>(self, m: &SquareMatrix<T>, t: &mut SquareMatrix<T>, block: usize) {
        match self {
            TransposeStrategy::Naive => transpose(m, t),
            TransposeStrategy::Blocked => transpose_blocked(m, t, block),
            TransposeStrategy::Recursive => {
                transpose_recursive(m, t, Region::full(m.dim()), block)
            }
            TransposeStrategy::ParallelWorkSharing => par_transpose_work_sharing(m, t),
            TransposeStrategy::ParallelBlockBased => par_transpose_block_based(m, t, block),
        }
    }

    pub fn is_parallel(self) -> bool {
        matches!(
            self,
            TransposeStrategy::ParallelWorkSharing | TransposeStrategy::ParallelBlockBased
        )
    }
}

#[inline(always)]
fn assert_same_dim<T: Element>(m: &SquareMatrix<T>, t: &SquareMatrix<T>) {
    assert_eq!(
        m.dim(),
        t.dim(),
        "source and destination dimensions differ"
    );
}

/// Copies `M[row_start .. row_start + dst.len()][col]` into `dst`.
#[inline(always)]
fn gather_column<T: Element>(m: &SquareMatrix<T>, col: usize, row_start: usize, dst: &mut [T]) {
    let mut l = row_start;
    let mut chunks = dst.chunks_exact_mut(MIN_TILE);
    for c in &mut chunks {
        c[0] = m.get(l, col);
        c[1] = m.get(l + 1, col);
        c[2] = m.get(l + 2, col);
        c[3] = m.get(l + 3, col);
        c[4] = m.get(l + 4, col);
        c[5] = m.get(l + 5, col);
        c[6] = m.get(l + 6, col);
        c[7] = m.get(l + 7, col);
        l += MIN_TILE;
    }
    for (u, x) in chunks.into_remainder().iter_mut().enumerate() {
        *x = m.get(l + u, col);
    }
}

/// Plain double loop over every `(i, j)`.
///
/// # Panics
///
/// Panics if `m` and `t` differ in dimension.
pub fn transpose<T: Element>(m: &SquareMatrix<T>, t: &mut SquareMatrix<T>) {
    assert_same_dim(m, t);
    let n = m.dim();
    for i in 0..n {
        let row = m.row(i);
        for (j, &x) in row.iter().enumerate() {
            t.set(j, i, x);
        }
    }
}

/// Tile-by-tile transpose over the whole matrix.
///
/// Tiles at the right and bottom edges are clipped when `block` does not
/// divide `n`.
///
/// # Panics
///
/// Panics if the dimensions differ or `block == 0`.
pub fn transpose_blocked<T: Element>(m: &SquareMatrix<T>, t: &mut SquareMatrix<T>, block: usize) {
    assert_same_dim(m, t);
    assert!(block > 0, "block size must be positive");
    let n = m.dim();

    for i in (0..n).step_by(block) {
        let k_end = (i + block).min(n);
        for j in (0..n).step_by(block) {
            let l_end = (j + block).min(n);
            for k in i..k_end {
                gather_column(m, k, j, &mut t.row_mut(k)[j..l_end]);
            }
        }
    }
}

/// Divide-and-conquer transpose of `region`.
///
/// Destination rows are the source columns of the region: the call writes
/// `T[col_start..col_end][row_start..row_end]`. Unlike the checker, all four
/// quadrants are visited.
///
/// # Panics
///
/// Panics if the dimensions differ or `block == 0`.
pub fn transpose_recursive<T: Element>(
    m: &SquareMatrix<T>,
    t: &mut SquareMatrix<T>,
    region: Region,
    block: usize,
) {
    assert_same_dim(m, t);
    assert!(block > 0, "block size must be positive");
    recurse_transpose(m, t, region, block);
}

fn recurse_transpose<T: Element>(
    m: &SquareMatrix<T>,
    t: &mut SquareMatrix<T>,
    region: Region,
    block: usize,
) {
    if region.rows() == 0 || region.cols() == 0 {
        return;
    }
    if region.fits(block) {
        for k in region.col_start..region.col_end {
            let dst = &mut t.row_mut(k)[region.row_start..region.row_end];
            gather_column(m, k, region.row_start, dst);
        }
        return;
    }

    let q = region.split();
    recurse_transpose(m, t, q.top_left, block);
    recurse_transpose(m, t, q.top_right, block);
    recurse_transpose(m, t, q.bottom_left, block);
    recurse_transpose(m, t, q.bottom_right, block);
}

/// Parallel transpose over every `(j, i)` pair with no blocking.
///
/// Destination rows are distributed across workers, and the cells of each row
/// again, so the two loops behave like one collapsed loop. Each cell is owned
/// by exactly one task.
///
/// # Panics
///
/// Panics if `m` and `t` differ in dimension.
pub fn par_transpose_work_sharing<T: Element>(m: &SquareMatrix<T>, t: &mut SquareMatrix<T>) {
    assert_same_dim(m, t);

    t.rows_mut()
        .par_iter_mut()
        .enumerate()
        .with_min_len(MIN_TILE)
        .for_each(|(j, row)| {
            row[..]
                .par_iter_mut()
                .enumerate()
                .with_min_len(MIN_TILE)
                .for_each(|(i, x)| *x = m.get(i, j));
        });
}

/// Parallel transpose over block-aligned tile origins.
///
/// The destination is cut into bands of `block` rows, and every band into
/// `block`-wide column tiles; each tile is a disjoint set of row segments
/// owned by one task. The innermost copy prefetches the next source element
/// of the column being read and the next destination element of the row being
/// written.
///
/// # Panics
///
/// Panics if the dimensions differ or `block == 0`.
pub fn par_transpose_block_based<T: Element>(
    m: &SquareMatrix<T>,
    t: &mut SquareMatrix<T>,
    block: usize,
) {
    assert_same_dim(m, t);
    assert!(block > 0, "block size must be positive");
    let n = m.dim();
    let tiles_per_band = n.div_ceil(block);

    t.rows_mut()
        .par_chunks_mut(block)
        .enumerate()
        .for_each(|(band, rows)| {
            let k0 = band * block;

            let mut tiles: Vec<Vec<&mut [T]>> = Vec::with_capacity(tiles_per_band);
            tiles.resize_with(tiles_per_band, || Vec::with_capacity(rows.len()));
            for row in rows.iter_mut() {
                for (tile, segment) in tiles.iter_mut().zip(row.chunks_mut(block)) {
                    tile.push(segment);
                }
            }

            tiles
                .into_par_iter()
                .enumerate()
                .for_each(|(tile, segments)| {
                    let l0 = tile * block;
                    for (dk, segment) in segments.into_iter().enumerate() {
                        copy_with_prefetch(m, k0 + dk, l0, segment);
                    }
                });
        });
}

/// `dst[u] = M[l0 + u][k]`, prefetching one access ahead on both sides.
#[inline(always)]
fn copy_with_prefetch<T: Element>(m: &SquareMatrix<T>, k: usize, l0: usize, dst: &mut [T]) {
    let rows = m.rows();
    let dst_ptr = dst.as_mut_ptr();
    for u in 0..dst.len() {
        let l = l0 + u;
        if let Some(next) = rows.get(l + 1) {
            prefetch_read(next.as_ptr().wrapping_add(k));
        }
        prefetch_write(dst_ptr.wrapping_add(u + 1));
        dst[u] = rows[l][k];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{allocate, allocate_aligned};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(n: usize, seed: u64) -> SquareMatrix<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut m = allocate_aligned::<f32>(n, MIN_TILE).unwrap();
        m.fill_with(|_, _| rng.random_range(-100.0..100.0));
        m
    }

    fn assert_is_transpose(m: &SquareMatrix<f32>, t: &SquareMatrix<f32>) {
        let n = m.dim();
        for i in 0..n {
            for j in 0..n {
                assert_eq!(t.get(j, i), m.get(i, j), "at ({i},{j})");
            }
        }
    }

    #[test]
    fn test_every_strategy_transposes() {
        for n in [16, 32, 64, 128] {
            let m = random_matrix(n, 42 + n as u64);
            for block in [8, 16, n / 2] {
                for strategy in TransposeStrategy::ALL {
                    let mut t = allocate_aligned::<f32>(n, MIN_TILE).unwrap();
                    strategy.transpose(&m, &mut t, block);
                    assert_is_transpose(&m, &t);
                }
            }
        }
    }

    #[test]
    fn test_strategies_agree_bitwise() {
        let n = 64;
        let m = random_matrix(n, 7);
        let mut reference = allocate::<f32>(n).unwrap();
        transpose(&m, &mut reference);

        for strategy in TransposeStrategy::ALL {
            let mut t = allocate_aligned::<f32>(n, MIN_TILE).unwrap();
            strategy.transpose(&m, &mut t, 16);
            assert_eq!(t, reference, "{strategy:?}");
        }
    }

    #[test]
    fn test_double_transpose_is_identity() {
        let m = random_matrix(32, 3);
        let mut t = allocate::<f32>(32).unwrap();
        let mut back = allocate::<f32>(32).unwrap();
        transpose(&m, &mut t);
        transpose(&t, &mut back);
        assert_eq!(back, m);
    }

    #[test]
    fn test_block_not_dividing_dimension() {
        let n = 64;
        let m = random_matrix(n, 11);
        for strategy in [
            TransposeStrategy::Blocked,
            TransposeStrategy::Recursive,
            TransposeStrategy::ParallelBlockBased,
        ] {
            let mut t = allocate::<f32>(n).unwrap();
            strategy.transpose(&m, &mut t, 24);
            assert_is_transpose(&m, &t);
        }
    }

    #[test]
    fn test_gather_column_with_remainder() {
        let mut m = allocate::<f64>(16).unwrap();
        m.fill_with(|i, j| (i * 100 + j) as f64);
        let mut dst = [0.0; 11];
        gather_column(&m, 3, 2, &mut dst);
        let expected: Vec<f64> = (2..13).map(|i| (i * 100 + 3) as f64).collect();
        assert_eq!(&dst[..], &expected[..]);
    }

    #[test]
    fn test_recursive_sub_region_only_touches_its_cells() {
        let m = random_matrix(32, 5);
        let mut t = allocate::<f32>(32).unwrap();
        t.fill(-1.0);
        let bottom_left = Region::full(32).split().bottom_left;
        transpose_recursive(&m, &mut t, bottom_left, 8);

        for r in 0..32 {
            for c in 0..32 {
                // bottom-left of M lands in top-right of T
                if r < 16 && c >= 16 {
                    assert_eq!(t.get(r, c), m.get(c, r));
                } else {
                    assert_eq!(t.get(r, c), -1.0);
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "source and destination dimensions differ")]
    fn test_dimension_mismatch_panics() {
        let m = allocate::<f32>(16).unwrap();
        let mut t = allocate::<f32>(32).unwrap();
        transpose(&m, &mut t);
    }

    #[test]
    fn test_is_parallel() {
        assert!(!TransposeStrategy::Recursive.is_parallel());
        assert!(TransposeStrategy::ParallelWorkSharing.is_parallel());
        assert!(TransposeStrategy::ParallelBlockBased.is_parallel());
    }
}
