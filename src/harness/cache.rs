use std::hint::black_box;

use crate::error::Result;
use crate::utils::AlignedRow;
use crate::L1D_CACHE_BYTES;

const KB: usize = 1024;

/// Cache line size the scratch buffers are aligned to.
pub const CACHE_LINE_BYTES: usize = 64;

/// Capacities, in bytes, of the caches evicted by [`clear_all_caches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSizes {
    pub l1d: usize,
    pub l1i: usize,
    pub l2: usize,
    pub l3: usize,
}

impl Default for CacheSizes {
    fn default() -> Self {
        Self {
            l1d: L1D_CACHE_BYTES,
            l1i: 32 * KB,
            l2: 1024 * KB,
            l3: 36608 * KB,
        }
    }
}

impl CacheSizes {
    pub fn total(&self) -> usize {
        self.l1d + self.l1i + self.l2 + self.l3
    }
}

/// Best-effort eviction of the cache hierarchy before a sample.
///
/// Allocates one cache-line-aligned `f32` scratch buffer per level, writes
/// 1.0 into every slot and frees them again. Nothing guarantees the old lines
/// are gone; it only makes samples start from a similar state.
///
/// # Errors
///
/// `AllocationError` if a scratch buffer cannot be allocated.
pub fn clear_all_caches(sizes: &CacheSizes) -> Result<()> {
    for bytes in [sizes.l1d, sizes.l1i, sizes.l2, sizes.l3] {
        let len = bytes / std::mem::size_of::<f32>();
        let mut scratch = AlignedRow::<f32>::zeroed(len, CACHE_LINE_BYTES)?;
        scratch.fill(1.0);
        black_box(&mut scratch[..]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sizes() {
        let sizes = CacheSizes::default();
        assert_eq!(sizes.l1d, L1D_CACHE_BYTES);
        assert_eq!(sizes.l2, 1 << 20);
        assert_eq!(sizes.l3, 36608 * 1024);
    }

    #[test]
    fn test_clear_small_caches() {
        let sizes = CacheSizes {
            l1d: 4 * KB,
            l1i: 4 * KB,
            l2: 16 * KB,
            l3: 64 * KB,
        };
        assert_eq!(sizes.total(), 88 * KB);
        clear_all_caches(&sizes).unwrap();
    }

    #[test]
    fn test_clear_empty_sizes() {
        let sizes = CacheSizes {
            l1d: 0,
            l1i: 0,
            l2: 0,
            l3: 0,
        };
        clear_all_caches(&sizes).unwrap();
    }
}
