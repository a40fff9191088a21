use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::error::{allocation_error, layout_error, Result};

/// A fixed-length, heap-allocated buffer whose first element sits at a chosen
/// byte alignment.
///
/// This is the row type of every matrix: a matrix owns an index of rows and
/// each row owns exactly one `AlignedRow`. The buffer never grows, so the
/// alignment obtained at construction holds for its whole lifetime.
///
/// # Memory Safety
///
/// - Uses `std::alloc::alloc_zeroed()` for allocation and `std::alloc::dealloc()`
///   with the same `Layout` for cleanup
/// - Contents start as all-zero bytes, so `T` must be a type for which the
///   zero bit pattern is a valid value (the crate only instantiates it with
///   `f32` and `f64`)
pub struct AlignedRow<T> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
}

// SAFETY: `AlignedRow` uniquely owns its allocation, exactly like `Vec<T>`.
unsafe impl<T: Send> Send for AlignedRow<T> {}
// SAFETY: shared access only hands out `&[T]`.
unsafe impl<T: Sync> Sync for AlignedRow<T> {}

impl<T: Copy> AlignedRow<T> {
    /// Allocates `len` zero-initialized elements aligned to `align` bytes.
    ///
    /// `align` is raised to `align_of::<T>()` when smaller.
    ///
    /// # Errors
    ///
    /// - [`LayoutError`](crate::SymtransError::LayoutError) if `align` is not a
    ///   power of two or the byte size overflows
    /// - [`AllocationError`](crate::SymtransError::AllocationError) if the
    ///   global allocator returns null
    pub fn zeroed(len: usize, align: usize) -> Result<Self> {
        let align = align.max(mem::align_of::<T>());
        if !align.is_power_of_two() {
            return Err(layout_error(
                len.saturating_mul(mem::size_of::<T>()),
                align,
                "alignment must be power of two",
            ));
        }

        let size = len
            .checked_mul(mem::size_of::<T>())
            .ok_or_else(|| layout_error(usize::MAX, align, "row byte size overflows usize"))?;

        let layout = Layout::from_size_align(size, align)
            .map_err(|e| layout_error(size, align, e.to_string()))?;

        if size == 0 {
            return Ok(AlignedRow {
                ptr: NonNull::dangling(),
                len,
                layout,
            });
        }

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) } as *mut T;

        let ptr = NonNull::new(raw)
            .ok_or_else(|| allocation_error(size, align, "global allocator returned null"))?;

        Ok(AlignedRow { ptr, len, layout })
    }
}

impl<T> AlignedRow<T> {
    /// Byte alignment this row was allocated with.
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Whether the first element's address is a multiple of `align` bytes.
    pub fn is_aligned_to(&self, align: usize) -> bool {
        (self.ptr.as_ptr() as usize) % align == 0
    }
}

impl<T> Drop for AlignedRow<T> {
    fn drop(&mut self) {
        if self.layout.size() > 0 {
            // SAFETY: ptr was produced by `alloc_zeroed` with this exact layout.
            unsafe {
                dealloc(self.ptr.as_ptr() as *mut u8, self.layout);
            }
        }
    }
}

impl<T> Deref for AlignedRow<T> {
    type Target = [T];
    fn deref(&self) -> &Self::Target {
        // SAFETY: ptr is valid for `len` initialized elements (or dangling with len 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for AlignedRow<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as in `deref`, and `&mut self` guarantees uniqueness.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for AlignedRow<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Hints the CPU to pull the cache line holding `ptr` in for reading.
///
/// A hint only: it never faults, even for addresses outside any allocation.
#[inline(always)]
pub fn prefetch_read<T>(ptr: *const T) {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: SSE is part of the x86_64 baseline and prefetch does not dereference.
    unsafe {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T2};
        _mm_prefetch::<_MM_HINT_T2>(ptr as *const i8);
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = ptr;
}

/// Hints the CPU to pull the cache line holding `ptr` in ahead of a write.
#[inline(always)]
pub fn prefetch_write<T>(ptr: *mut T) {
    prefetch_read(ptr as *const T);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SymtransError;

    #[test]
    fn test_zeroed_row_is_zero_and_aligned() {
        let row = AlignedRow::<f32>::zeroed(100, 32).unwrap();
        assert_eq!(row.len(), 100);
        assert!(row.iter().all(|&x| x == 0.0));
        assert!(row.is_aligned_to(32));
        assert_eq!(row.alignment(), 32);
    }

    #[test]
    fn test_alignment_raised_to_type_alignment() {
        let row = AlignedRow::<f64>::zeroed(4, 1).unwrap();
        assert_eq!(row.alignment(), mem::align_of::<f64>());
    }

    #[test]
    fn test_non_power_of_two_alignment_rejected() {
        let err = AlignedRow::<f32>::zeroed(16, 24).unwrap_err();
        assert!(matches!(err, SymtransError::LayoutError { alignment: 24, .. }));
    }

    #[test]
    fn test_overflowing_size_rejected() {
        let err = AlignedRow::<f64>::zeroed(usize::MAX, 64).unwrap_err();
        assert!(matches!(err, SymtransError::LayoutError { .. }));
    }

    #[test]
    fn test_empty_row() {
        let row = AlignedRow::<f32>::zeroed(0, 64).unwrap();
        assert!(row.is_empty());
    }

    #[test]
    fn test_row_is_writable() {
        let mut row = AlignedRow::<f64>::zeroed(8, 64).unwrap();
        row[3] = 2.5;
        row.iter_mut().skip(5).for_each(|x| *x = 1.0);
        assert_eq!(&row[..], &[0.0, 0.0, 0.0, 2.5, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_prefetch_is_harmless() {
        let mut row = AlignedRow::<f32>::zeroed(16, 64).unwrap();
        prefetch_read(row.as_ptr().wrapping_add(1000));
        prefetch_write(row.as_mut_ptr());
        assert_eq!(row[0], 0.0);
    }
}
