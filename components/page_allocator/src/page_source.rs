//! Fixed-size page acquisition and recycling.
//!
//! All managed memory arrives here as 64 KiB pages aligned to their own
//! size, so any interior address recovers its page with a single mask.
//! Released pages are zero-filled and pooled rather than unmapped; a
//! reused page therefore never leaks stale pointer bit patterns into a
//! conservative scan.

use parking_lot::Mutex;
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::sync::OnceLock;

/// Size of every page in bytes.
pub const PAGE_SIZE: usize = 1 << 16;
/// Shift corresponding to [`PAGE_SIZE`].
pub const PAGE_SHIFT: usize = 16;
/// Mask recovering a page base from any interior address.
pub const PAGE_MASK: usize = !(PAGE_SIZE - 1);

// SAFETY: PAGE_SIZE is a non-zero power of two well below isize::MAX.
const PAGE_LAYOUT: Layout = unsafe { Layout::from_size_align_unchecked(PAGE_SIZE, PAGE_SIZE) };

/// Supplier of zero-initialized, page-aligned blocks.
///
/// One process-wide instance backs the runtime (see [`page_source`]);
/// tests may build private instances for isolated page accounting. The
/// pool is guarded by a single lock, the only lock on the allocation
/// path shared between threads.
pub struct PageSource {
    pool: Mutex<Vec<usize>>,
}

impl PageSource {
    /// Creates a source with an empty recycle pool.
    pub const fn new() -> PageSource {
        PageSource {
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Returns a zero-initialized page aligned to [`PAGE_SIZE`].
    ///
    /// Reuses a pooled page when one is available, otherwise maps a fresh
    /// one. Aborts the process if the OS cannot satisfy the mapping;
    /// address-space exhaustion has no recovery path.
    pub fn acquire_page(&self) -> *mut u8 {
        if let Some(base) = self.pool.lock().pop() {
            // Pooled pages were zero-filled on release.
            return base as *mut u8;
        }
        // SAFETY: PAGE_LAYOUT has non-zero size.
        let ptr = unsafe { alloc_zeroed(PAGE_LAYOUT) };
        if ptr.is_null() {
            handle_alloc_error(PAGE_LAYOUT);
        }
        ptr
    }

    /// Returns a page to the recycle pool, zero-filling it first.
    ///
    /// # Safety
    ///
    /// `page` must have come from [`acquire_page`](Self::acquire_page) on
    /// this source and must no longer be referenced by any page list or
    /// membership index.
    pub unsafe fn release_page(&self, page: *mut u8) {
        std::ptr::write_bytes(page, 0, PAGE_SIZE);
        self.pool.lock().push(page as usize);
    }

    /// Number of pages currently waiting in the recycle pool.
    pub fn pooled_pages(&self) -> usize {
        self.pool.lock().len()
    }
}

impl Default for PageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PageSource {
    fn drop(&mut self) {
        let pool = std::mem::take(&mut *self.pool.lock());
        for base in pool {
            // SAFETY: pooled pages were mapped by acquire_page with
            // PAGE_LAYOUT and are referenced by nothing else.
            unsafe { dealloc(base as *mut u8, PAGE_LAYOUT) };
        }
    }
}

static PAGE_SOURCE: OnceLock<PageSource> = OnceLock::new();

/// Process-wide page source.
pub fn page_source() -> &'static PageSource {
    PAGE_SOURCE.get_or_init(PageSource::new)
}
