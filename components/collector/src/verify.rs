//! Whole-heap integrity verification.

use std::collections::BTreeMap;

use page_allocator::{PageTable, SlabAllocator};

/// Verifies every resident page of every size class, panicking on the
/// first violation found.
///
/// On top of the per-page checks this confirms each resident page is
/// present in the membership index, since a missing bit would make the
/// page invisible to root filtering and decrement validation.
pub fn verify_slabs(slabs: &BTreeMap<u32, SlabAllocator>, table: &PageTable) {
    for slab in slabs.values() {
        for page in slab.all_pages() {
            let base = page.base() as usize;
            if !table.query(base) {
                panic!(
                    "heap corruption: resident page {:#x} missing from the membership index",
                    base
                );
            }
            page.verify();
        }
    }
}
