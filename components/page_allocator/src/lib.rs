//! Page Allocator - Page source, membership index, and slab allocation
//!
//! This component provides:
//! - Page-granular acquisition and recycling of heap memory
//! - A radix membership table answering "is this address on a heap page"
//! - Fixed-stride slab pages with intrusive free lists
//! - Canary guards and page-level integrity verification
//! - Per-size-class allocators with allocation and evacuation pages

pub mod page;
pub mod page_source;
pub mod page_table;
pub mod slab;

// Re-export main types
pub use page::{
    entries_per_page, entry_stride, resolve_object, ObjectRef, Page, PageState, Utilization,
    FIRST_ENTRY_OFFSET, FREE_LIST_END,
};
pub use page_source::{page_source, PageSource, PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};
pub use page_table::{page_table, PageTable, TABLE_ADDRESS_BITS};
pub use slab::{size_class, SlabAllocator};
