//! Contract tests verifying the page_allocator API matches the contract specification.
//! These tests ensure all exported types and functions exist with correct signatures.

use page_allocator::{
    entries_per_page, entry_stride, page_source, page_table, resolve_object, size_class, ObjectRef,
    Page, PageSource, PageState, PageTable, SlabAllocator, Utilization, PAGE_MASK, PAGE_SHIFT,
    PAGE_SIZE,
};

/// Test page geometry constants: PAGE_SIZE = 1 << PAGE_SHIFT
#[test]
fn contract_page_constants() {
    let size: usize = PAGE_SIZE;
    let shift: usize = PAGE_SHIFT;
    let mask: usize = PAGE_MASK;
    assert_eq!(size, 1usize << shift);
    assert_eq!(mask, !(size - 1));
}

/// Test PageSource contract: acquire_page() -> *mut u8, release_page(*mut u8)
#[test]
fn contract_page_source_acquire_release() {
    let source = PageSource::new();
    let base: *mut u8 = source.acquire_page();
    assert!(!base.is_null());
    assert_eq!(base as usize % PAGE_SIZE, 0);
    // SAFETY: base came from acquire_page and is no longer used.
    unsafe { source.release_page(base) };
    let pooled: usize = source.pooled_pages();
    assert_eq!(pooled, 1);
}

/// Test page_source contract: process-wide instance accessor
#[test]
fn contract_page_source_global() {
    let source: &'static PageSource = page_source();
    let _ = source;
}

/// Test PageTable contract: insert/query/remove over addresses
#[test]
fn contract_page_table_membership() {
    let table = PageTable::new();
    let addr = 0x7000_0000_0000usize;
    table.insert(addr);
    let hit: bool = table.query(addr + 24);
    assert!(hit);
    table.remove(addr);
    assert!(!table.query(addr + 24));
}

/// Test PageTable contract: envelope() -> (usize, usize)
#[test]
fn contract_page_table_envelope() {
    let table = PageTable::new();
    table.insert(0x5000_0000_0000);
    let (lo, hi): (usize, usize) = table.envelope();
    assert!(lo < hi);
    let inside: bool = table.in_envelope(lo);
    assert!(inside);
}

/// Test page_table contract: process-wide instance accessor
#[test]
fn contract_page_table_global() {
    let table: &'static PageTable = page_table();
    let _ = table;
}

/// Test stride contract: entry_stride rounds header + guards + data to words
#[test]
fn contract_entry_stride() {
    let stride: u32 = entry_stride(8);
    assert_eq!(stride % 8, 0);
    let per_page: u32 = entries_per_page(8);
    assert!(per_page > 0);
}

/// Test SlabAllocator contract: allocate(type_id, source, table) -> usize
#[test]
fn contract_slab_allocate() {
    let source = PageSource::new();
    let table = PageTable::new();
    let mut slab = SlabAllocator::new(16, true);
    let addr: usize = slab.allocate(7, &source, &table);
    assert!(addr % 8 == 0);
    assert!(table.query(addr));
    slab.release_all(&source, &table);
}

/// Test SlabAllocator contract: evacuation_slot(source, table) -> (Page, u32)
#[test]
fn contract_slab_evacuation_slot() {
    let source = PageSource::new();
    let table = PageTable::new();
    let mut slab = SlabAllocator::new(8, false);
    let (page, index): (Page, u32) = slab.evacuation_slot(&source, &table);
    assert_eq!(page.state(), PageState::Evacuation);
    let _ = index;
    slab.release_all(&source, &table);
}

/// Test SlabAllocator contract: page accounting accessors
#[test]
fn contract_slab_accounting() {
    let source = PageSource::new();
    let table = PageTable::new();
    let mut slab = SlabAllocator::new(8, false);
    slab.allocate(1, &source, &table);
    let acquired: u64 = slab.pages_acquired();
    let released: u64 = slab.pages_released();
    let live: usize = slab.live_bytes();
    assert_eq!(acquired, 1);
    assert_eq!(released, 0);
    assert_eq!(live, 8);
    slab.release_all(&source, &table);
}

/// Test Page contract: per-page metadata accessors
#[test]
fn contract_page_metadata() {
    let source = PageSource::new();
    let table = PageTable::new();
    let mut slab = SlabAllocator::new(8, true);
    slab.allocate(1, &source, &table);
    let page = slab.active_page().unwrap();

    let entry_size: u32 = page.entry_size();
    let stride: u32 = page.stride();
    let count: u32 = page.entry_count();
    let free: u32 = page.free_count();
    let guards: bool = page.guards_enabled();
    let state: PageState = page.state();
    let fill: Utilization = page.utilization();
    assert_eq!(entry_size, 8);
    assert!(stride >= entry_size);
    assert_eq!(free, count - 1);
    assert!(guards);
    assert_eq!(state, PageState::Active);
    assert_eq!(fill, Utilization::Sparse);
    slab.release_all(&source, &table);
}

/// Test resolve_object contract: addr -> Option<ObjectRef> with exact data starts
#[test]
fn contract_resolve_object() {
    let source = PageSource::new();
    let table = PageTable::new();
    let mut slab = SlabAllocator::new(8, false);
    let addr = slab.allocate(1, &source, &table);

    // SAFETY: addr lies on a resident formatted page.
    let hit: Option<ObjectRef> = unsafe { resolve_object(addr) };
    let obj = hit.unwrap();
    assert_eq!(obj.addr(), addr);
    assert!(obj.header().is_allocated());
    // Interior addresses do not resolve.
    // SAFETY: as above.
    unsafe { assert!(resolve_object(addr + 8).is_none()) };
    slab.release_all(&source, &table);
}

/// Test size_class contract: data size -> slab entry size
#[test]
fn contract_size_class() {
    let class: u32 = size_class(12);
    assert_eq!(class, 16);
}

/// Test Page contract: verify() completes on a healthy page
#[test]
fn contract_page_verify() {
    let source = PageSource::new();
    let table = PageTable::new();
    let mut slab = SlabAllocator::new(8, true);
    slab.allocate(1, &source, &table);
    slab.active_page().unwrap().verify();
    slab.release_all(&source, &table);
}
