//! Page Recycling Integration Tests
//!
//! Tests that pages emptied by promotion, evacuation, and
//! reference-counted release return to the page pool, and that
//! evacuation pages drain back to full capacity under churn.

use collector::Heap;
use gc_types::{descriptors, HeapConfig, ObjectHeader, SlotKind, TypeDescriptor};
use page_allocator::resolve_object;

fn register_test_types() {
    let table = descriptors();
    let _ = table.register(TypeDescriptor::leaf(1, 8, "leaf8"));
    let _ = table.register(TypeDescriptor::with_slots(
        2,
        &[SlotKind::Pointer, SlotKind::Pointer],
        "pair",
    ));
    let _ = table.register(TypeDescriptor::leaf(3, 16, "leaf16"));
    let _ = table.register(TypeDescriptor::with_slots(
        4,
        &[SlotKind::Pointer, SlotKind::Scalar, SlotKind::Pointer],
        "triple",
    ));
    let _ = table.register(TypeDescriptor::with_slots(5, &[SlotKind::Pointer], "cell"));
}

fn test_heap_with(config: HeapConfig) -> (Heap, &'static mut [usize]) {
    register_test_types();
    let mut heap = Heap::isolated(config);
    let cells = Box::leak(vec![0usize; 4].into_boxed_slice());
    heap.register_globals(cells.as_ptr() as usize, cells.len());
    (heap, cells)
}

fn test_heap() -> (Heap, &'static mut [usize]) {
    test_heap_with(HeapConfig::deterministic())
}

fn header_of(addr: usize) -> ObjectHeader {
    // SAFETY: tests only inspect addresses of resident objects.
    unsafe { resolve_object(addr).unwrap().header() }
}

fn read_slot(addr: usize, slot: usize) -> usize {
    // SAFETY: tests read inside data regions they allocated.
    unsafe { *((addr + slot * 8) as *const usize) }
}

fn write_slot(addr: usize, slot: usize, value: usize) {
    // SAFETY: as above.
    unsafe { *((addr + slot * 8) as *mut usize) = value };
}

/// Test: a rooted pair with two leaf children promotes cleanly and the
/// page that fed the leaves before promotion returns to the page pool.
#[test]
fn test_promoted_pair_children_leave_their_source_page() {
    let (mut heap, cells) = test_heap();

    let pair = heap.allocate(2);
    let left = heap.allocate(1);
    let right = heap.allocate(1);
    write_slot(left, 0, 11);
    write_slot(right, 0, 22);
    write_slot(pair, 0, left);
    write_slot(pair, 1, right);
    cells[0] = pair;

    heap.collect();

    let new_left = read_slot(pair, 0);
    let new_right = read_slot(pair, 1);
    assert_ne!(new_left, 0, "left slot must stay populated");
    assert_ne!(new_right, 0, "right slot must stay populated");
    assert!(!header_of(new_left).is_young(), "left child left the nursery");
    assert!(
        !header_of(new_right).is_young(),
        "right child left the nursery"
    );
    assert_eq!(read_slot(new_left, 0), 11);
    assert_eq!(read_slot(new_right, 0), 22);

    // Both leaves moved off their allocation page, so it was recycled.
    assert!(!heap.is_heap_address(left));
    assert!(!heap.is_heap_address(right));
    assert_eq!(heap.stats().pages_released, 1);
    heap.verify();
}

/// Test: under a long alloc-root-collect-unroot churn the evacuation
/// page absorbs one survivor per cycle and drains back to empty, so the
/// heap ends at zero live bytes on a bounded page count.
#[test]
fn test_evacuation_page_drains_back_after_churn() {
    let (mut heap, cells) = test_heap();

    for i in 0..1000usize {
        let holder = heap.allocate(5);
        let leaf = heap.allocate(1);
        write_slot(leaf, 0, i);
        write_slot(holder, 0, leaf);
        cells[0] = holder;
        heap.collect();
        cells[0] = 0;
    }
    heap.collect();
    heap.collect();

    let stats = heap.stats();
    assert_eq!(heap.live_bytes(), 0, "churn must fully drain");
    assert_eq!(stats.pending_decrements, 0);
    // One allocation page plus one evacuation page served all 1000
    // rounds; the allocation page emptied and was recycled at the end.
    assert_eq!(stats.pages_acquired, 2);
    assert_eq!(stats.pages_released, 1);
    assert_eq!(stats.objects_evacuated, 1000);
    heap.verify();
}

/// Test: filling more than one page with garbage and collecting returns
/// every page to the pool in one pass.
#[test]
fn test_unrooted_pages_return_to_the_pool_in_bulk() {
    let (mut heap, _cells) = test_heap();

    // 2000 eight-byte entries span two pages.
    for i in 0..2000usize {
        let addr = heap.allocate(1);
        write_slot(addr, 0, i);
    }
    assert_eq!(heap.stats().pages_acquired, 2);

    heap.collect();
    assert_eq!(heap.live_bytes(), 0);
    assert_eq!(heap.stats().pages_released, 2);

    // The slab starts over on a fresh acquisition afterwards.
    let addr = heap.allocate(1);
    assert!(heap.is_heap_address(addr));
    assert_eq!(heap.stats().pages_acquired, 3);
}

/// Test: size classes recycle independently; promoting a mixed-size
/// graph frees exactly the source pages whose objects all moved, and
/// scalar slots survive untouched.
#[test]
fn test_mixed_size_classes_recycle_independently() {
    let (mut heap, cells) = test_heap();

    let triple = heap.allocate(4);
    let small = heap.allocate(1);
    let wide = heap.allocate(3);
    write_slot(triple, 0, small);
    write_slot(triple, 1, 0x5CA1A5);
    write_slot(triple, 2, wide);
    cells[0] = triple;

    heap.collect();

    // The rooted triple stayed on its own page; both children moved off
    // theirs, emptying the 8-byte and 16-byte source pages.
    assert_eq!(heap.live_bytes(), 24 + 8 + 16);
    assert_eq!(heap.stats().pages_released, 2);
    assert_eq!(read_slot(triple, 1), 0x5CA1A5, "scalar slot must not move");
    assert!(!header_of(read_slot(triple, 0)).is_young());
    assert!(!header_of(read_slot(triple, 2)).is_young());

    cells[0] = 0;
    heap.collect();
    heap.collect();
    assert_eq!(heap.live_bytes(), 0);
    assert_eq!(heap.stats().pages_released, 3);
    heap.verify();
}

/// Test: recycling accounting holds with canary guards disabled.
#[test]
fn test_recycling_with_guards_disabled_keeps_accounting() {
    let (mut heap, cells) = test_heap_with(HeapConfig::deterministic().with_guard_mode(false));

    let holder = heap.allocate(5);
    let leaf = heap.allocate(1);
    write_slot(holder, 0, leaf);
    cells[0] = holder;
    heap.collect();
    assert_eq!(heap.live_bytes(), 16);
    assert_eq!(heap.stats().objects_evacuated, 1);

    cells[0] = 0;
    heap.collect();
    heap.collect();
    assert_eq!(heap.live_bytes(), 0);
    assert_eq!(heap.stats().pending_decrements, 0);
    heap.verify();
}
