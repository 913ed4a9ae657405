//! Object Lifecycle Integration Tests
//!
//! Tests object graphs through allocation, collection, promotion, and
//! reference-counted release, driven through the public Heap surface.

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
    let _ = table.register(TypeDescriptor::with_slots(
        4,
        &[SlotKind::Pointer, SlotKind::Scalar, SlotKind::Pointer],
        "triple",
    ));
    let _ = table.register(TypeDescriptor::with_slots(5, &[SlotKind::Pointer], "cell"));
}

fn test_heap() -> (Heap, &'static mut [usize]) {
    register_test_types();
    let mut heap = Heap::isolated(HeapConfig::deterministic());
    let cells = Box::leak(vec![0usize; 4].into_boxed_slice());
    heap.register_globals(cells.as_ptr() as usize, cells.len());
    (heap, cells)
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

/// Test: a linked list survives collection with its order and payloads
/// intact, fully promoted out of the nursery.
#[test]
fn test_list_structure_survives_collection() {
    let (mut heap, cells) = test_heap();

    let mut head = 0usize;
    for i in (0..8usize).rev() {
        let node = heap.allocate(4);
        write_slot(node, 0, head);
        write_slot(node, 1, 100 + i);
        head = node;
    }
    cells[0] = head;

    heap.collect();

    let mut cursor = cells[0];
    for i in 0..8usize {
        assert_ne!(cursor, 0, "list truncated at element {}", i);
        assert_eq!(read_slot(cursor, 1), 100 + i);
        assert!(!header_of(cursor).is_young());
        cursor = read_slot(cursor, 0);
    }
    assert_eq!(cursor, 0, "list should end after eight elements");
    assert_eq!(heap.live_bytes(), 8 * 24);
    heap.verify();
}

/// Test: a diamond counts one reference per edge, so the shared bottom
/// object holds until both paths release.
#[test]
fn test_diamond_graph_counts_each_edge() {
    let (mut heap, cells) = test_heap();
    let top = heap.allocate(2);
    let left = heap.allocate(5);
    let right = heap.allocate(5);
    let bottom = heap.allocate(1);
    write_slot(top, 0, left);
    write_slot(top, 1, right);
    write_slot(left, 0, bottom);
    write_slot(right, 0, bottom);
    cells[0] = top;

    heap.collect();
    let moved_left = read_slot(top, 0);
    let moved_right = read_slot(top, 1);
    let moved_bottom = read_slot(moved_left, 0);
    assert_eq!(read_slot(moved_right, 0), moved_bottom);
    assert_eq!(header_of(moved_bottom).ref_count, 2);
    assert_eq!(heap.live_bytes(), 16 + 8 + 8 + 8);

    cells[0] = 0;
    heap.collect();
    assert_eq!(heap.live_bytes(), 0);
    assert_eq!(heap.stats().rc_frees, 4);
    assert_eq!(heap.stats().pending_decrements, 0);
}

/// Test: repeated collection without mutation changes nothing.
#[test]
fn test_collect_without_mutation_is_stable() {
    let (mut heap, cells) = test_heap();
    let parent = heap.allocate(2);
    let child = heap.allocate(1);
    write_slot(parent, 0, child);
    cells[0] = parent;

    heap.collect();
    let settled_child = read_slot(parent, 0);
    let live = heap.live_bytes();

    heap.collect();
    heap.collect();
    assert_eq!(read_slot(parent, 0), settled_child);
    assert_eq!(heap.live_bytes(), live);
    assert_eq!(header_of(settled_child).ref_count, 1);
    assert_eq!(heap.stats().collections, 3);
    heap.verify();
}

/// Test: a rooted ring survives any number of collections.
#[test]
fn test_rooted_ring_persists() {
    let (mut heap, cells) = test_heap();
    let a = heap.allocate(5);
    let b = heap.allocate(5);
    let c = heap.allocate(5);
    write_slot(a, 0, b);
    write_slot(b, 0, c);
    write_slot(c, 0, a);
    cells[0] = a;

    for _ in 0..3 {
        heap.collect();
    }

    let ring_b = read_slot(a, 0);
    let ring_c = read_slot(ring_b, 0);
    assert_eq!(read_slot(ring_c, 0), a, "ring should close back on its root");
    assert_eq!(heap.live_bytes(), 24);
    heap.verify();
}

/// Test: dropping the sole root of a long chain releases every link in
/// one cycle when the decrement budget allows it.
#[test]
fn test_deep_chain_releases_in_one_budgeted_pass() {
    let (mut heap, cells) = test_heap();
    let mut head = 0usize;
    for _ in 0..64 {
        let node = heap.allocate(5);
        write_slot(node, 0, head);
        head = node;
    }
    cells[0] = head;

    heap.collect();
    assert_eq!(heap.live_bytes(), 64 * 8);

    cells[0] = 0;
    heap.collect();
    assert_eq!(heap.live_bytes(), 0);
    assert_eq!(heap.stats().rc_frees, 64);
    assert_eq!(heap.stats().pending_decrements, 0);
}

/// Test: a small decrement budget spreads a chain's release across
/// cycles, eight links at a time.
#[test]
fn test_decrement_budget_spreads_release_across_cycles() {
    register_test_types();
    let config = HeapConfig::deterministic().with_decrement_budget(8);
    let mut heap = Heap::isolated(config);
    let cells = Box::leak(vec![0usize; 1].into_boxed_slice());
    heap.register_globals(cells.as_ptr() as usize, cells.len());

    let mut head = 0usize;
    for _ in 0..32 {
        let node = heap.allocate(5);
        write_slot(node, 0, head);
        head = node;
    }
    cells[0] = head;
    heap.collect();
    assert_eq!(heap.live_bytes(), 32 * 8);

    cells[0] = 0;
    let mut observed = Vec::new();
    for _ in 0..4 {
        heap.collect();
        observed.push(heap.live_bytes());
    }
    assert_eq!(observed, vec![192, 128, 64, 0]);
    assert_eq!(heap.stats().rc_frees, 32);
    heap.verify();
}

/// Test: an edge from a promoting object keeps its old target alive
/// after the target's own root goes away in the same cycle.
#[test]
fn test_promoting_edge_keeps_old_target_alive() {
    let (mut heap, cells) = test_heap();
    let leaf = heap.allocate(1);
    cells[0] = leaf;
    heap.collect();
    assert_eq!(header_of(leaf).ref_count, 1);

    let holder = heap.allocate(5);
    write_slot(holder, 0, leaf);
    cells[1] = holder;
    cells[0] = 0;
    heap.collect();

    let header = header_of(leaf);
    assert!(header.is_allocated());
    assert!(!header.is_root());
    assert_eq!(header.ref_count, 1);
    assert_eq!(read_slot(holder, 0), leaf);

    cells[1] = 0;
    heap.collect();
    assert_eq!(heap.live_bytes(), 0);
}

/// Test: making an old object a root again and releasing it balances
/// its count both ways.
#[test]
fn test_re_rooting_balances_counts() {
    let (mut heap, cells) = test_heap();
    let keeper = heap.allocate(5);
    let shared = heap.allocate(1);
    write_slot(keeper, 0, shared);
    cells[0] = keeper;
    heap.collect();
    let shared = read_slot(keeper, 0);
    assert_eq!(header_of(shared).ref_count, 1);

    cells[1] = shared;
    heap.collect();
    assert_eq!(header_of(shared).ref_count, 2);
    assert!(header_of(shared).is_root());

    cells[1] = 0;
    heap.collect();
    assert_eq!(header_of(shared).ref_count, 1);
    assert!(!header_of(shared).is_root());
    assert!(header_of(shared).is_allocated());

    cells[0] = 0;
    heap.collect();
    assert_eq!(heap.live_bytes(), 0);
}
