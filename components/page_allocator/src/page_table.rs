//! Multi-level page membership index.
//!
//! Maps any address to "does this belong to the managed heap" in four
//! indexed lookups: three 8-bit radix levels of lazily installed interior
//! nodes and a 256-bit page bitmap leaf, together covering address bits
//! 16..48. Queries never allocate; a missing interior node answers "not
//! present". This is what makes the conservative root scan and the
//! reference-counted teardown cheap enough to run every cycle.

use crate::page_source::{PAGE_MASK, PAGE_SHIFT};
use std::ptr::null_mut;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

const FAN_OUT: usize = 256;
const LEVEL_BITS: usize = 8;
/// Highest address bit the table can represent.
pub const TABLE_ADDRESS_BITS: usize = PAGE_SHIFT + 4 * LEVEL_BITS;

struct Leaf {
    bits: [AtomicU64; FAN_OUT / 64],
}

impl Leaf {
    fn new() -> Box<Leaf> {
        Box::new(Leaf {
            bits: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        })
    }
}

struct Level3 {
    leaves: [AtomicPtr<Leaf>; FAN_OUT],
}

struct Level2 {
    children: [AtomicPtr<Level3>; FAN_OUT],
}

impl Level3 {
    fn new() -> Box<Level3> {
        Box::new(Level3 {
            leaves: std::array::from_fn(|_| AtomicPtr::new(null_mut())),
        })
    }
}

impl Level2 {
    fn new() -> Box<Level2> {
        Box::new(Level2 {
            children: std::array::from_fn(|_| AtomicPtr::new(null_mut())),
        })
    }
}

/// Four-level radix index over heap pages.
///
/// Interior levels are installed on first insertion and never removed;
/// removing a page clears only its leaf bit. The table also tracks the
/// heap's address envelope (lowest page base, highest page end), which
/// never shrinks and gives the root scanner its cheap first-pass range
/// test.
pub struct PageTable {
    root: [AtomicPtr<Level2>; FAN_OUT],
    envelope_lo: AtomicUsize,
    envelope_hi: AtomicUsize,
}

#[inline]
fn split(addr: usize) -> (usize, usize, usize, usize) {
    let i1 = (addr >> (PAGE_SHIFT + 3 * LEVEL_BITS)) & (FAN_OUT - 1);
    let i2 = (addr >> (PAGE_SHIFT + 2 * LEVEL_BITS)) & (FAN_OUT - 1);
    let i3 = (addr >> (PAGE_SHIFT + LEVEL_BITS)) & (FAN_OUT - 1);
    let i4 = (addr >> PAGE_SHIFT) & (FAN_OUT - 1);
    (i1, i2, i3, i4)
}

impl PageTable {
    /// Creates an empty table.
    pub fn new() -> PageTable {
        PageTable {
            root: std::array::from_fn(|_| AtomicPtr::new(null_mut())),
            envelope_lo: AtomicUsize::new(usize::MAX),
            envelope_hi: AtomicUsize::new(0),
        }
    }

    /// Marks the page containing `addr` as a heap member.
    ///
    /// Interior nodes are installed lazily; concurrent inserts race
    /// benignly with compare-and-swap, the loser freeing its node.
    pub fn insert(&self, addr: usize) {
        let page = addr & PAGE_MASK;
        if page >> TABLE_ADDRESS_BITS != 0 {
            panic!(
                "page address {:#x} is beyond the {}-bit membership table",
                page, TABLE_ADDRESS_BITS
            );
        }
        let (i1, i2, i3, i4) = split(page);

        let l2 = install(&self.root[i1], Level2::new);
        let l3 = install(&l2.children[i2], Level3::new);
        let leaf = install(&l3.leaves[i3], Leaf::new);
        leaf.bits[i4 / 64].fetch_or(1 << (i4 % 64), Ordering::Relaxed);

        self.envelope_lo.fetch_min(page, Ordering::Relaxed);
        self.envelope_hi
            .fetch_max(page + (1 << PAGE_SHIFT), Ordering::Relaxed);
    }

    /// Clears the membership bit for the page containing `addr`.
    ///
    /// Interior nodes stay in place; the envelope is not shrunk.
    pub fn remove(&self, addr: usize) {
        let page = addr & PAGE_MASK;
        if page >> TABLE_ADDRESS_BITS != 0 {
            return;
        }
        let (i1, i2, i3, i4) = split(page);

        let l2 = self.root[i1].load(Ordering::Acquire);
        if l2.is_null() {
            return;
        }
        // SAFETY: non-null level pointers were installed by insert and
        // stay valid for the table's lifetime.
        let l3 = unsafe { (*l2).children[i2].load(Ordering::Acquire) };
        if l3.is_null() {
            return;
        }
        let leaf = unsafe { (*l3).leaves[i3].load(Ordering::Acquire) };
        if leaf.is_null() {
            return;
        }
        unsafe { &(*leaf).bits[i4 / 64] }.fetch_and(!(1 << (i4 % 64)), Ordering::Relaxed);
    }

    /// Answers whether `addr` lies on a resident heap page.
    ///
    /// Four indexed lookups, no allocation, regardless of heap size.
    pub fn query(&self, addr: usize) -> bool {
        if addr >> TABLE_ADDRESS_BITS != 0 {
            return false;
        }
        let (i1, i2, i3, i4) = split(addr);

        let l2 = self.root[i1].load(Ordering::Acquire);
        if l2.is_null() {
            return false;
        }
        // SAFETY: non-null level pointers were installed by insert and
        // stay valid for the table's lifetime.
        let l3 = unsafe { (*l2).children[i2].load(Ordering::Acquire) };
        if l3.is_null() {
            return false;
        }
        let leaf = unsafe { (*l3).leaves[i3].load(Ordering::Acquire) };
        if leaf.is_null() {
            return false;
        }
        let word = unsafe { &(*leaf).bits[i4 / 64] }.load(Ordering::Relaxed);
        word & (1 << (i4 % 64)) != 0
    }

    /// The heap's conservative address envelope as `(lo, hi)`.
    ///
    /// `lo` is the lowest page base ever inserted and `hi` the end of the
    /// highest; an empty table reports `(usize::MAX, 0)`, which rejects
    /// every candidate.
    pub fn envelope(&self) -> (usize, usize) {
        (
            self.envelope_lo.load(Ordering::Relaxed),
            self.envelope_hi.load(Ordering::Relaxed),
        )
    }

    /// True if `addr` falls inside the address envelope.
    pub fn in_envelope(&self, addr: usize) -> bool {
        let (lo, hi) = self.envelope();
        addr >= lo && addr < hi
    }
}

/// Loads the node behind `slot`, installing a fresh one if empty.
fn install<T>(slot: &AtomicPtr<T>, make: fn() -> Box<T>) -> &T {
    let existing = slot.load(Ordering::Acquire);
    if !existing.is_null() {
        // SAFETY: installed nodes live until the table is dropped.
        return unsafe { &*existing };
    }
    let fresh = Box::into_raw(make());
    match slot.compare_exchange(null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire) {
        // SAFETY: we just installed this pointer.
        Ok(_) => unsafe { &*fresh },
        Err(winner) => {
            // SAFETY: the box was never shared.
            drop(unsafe { Box::from_raw(fresh) });
            // SAFETY: the winning pointer is installed for good.
            unsafe { &*winner }
        }
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PageTable {
    fn drop(&mut self) {
        for slot in &self.root {
            let l2 = slot.load(Ordering::Acquire);
            if l2.is_null() {
                continue;
            }
            // SAFETY: exclusive access in drop; every non-null pointer was
            // created by Box::into_raw in install.
            unsafe {
                for child in &(*l2).children {
                    let l3 = child.load(Ordering::Acquire);
                    if l3.is_null() {
                        continue;
                    }
                    for leaf_slot in &(*l3).leaves {
                        let leaf = leaf_slot.load(Ordering::Acquire);
                        if !leaf.is_null() {
                            drop(Box::from_raw(leaf));
                        }
                    }
                    drop(Box::from_raw(l3));
                }
                drop(Box::from_raw(l2));
            }
        }
    }
}

static PAGE_TABLE: OnceLock<PageTable> = OnceLock::new();

/// Process-wide membership index.
pub fn page_table() -> &'static PageTable {
    PAGE_TABLE.get_or_init(PageTable::new)
}
