//! Page layout: a small header followed by packed fixed-stride entries.
//!
//! Every entry is `[ObjectHeader | front guard | data | rear guard]`,
//! rounded up to 8 bytes. Object addresses are entry data starts, so the
//! header of any object sits `DATA_OFFSET` bytes below it and its page
//! header is one mask away. Unallocated entries form an intrusive free
//! list threaded through their headers' `forward` field.

use crate::page_source::{PAGE_MASK, PAGE_SIZE};
use gc_types::{
    ObjectHeader, DATA_OFFSET, GUARD_FRONT, GUARD_FRONT_OFFSET, GUARD_REAR, GUARD_SIZE,
    HEADER_SIZE,
};

/// Value of the first header word on every formatted page.
pub const PAGE_MAGIC: u32 = 0x4D52_5750; // "MRWP"
/// Byte offset of the first entry; the page header never grows past this.
pub const FIRST_ENTRY_OFFSET: usize = 64;
/// Free-list terminator index.
pub const FREE_LIST_END: u32 = u32::MAX;

const PAGE_FLAG_GUARDS: u8 = 1;

/// Position of a page in its size class's rotation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Current allocation target.
    Active = 0,
    /// Current evacuation target.
    Evacuation = 1,
    /// Rotated out, awaiting rebuild or recycling.
    Filled = 2,
}

/// Coarse utilization classification of a page.
///
/// Data-model only for now: the buckets feed future defragmentation or
/// early-return policies but nothing consumes them beyond reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utilization {
    /// Every entry is free.
    Empty,
    /// At least half of the entries are free.
    Sparse,
    /// Fewer than half of the entries are free.
    Dense,
    /// No free entries.
    Full,
}

#[repr(C)]
struct RawPageHeader {
    magic: u32,
    state: u8,
    flags: u8,
    _pad: [u8; 2],
    entry_size: u32,
    stride: u32,
    entry_count: u32,
    free_count: u32,
    free_head: u32,
}

/// Full stride of one entry for a given data size.
pub fn entry_stride(entry_size: u32) -> u32 {
    let raw = HEADER_SIZE + GUARD_SIZE + entry_size as usize + GUARD_SIZE;
    ((raw + 7) & !7) as u32
}

/// Number of entries a page holds for a given data size.
pub fn entries_per_page(entry_size: u32) -> u32 {
    ((PAGE_SIZE - FIRST_ENTRY_OFFSET) / entry_stride(entry_size) as usize) as u32
}

/// Handle to one formatted page.
///
/// A thin copyable wrapper over the page base; all state lives in the
/// page memory itself. Handles compare by page identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    base: *mut u8,
}

impl Page {
    /// Formats a raw page from the source into an empty slab page.
    ///
    /// # Safety
    ///
    /// `base` must point at a page-aligned, zero-filled block of
    /// `PAGE_SIZE` bytes owned by the caller.
    pub unsafe fn format(base: *mut u8, entry_size: u32, guard_mode: bool, state: PageState) -> Page {
        let stride = entry_stride(entry_size);
        let count = entries_per_page(entry_size);
        debug_assert!(count > 0, "entry size {} exceeds page capacity", entry_size);

        let raw = base as *mut RawPageHeader;
        (*raw).magic = PAGE_MAGIC;
        (*raw).state = state as u8;
        (*raw).flags = if guard_mode { PAGE_FLAG_GUARDS } else { 0 };
        (*raw)._pad = [0; 2];
        (*raw).entry_size = entry_size;
        (*raw).stride = stride;
        (*raw).entry_count = count;
        (*raw).free_count = count;
        (*raw).free_head = 0;

        let page = Page { base };
        for i in 0..count {
            let next = if i + 1 == count { FREE_LIST_END } else { i + 1 };
            *page.object_header(i) = ObjectHeader::free_node(next);
        }
        page
    }

    /// Wraps the already formatted page containing `addr`.
    ///
    /// # Safety
    ///
    /// The page holding `addr` must be resident; the caller confirms this
    /// through the membership index before resolving entries.
    pub unsafe fn containing(addr: usize) -> Page {
        Page {
            base: (addr & PAGE_MASK) as *mut u8,
        }
    }

    /// Page base address.
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    fn raw(&self) -> *mut RawPageHeader {
        self.base as *mut RawPageHeader
    }

    /// First header word; `PAGE_MAGIC` on every formatted page.
    pub fn magic(&self) -> u32 {
        // SAFETY: the handle refers to a resident page.
        unsafe { (*self.raw()).magic }
    }

    /// Data size this page's entries serve.
    pub fn entry_size(&self) -> u32 {
        // SAFETY: as above.
        unsafe { (*self.raw()).entry_size }
    }

    /// Full entry stride in bytes.
    pub fn stride(&self) -> u32 {
        // SAFETY: as above.
        unsafe { (*self.raw()).stride }
    }

    /// Total number of entries.
    pub fn entry_count(&self) -> u32 {
        // SAFETY: as above.
        unsafe { (*self.raw()).entry_count }
    }

    /// Number of entries currently on the free list.
    pub fn free_count(&self) -> u32 {
        // SAFETY: as above.
        unsafe { (*self.raw()).free_count }
    }

    /// True if this page writes and checks canary guards.
    pub fn guards_enabled(&self) -> bool {
        // SAFETY: as above.
        unsafe { (*self.raw()).flags & PAGE_FLAG_GUARDS != 0 }
    }

    /// Current rotation state.
    pub fn state(&self) -> PageState {
        // SAFETY: as above.
        match unsafe { (*self.raw()).state } {
            0 => PageState::Active,
            1 => PageState::Evacuation,
            2 => PageState::Filled,
            other => panic!(
                "heap corruption: page {:p} has invalid state {}",
                self.base, other
            ),
        }
    }

    /// Moves the page to a new rotation state.
    pub fn set_state(&self, state: PageState) {
        // SAFETY: as above.
        unsafe { (*self.raw()).state = state as u8 }
    }

    /// Utilization bucket from the current free count.
    pub fn utilization(&self) -> Utilization {
        let total = self.entry_count();
        let free = self.free_count();
        if free == total {
            Utilization::Empty
        } else if free == 0 {
            Utilization::Full
        } else if free * 2 >= total {
            Utilization::Sparse
        } else {
            Utilization::Dense
        }
    }

    /// Entry start address for `index`.
    pub fn entry_addr(&self, index: u32) -> usize {
        debug_assert!(index < self.entry_count());
        self.base as usize + FIRST_ENTRY_OFFSET + index as usize * self.stride() as usize
    }

    /// Object (data start) address for `index`.
    pub fn object_addr(&self, index: u32) -> usize {
        self.entry_addr(index) + DATA_OFFSET
    }

    /// Header of the entry at `index`.
    pub fn object_header(&self, index: u32) -> *mut ObjectHeader {
        self.entry_addr(index) as *mut ObjectHeader
    }

    /// Maps an exact object address back to its entry index.
    ///
    /// Interior and misaligned addresses return `None`; only data starts
    /// name objects.
    pub fn index_of_object(&self, addr: usize) -> Option<u32> {
        let first = self.base as usize + FIRST_ENTRY_OFFSET;
        let offset = addr.checked_sub(first)?;
        let stride = self.stride() as usize;
        let index = (offset / stride) as u32;
        if offset % stride != DATA_OFFSET || index >= self.entry_count() {
            return None;
        }
        Some(index)
    }

    /// Pops the next free entry, or `None` when the page is exhausted.
    pub fn pop_free(&self) -> Option<u32> {
        // SAFETY: the handle refers to a resident formatted page.
        unsafe {
            let head = (*self.raw()).free_head;
            if head == FREE_LIST_END {
                return None;
            }
            (*self.raw()).free_head = (*self.object_header(head)).forward;
            (*self.raw()).free_count -= 1;
            Some(head)
        }
    }

    /// Returns `index` to the free list, resetting its header to the
    /// canonical free pattern.
    pub fn push_free(&self, index: u32) {
        // SAFETY: as above.
        unsafe {
            let head = (*self.raw()).free_head;
            *self.object_header(index) = ObjectHeader::free_node(head);
            (*self.raw()).free_head = index;
            (*self.raw()).free_count += 1;
        }
    }

    /// Writes both canary words around the entry's data slots.
    pub fn write_guards(&self, index: u32) {
        let entry = self.entry_addr(index);
        // SAFETY: guard words lie inside the entry's stride.
        unsafe {
            *((entry + GUARD_FRONT_OFFSET) as *mut u64) = GUARD_FRONT;
            *((entry + DATA_OFFSET + self.entry_size() as usize) as *mut u64) = GUARD_REAR;
        }
    }

    /// True if both canary words around `index` are intact.
    pub fn check_guards(&self, index: u32) -> bool {
        let entry = self.entry_addr(index);
        // SAFETY: as in write_guards.
        unsafe {
            *((entry + GUARD_FRONT_OFFSET) as *const u64) == GUARD_FRONT
                && *((entry + DATA_OFFSET + self.entry_size() as usize) as *const u64) == GUARD_REAR
        }
    }

    /// Rebuilds the free list from entry headers.
    ///
    /// Relinks every entry that is unallocated, or old-generation with a
    /// zero reference count, or young and unmarked by the most recent
    /// trace. Restores the free-count/entry-count invariant. Valid while
    /// the mark bits of young entries still reflect that trace.
    pub fn rebuild_freelist(&self) {
        let count = self.entry_count();
        let mut head = FREE_LIST_END;
        let mut free = 0u32;
        // Reverse walk so pops come out in ascending address order.
        for index in (0..count).rev() {
            // SAFETY: index is within the page.
            let header = unsafe { *self.object_header(index) };
            let reclaim = !header.is_allocated()
                || (!header.is_young() && header.ref_count == 0)
                || (header.is_young() && !header.is_marked());
            if reclaim {
                // SAFETY: as above.
                unsafe { *self.object_header(index) = ObjectHeader::free_node(head) };
                head = index;
                free += 1;
            }
        }
        // SAFETY: the handle refers to a resident formatted page.
        unsafe {
            (*self.raw()).free_head = head;
            (*self.raw()).free_count = free;
        }
    }

    /// Bytes held by allocated entries.
    pub fn live_bytes(&self) -> usize {
        (self.entry_count() - self.free_count()) as usize * self.entry_size() as usize
    }

    /// Verifies page integrity, panicking on the first violation.
    ///
    /// Checks the magic word, canaries around every allocated entry when
    /// guards are on, free-list length against the free count, and that no
    /// free-list node carries the allocated flag.
    pub fn verify(&self) {
        if self.magic() != PAGE_MAGIC {
            panic!("heap corruption: bad magic on page {:p}", self.base);
        }
        let guards = self.guards_enabled();
        let count = self.entry_count();
        let mut allocated = 0u32;
        for index in 0..count {
            // SAFETY: index is within the page.
            let header = unsafe { *self.object_header(index) };
            if header.is_allocated() {
                allocated += 1;
                if guards && !self.check_guards(index) {
                    panic!(
                        "heap corruption: canary mismatch at {:#x}",
                        self.object_addr(index)
                    );
                }
            }
        }

        let mut walked = 0u32;
        // SAFETY: free links stay within the page; the walk is bounded by
        // entry_count below to catch cycles.
        let mut node = unsafe { (*self.raw()).free_head };
        while node != FREE_LIST_END {
            if node >= count || walked > count {
                panic!(
                    "heap corruption: free list of page {:p} walks out of bounds",
                    self.base
                );
            }
            let header = unsafe { *self.object_header(node) };
            if header.is_allocated() {
                panic!(
                    "heap corruption: allocated entry {:#x} is on the free list",
                    self.object_addr(node)
                );
            }
            node = header.forward;
            walked += 1;
        }
        if walked != self.free_count() {
            panic!(
                "heap corruption: page {:p} free list has {} nodes but free count is {}",
                self.base,
                walked,
                self.free_count()
            );
        }
        if allocated + walked > count {
            panic!(
                "heap corruption: page {:p} holds {} allocated + {} free entries of {}",
                self.base, allocated, walked, count
            );
        }
    }
}

/// A resolved object: its page and entry index.
#[derive(Debug, Clone, Copy)]
pub struct ObjectRef {
    /// Page holding the entry.
    pub page: Page,
    /// Entry index within the page.
    pub index: u32,
}

impl ObjectRef {
    /// Pointer to the entry's header.
    pub fn header_ptr(&self) -> *mut ObjectHeader {
        self.page.object_header(self.index)
    }

    /// Copy of the entry's header.
    pub fn header(&self) -> ObjectHeader {
        // SAFETY: the ref was resolved on a resident page.
        unsafe { *self.header_ptr() }
    }

    /// Object data start.
    pub fn data(&self) -> *mut u8 {
        self.addr() as *mut u8
    }

    /// Object address.
    pub fn addr(&self) -> usize {
        self.page.object_addr(self.index)
    }
}

/// Resolves a candidate object address against its page's layout.
///
/// Accepts only 8-aligned addresses that land exactly on an entry data
/// start of a page carrying the magic word. Does not inspect the entry's
/// allocated flag; callers decide what entry states they accept.
///
/// # Safety
///
/// The page containing `addr` must be resident. Callers establish this
/// via the membership index before resolving.
pub unsafe fn resolve_object(addr: usize) -> Option<ObjectRef> {
    if addr & 7 != 0 {
        return None;
    }
    let page = Page::containing(addr);
    if page.magic() != PAGE_MAGIC {
        return None;
    }
    let index = page.index_of_object(addr)?;
    Some(ObjectRef { page, index })
}
