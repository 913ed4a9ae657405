//! Per-size-class slab allocation.
//!
//! One allocator instance serves one fixed entry size. It keeps a current
//! allocation page, a current evacuation page, and the pages rotated out
//! when they filled. Allocation never blocks another thread: the only
//! shared call is page acquisition through the source.

use crate::page::{entries_per_page, Page, PageState};
use crate::page_source::PageSource;
use crate::page_table::PageTable;
use gc_types::ObjectHeader;

/// Rounds a descriptor's data size up to its slab size class.
pub fn size_class(data_size: u32) -> u32 {
    ((data_size + 7) & !7).max(8)
}

/// Slab allocator for one entry size.
pub struct SlabAllocator {
    entry_size: u32,
    guard_mode: bool,
    active: Option<Page>,
    evacuation: Option<Page>,
    pending: Vec<Page>,
    pages_acquired: u64,
    pages_released: u64,
}

impl SlabAllocator {
    /// Creates an allocator for `entry_size`-byte entries.
    ///
    /// # Panics
    ///
    /// Panics if the entry size cannot fit a single entry in a page;
    /// there is no large-object path.
    pub fn new(entry_size: u32, guard_mode: bool) -> SlabAllocator {
        if entries_per_page(entry_size) == 0 {
            panic!("object size {} exceeds page capacity", entry_size);
        }
        SlabAllocator {
            entry_size,
            guard_mode,
            active: None,
            evacuation: None,
            pending: Vec::new(),
            pages_acquired: 0,
            pages_released: 0,
        }
    }

    /// Entry size this allocator serves.
    pub fn entry_size(&self) -> u32 {
        self.entry_size
    }

    /// Allocates one entry and returns its object address.
    ///
    /// The header is initialized to the fresh pattern (allocated, young,
    /// unmarked, no root, no forward), the data region is zeroed, and
    /// canaries are written when guard mode is on. An exhausted
    /// allocation page rotates into the pending pool and a fresh page
    /// replaces it.
    pub fn allocate(&mut self, type_id: u32, source: &PageSource, table: &PageTable) -> usize {
        loop {
            let page = self.ensure_active(source, table);
            if let Some(index) = page.pop_free() {
                return self.install(page, index, type_id);
            }
            page.set_state(PageState::Filled);
            self.pending.push(page);
            self.active = None;
        }
    }

    /// Takes one entry on the evacuation page for a relocated object.
    ///
    /// Returns the page and entry index; the collector copies the entry
    /// itself. Rotates exhausted evacuation pages like `allocate` does.
    pub fn evacuation_slot(&mut self, source: &PageSource, table: &PageTable) -> (Page, u32) {
        loop {
            let page = self.ensure_evacuation(source, table);
            if let Some(index) = page.pop_free() {
                return (page, index);
            }
            page.set_state(PageState::Filled);
            self.pending.push(page);
            self.evacuation = None;
        }
    }

    fn install(&mut self, page: Page, index: u32, type_id: u32) -> usize {
        // SAFETY: index was popped from the page's free list.
        unsafe {
            *page.object_header(index) = ObjectHeader::fresh(type_id);
        }
        if self.guard_mode {
            page.write_guards(index);
        }
        let addr = page.object_addr(index);
        // Reused entries may hold stale data from their previous life.
        // SAFETY: the data region spans entry_size bytes inside the entry.
        unsafe { std::ptr::write_bytes(addr as *mut u8, 0, self.entry_size as usize) };
        addr
    }

    fn ensure_active(&mut self, source: &PageSource, table: &PageTable) -> Page {
        if let Some(page) = self.active {
            return page;
        }
        let page = self.fresh_page(source, table, PageState::Active);
        self.active = Some(page);
        page
    }

    fn ensure_evacuation(&mut self, source: &PageSource, table: &PageTable) -> Page {
        if let Some(page) = self.evacuation {
            return page;
        }
        let page = self.fresh_page(source, table, PageState::Evacuation);
        self.evacuation = Some(page);
        page
    }

    fn fresh_page(&mut self, source: &PageSource, table: &PageTable, state: PageState) -> Page {
        let base = source.acquire_page();
        table.insert(base as usize);
        self.pages_acquired += 1;
        // SAFETY: acquire_page returns a zeroed page-aligned block.
        unsafe { Page::format(base, self.entry_size, self.guard_mode, state) }
    }

    /// Current allocation page, if any.
    pub fn active_page(&self) -> Option<Page> {
        self.active
    }

    /// Current evacuation page, if any.
    pub fn evacuation_page(&self) -> Option<Page> {
        self.evacuation
    }

    /// Pages rotated out after filling.
    pub fn pending_pages(&self) -> &[Page] {
        &self.pending
    }

    /// Every resident page of this size class.
    pub fn all_pages(&self) -> impl Iterator<Item = Page> + '_ {
        self.active
            .iter()
            .chain(self.evacuation.iter())
            .chain(self.pending.iter())
            .copied()
    }

    /// Bytes held by allocated entries across resident pages.
    pub fn live_bytes(&self) -> usize {
        self.all_pages().map(|p| p.live_bytes()).sum()
    }

    /// Pages obtained from the source so far.
    pub fn pages_acquired(&self) -> u64 {
        self.pages_acquired
    }

    /// Pages returned to the source so far.
    pub fn pages_released(&self) -> u64 {
        self.pages_released
    }

    /// Rebuilds every resident page's free list, then returns emptied
    /// pages to the source. Reports the base addresses of released pages
    /// so callers can drop bookkeeping that still targets them.
    ///
    /// The allocation page is retired when it empties; the evacuation
    /// page always stays resident so relocation has a warm target. Same
    /// validity window as [`Page::rebuild_freelist`].
    pub fn rebuild_and_recycle(&mut self, source: &PageSource, table: &PageTable) -> Vec<usize> {
        let pages: Vec<Page> = self.all_pages().collect();
        for page in &pages {
            page.rebuild_freelist();
        }

        let mut released = Vec::new();
        if let Some(page) = self.active {
            if page.free_count() == page.entry_count() {
                released.push(page.base() as usize);
                self.release(page, source, table);
                self.active = None;
            }
        }
        let mut kept = Vec::new();
        for page in std::mem::take(&mut self.pending) {
            if page.free_count() == page.entry_count() {
                released.push(page.base() as usize);
                self.release(page, source, table);
            } else {
                kept.push(page);
            }
        }
        self.pending = kept;
        released
    }

    /// Returns every resident page to the source, regardless of content.
    /// Used when the owning context shuts down.
    pub fn release_all(&mut self, source: &PageSource, table: &PageTable) {
        if let Some(page) = self.active.take() {
            self.release(page, source, table);
        }
        if let Some(page) = self.evacuation.take() {
            self.release(page, source, table);
        }
        for page in std::mem::take(&mut self.pending) {
            self.release(page, source, table);
        }
    }

    fn release(&mut self, page: Page, source: &PageSource, table: &PageTable) {
        table.remove(page.base() as usize);
        // SAFETY: the page was dropped from every list and its membership
        // bit is cleared; nothing references it anymore.
        unsafe { source.release_page(page.base()) };
        self.pages_released += 1;
    }
}
