//! Per-thread mutator context and the collection cycle.
//!
//! Each mutator thread owns one context: its slab allocators, its
//! registered global spans, the root set of the previous cycle, and the
//! worklist of deferred decrements. A collection stops only the calling
//! thread; the page source and the reference-count ledger are the two
//! process-wide synchronization points.

use std::collections::{BTreeMap, VecDeque};

use crossbeam::atomic::AtomicCell;

use gc_types::{GcStats, HeapConfig, FLAG_MARKED, FLAG_ROOT};
use page_allocator::{
    page_source, page_table, resolve_object, size_class, PageSource, PageTable, SlabAllocator,
    PAGE_MASK,
};

use crate::refcount::{self, diff_roots, process_decrements};
use crate::roots::{discover_roots, GlobalSpan};
use crate::trace::{descriptor_for, evacuate, fixup, promote, trace, ForwardingTable};
use crate::verify::verify_slabs;

/// Stage of the collection cycle currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectPhase {
    /// No collection in progress, mutator running normally
    Idle,
    /// Discovering and flagging the root set
    Roots,
    /// Tracing reachable objects and relocating nursery survivors
    Trace,
    /// Rewriting moved references and installing count credits
    Fixup,
    /// Applying root deltas and draining deferred decrements
    Refcount,
    /// Rebuilding free lists and recycling emptied pages
    Rebuild,
}

impl Default for CollectPhase {
    fn default() -> Self {
        CollectPhase::Idle
    }
}

/// One thread's heap partition and collection state.
pub struct MutatorContext {
    config: HeapConfig,
    stack_base: usize,
    source: &'static PageSource,
    table: &'static PageTable,
    slabs: BTreeMap<u32, SlabAllocator>,
    globals: Vec<GlobalSpan>,
    prev_roots: Vec<usize>,
    forwarding: ForwardingTable,
    pending_decrements: VecDeque<usize>,
    phase: AtomicCell<CollectPhase>,
    stats: GcStats,
}

impl MutatorContext {
    /// Creates a context over the process-wide page source and
    /// membership index.
    ///
    /// `stack_base` is the highest stack address conservative scanning
    /// may read; pass the address of a local in the thread's entry
    /// frame.
    pub fn new(stack_base: usize, config: HeapConfig) -> MutatorContext {
        MutatorContext::with_memory(stack_base, config, page_source(), page_table())
    }

    /// Creates a context over its own page source and membership index.
    ///
    /// Hermetic tests use this so their pages never join the shared
    /// heap envelope.
    pub fn with_memory(
        stack_base: usize,
        config: HeapConfig,
        source: &'static PageSource,
        table: &'static PageTable,
    ) -> MutatorContext {
        MutatorContext {
            config,
            stack_base,
            source,
            table,
            slabs: BTreeMap::new(),
            globals: Vec::new(),
            prev_roots: Vec::new(),
            forwarding: ForwardingTable::new(),
            pending_decrements: VecDeque::new(),
            phase: AtomicCell::new(CollectPhase::Idle),
            stats: GcStats::default(),
        }
    }

    /// Allocates a nursery object of the registered type and returns
    /// its address. The data region starts zeroed.
    ///
    /// # Panics
    ///
    /// Panics if `type_id` has no registered descriptor or the type is
    /// too large for a page.
    pub fn allocate(&mut self, type_id: u32) -> usize {
        let desc = descriptor_for(type_id);
        let class = size_class(desc.size);
        let guard_mode = self.config.guard_mode;
        let slab = self
            .slabs
            .entry(class)
            .or_insert_with(|| SlabAllocator::new(class, guard_mode));
        slab.allocate(type_id, self.source, self.table)
    }

    /// Registers a span of `words` global words starting at `base` for
    /// root scanning.
    pub fn register_globals(&mut self, base: usize, words: usize) {
        self.globals.push(GlobalSpan { base, words });
    }

    /// Runs one full collection cycle on the calling thread.
    pub fn collect(&mut self) {
        self.phase.store(CollectPhase::Roots);
        let curr_roots = discover_roots(
            self.stack_base,
            &self.globals,
            self.config.scan_native_stack,
            self.table,
        );
        for &root in &curr_roots {
            // SAFETY: discovery resolved these as allocated objects.
            if let Some(obj) = unsafe { resolve_object(root) } {
                // SAFETY: the header is on a resident page.
                unsafe { (*obj.header_ptr()).set(FLAG_ROOT) };
            }
        }

        self.phase.store(CollectPhase::Trace);
        let mut visit = trace(&curr_roots, self.table, &mut self.stats);
        evacuate(
            &mut visit,
            &mut self.slabs,
            &mut self.forwarding,
            self.source,
            self.table,
            &mut self.stats,
        );

        self.phase.store(CollectPhase::Fixup);
        fixup(&visit, &self.forwarding, self.table);

        self.phase.store(CollectPhase::Refcount);
        let (incoming, outgoing) = diff_roots(&self.prev_roots, &curr_roots);
        // Newly rooted old objects gain the root reference here; nursery
        // roots get theirs at promotion instead.
        for &addr in &incoming {
            // SAFETY: current roots are resident allocated objects.
            if let Some(obj) = unsafe { resolve_object(addr) } {
                let header = obj.header_ptr();
                // SAFETY: as above.
                unsafe {
                    if !(*header).is_young() {
                        (*header).ref_count += 1;
                    }
                }
            }
        }
        promote(&visit, &mut self.stats);
        for &addr in &outgoing {
            if self.table.query(addr) {
                // SAFETY: membership confirmed the page is resident.
                if let Some(obj) = unsafe { resolve_object(addr) } {
                    let header = obj.header_ptr();
                    // SAFETY: as above.
                    unsafe {
                        if (*header).is_allocated() {
                            (*header).clear(FLAG_ROOT);
                        }
                    }
                }
            }
            self.pending_decrements.push_back(addr);
        }

        // Marks only exist on visited objects, and every visited object
        // is old once promotion ran, so the rebuild's young-and-unmarked
        // reclaim test never depends on them.
        for &addr in &visit {
            // SAFETY: survivors are resident until the rebuild below.
            if let Some(obj) = unsafe { resolve_object(addr) } {
                // SAFETY: as above.
                unsafe { (*obj.header_ptr()).clear(FLAG_MARKED) };
            }
        }

        {
            let _ledger = refcount::ledger().lock();
            process_decrements(
                &mut self.pending_decrements,
                self.config.decrement_budget,
                self.table,
                &mut self.stats,
            );

            self.phase.store(CollectPhase::Rebuild);
            let mut released = Vec::new();
            for slab in self.slabs.values_mut() {
                released.extend(slab.rebuild_and_recycle(self.source, self.table));
            }
            // A queued decrement into a recycled page would hit whatever
            // object takes over that address range next.
            if !released.is_empty() {
                self.pending_decrements
                    .retain(|addr| !released.contains(&(addr & PAGE_MASK)));
            }
        }

        self.forwarding.clear();
        self.prev_roots = curr_roots;

        self.stats.collections += 1;
        self.refresh_stats();
        if self.config.verbose {
            self.stats.log();
        }
        self.phase.store(CollectPhase::Idle);
    }

    /// Bytes held by allocated objects across this context's pages.
    pub fn live_bytes(&self) -> usize {
        self.slabs.values().map(|slab| slab.live_bytes()).sum()
    }

    /// True if `addr` lies on one of the heap's resident pages.
    pub fn is_heap_address(&self, addr: usize) -> bool {
        self.table.query(addr)
    }

    /// Collection stage currently executing.
    pub fn phase(&self) -> CollectPhase {
        self.phase.load()
    }

    /// Snapshot of the context's counters.
    pub fn stats(&self) -> GcStats {
        let mut snapshot = self.stats;
        snapshot.pages_acquired = self.slabs.values().map(|s| s.pages_acquired()).sum();
        snapshot.pages_released = self.slabs.values().map(|s| s.pages_released()).sum();
        snapshot.live_bytes = self.live_bytes() as u64;
        snapshot.pending_decrements = self.pending_decrements.len() as u64;
        snapshot
    }

    fn refresh_stats(&mut self) {
        let snapshot = self.stats();
        self.stats = snapshot;
    }

    /// Checks the integrity of every resident page, panicking on the
    /// first violation.
    pub fn verify(&self) {
        verify_slabs(&self.slabs, self.table);
    }

    /// Configuration this context runs with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }
}

impl Drop for MutatorContext {
    fn drop(&mut self) {
        // Recycling pages races with other threads draining decrements,
        // so it happens under the same ledger lock collections use.
        let _ledger = refcount::ledger().lock();
        for slab in self.slabs.values_mut() {
            slab.release_all(self.source, self.table);
        }
    }
}
