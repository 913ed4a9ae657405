//! Thread-bound heap surface.
//!
//! A [`Heap`] owns one mutator context. Hosts that want implicit
//! per-thread heaps call [`bootstrap_thread`] once near the top of a
//! thread's entry function and then use the free functions; the
//! bootstrap frame's address becomes the ceiling for conservative
//! stack scans on that thread.

use std::cell::RefCell;

use gc_types::{GcStats, HeapConfig};
use page_allocator::{PageSource, PageTable};

use crate::context::{CollectPhase, MutatorContext};

/// An owned heap partition.
pub struct Heap {
    ctx: MutatorContext,
}

impl Heap {
    /// Creates a heap over the process-wide page source, scanning the
    /// native stack up to `stack_base`.
    pub fn new(stack_base: usize) -> Heap {
        Heap::with_config(stack_base, HeapConfig::default())
    }

    /// Creates a heap with an explicit configuration.
    pub fn with_config(stack_base: usize, config: HeapConfig) -> Heap {
        Heap {
            ctx: MutatorContext::new(stack_base, config),
        }
    }

    /// Creates a heap over its own page source and membership index.
    ///
    /// Intended for hermetic tests and embeddings that must not share
    /// pages with the rest of the process. Roots come from registered
    /// global spans only, so configurations normally disable native
    /// stack scanning here.
    pub fn isolated(config: HeapConfig) -> Heap {
        let source: &'static PageSource = Box::leak(Box::new(PageSource::new()));
        let table: &'static PageTable = Box::leak(Box::new(PageTable::new()));
        Heap {
            ctx: MutatorContext::with_memory(0, config, source, table),
        }
    }

    /// Allocates a nursery object of the registered type.
    pub fn allocate(&mut self, type_id: u32) -> usize {
        self.ctx.allocate(type_id)
    }

    /// Runs one collection cycle.
    pub fn collect(&mut self) {
        self.ctx.collect()
    }

    /// Registers `words` global words at `base` for root scanning.
    pub fn register_globals(&mut self, base: usize, words: usize) {
        self.ctx.register_globals(base, words)
    }

    /// Bytes held by allocated objects.
    pub fn live_bytes(&self) -> usize {
        self.ctx.live_bytes()
    }

    /// Snapshot of the heap's counters.
    pub fn stats(&self) -> GcStats {
        self.ctx.stats()
    }

    /// Checks the integrity of every resident page.
    pub fn verify(&self) {
        self.ctx.verify()
    }

    /// True if `addr` lies on a resident heap page.
    pub fn is_heap_address(&self, addr: usize) -> bool {
        self.ctx.is_heap_address(addr)
    }

    /// Collection stage currently executing.
    pub fn phase(&self) -> CollectPhase {
        self.ctx.phase()
    }
}

std::thread_local! {
    static HEAP: RefCell<Option<Heap>> = const { RefCell::new(None) };
}

// Scans reach this many bytes above the bootstrap marker: frames
// entered after bootstrap returns can sit at the same depth with
// locals just above the marker. Small enough to stay inside the
// caller's mapped frames.
const STACK_BASE_SLACK: usize = 512;

/// Binds a default-configured heap to the calling thread.
///
/// Idempotent; a thread keeps its first heap. Call this near the top
/// of the thread's entry function, before any frame that will hold
/// heap pointers.
#[inline(never)]
pub fn bootstrap_thread() {
    bootstrap_thread_with(HeapConfig::default());
}

/// Binds a heap with an explicit configuration to the calling thread.
#[inline(never)]
pub fn bootstrap_thread_with(config: HeapConfig) {
    let marker = 0usize;
    let stack_base = &marker as *const usize as usize + STACK_BASE_SLACK;
    HEAP.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(Heap::with_config(stack_base, config));
        }
    });
}

fn with_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> R {
    HEAP.with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.as_mut() {
            Some(heap) => f(heap),
            None => panic!("thread not bootstrapped for garbage collection"),
        }
    })
}

/// Allocates on the calling thread's heap.
///
/// # Panics
///
/// Panics if the thread was never bootstrapped.
pub fn allocate(type_id: u32) -> usize {
    with_heap(|heap| heap.allocate(type_id))
}

/// Collects the calling thread's heap.
pub fn collect() {
    with_heap(|heap| heap.collect())
}

/// Registers a global span on the calling thread's heap.
pub fn register_globals(base: usize, words: usize) {
    with_heap(|heap| heap.register_globals(base, words))
}

/// Bytes held by allocated objects on the calling thread's heap.
pub fn live_bytes() -> usize {
    with_heap(|heap| heap.live_bytes())
}

/// Counter snapshot for the calling thread's heap.
pub fn stats() -> GcStats {
    with_heap(|heap| heap.stats())
}

/// Verifies the calling thread's heap, panicking on corruption.
pub fn verify_heap() {
    with_heap(|heap| heap.verify())
}

/// True if `addr` lies on a resident heap page.
pub fn is_heap_address(addr: usize) -> bool {
    with_heap(|heap| heap.is_heap_address(addr))
}
