//! Precise tracing, evacuation, and reference fixup.
//!
//! A collection traces the object graph breadth first from the root
//! set, relocates reachable non-root nursery objects onto evacuation
//! pages, then walks the visited objects again to rewrite moved
//! references and install reference-count credits for every edge that
//! leaves the nursery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_deque::{Injector, Steal, Worker};
use std::collections::BTreeMap;

use gc_types::{descriptors, GcStats, ObjectHeader, TypeDescriptor, FLAG_MARKED, FLAG_YOUNG};
use page_allocator::{resolve_object, ObjectRef, PageSource, PageTable, SlabAllocator};

/// Work queue of gray objects awaiting a scan.
///
/// Uses a work-stealing deque from crossbeam. The collecting thread
/// pushes and pops its local end; other threads may inject work through
/// the shared injector.
pub struct MarkQueue {
    /// Local worker deque for the collecting thread
    local: Worker<*mut u8>,
    /// Global injector for handing work in from other threads
    injector: Arc<Injector<*mut u8>>,
    /// Number of items currently queued (approximate)
    size: AtomicUsize,
}

// SAFETY: MarkQueue uses thread-safe crossbeam structures internally.
// The raw pointers stored are heap-managed addresses only dereferenced
// by the thread that owns the pages behind them.
unsafe impl Send for MarkQueue {}
unsafe impl Sync for MarkQueue {}

impl MarkQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        MarkQueue {
            local: Worker::new_fifo(),
            injector: Arc::new(Injector::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Queues an object address for scanning.
    pub fn push(&self, obj: *mut u8) {
        self.local.push(obj);
        self.size.fetch_add(1, Ordering::Relaxed);
    }

    /// Queues an object address from any thread.
    pub fn push_global(&self, obj: *mut u8) {
        self.injector.push(obj);
        self.size.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes the next address, local queue first, then the injector.
    pub fn pop(&self) -> Option<*mut u8> {
        if let Some(obj) = self.local.pop() {
            self.size.fetch_sub(1, Ordering::Relaxed);
            return Some(obj);
        }
        loop {
            match self.injector.steal() {
                Steal::Success(obj) => {
                    self.size.fetch_sub(1, Ordering::Relaxed);
                    return Some(obj);
                }
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.size.load(Ordering::Relaxed) == 0 && self.injector.is_empty()
    }

    /// Approximate number of queued addresses.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Drains the queue.
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }
}

impl Default for MarkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// One relocation performed during the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardEntry {
    /// Address the object vacated.
    pub old: usize,
    /// Address the object moved to.
    pub new: usize,
}

/// Relocations of the current cycle, indexed by the vacated headers.
#[derive(Debug, Default)]
pub struct ForwardingTable {
    entries: Vec<ForwardEntry>,
}

impl ForwardingTable {
    /// Creates an empty table.
    pub fn new() -> ForwardingTable {
        ForwardingTable {
            entries: Vec::new(),
        }
    }

    /// Records a relocation and returns its index.
    pub fn push(&mut self, old: usize, new: usize) -> u32 {
        let index = self.entries.len() as u32;
        self.entries.push(ForwardEntry { old, new });
        index
    }

    /// Relocation at `index`.
    pub fn get(&self, index: u32) -> ForwardEntry {
        self.entries[index as usize]
    }

    /// Number of recorded relocations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no relocation is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets the cycle's relocations.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub(crate) fn descriptor_for(type_id: u32) -> &'static TypeDescriptor {
    match descriptors().lookup(type_id) {
        Some(desc) => desc,
        None => panic!("heap corruption: no descriptor registered for type id {}", type_id),
    }
}

/// Resolves a pointer slot's value, panicking if it does not name an
/// exact object address on a resident page. Precise slots must hold
/// null or a valid heap pointer; anything else is corruption.
fn heap_child(addr: usize, table: &PageTable) -> ObjectRef {
    if !table.query(addr) {
        panic!("heap corruption: pointer slot holds non-heap address {:#x}", addr);
    }
    // SAFETY: the membership index confirmed the page is resident.
    match unsafe { resolve_object(addr) } {
        Some(obj) => obj,
        None => panic!("heap corruption: pointer slot holds interior address {:#x}", addr),
    }
}

/// Traces the graph breadth first from `roots` and returns the visit
/// list in traversal order.
///
/// Objects are marked when queued, so shared structure and cycles are
/// each visited exactly once. Pointer slots of visited objects are
/// validated as they are read.
pub fn trace(roots: &[usize], table: &PageTable, stats: &mut GcStats) -> Vec<usize> {
    let queue = MarkQueue::new();
    let mut visit = Vec::new();

    for &root in roots {
        // SAFETY: discovery resolved these addresses moments ago.
        if let Some(obj) = unsafe { resolve_object(root) } {
            let header = obj.header_ptr();
            // SAFETY: header_ptr points into a resident page.
            unsafe {
                if !(*header).is_marked() {
                    (*header).set(FLAG_MARKED);
                    queue.push(root as *mut u8);
                }
            }
        }
    }

    while let Some(ptr) = queue.pop() {
        let addr = ptr as usize;
        visit.push(addr);
        let obj = heap_child(addr, table);
        let desc = descriptor_for(obj.header().type_id);
        for slot in desc.pointer_slots() {
            // SAFETY: the slot lies inside the object's data region.
            let child_addr = unsafe { *((addr + slot * 8) as *const usize) };
            if child_addr == 0 {
                continue;
            }
            let child = heap_child(child_addr, table);
            let header = child.header_ptr();
            // SAFETY: as above.
            unsafe {
                if !(*header).is_allocated() {
                    panic!(
                        "heap corruption: pointer slot holds dead address {:#x}",
                        child_addr
                    );
                }
                if !(*header).is_marked() {
                    (*header).set(FLAG_MARKED);
                    queue.push(child_addr as *mut u8);
                }
            }
        }
    }

    stats.objects_marked += visit.len() as u64;
    visit
}

/// Relocates every visited nursery object that is not a root onto its
/// size class's evacuation page.
///
/// The whole entry is copied, the copy's header is reset to a marked
/// nursery pattern with a zero reference count, and the vacated header
/// becomes a forwarding stub. Entries in `visit` are rewritten in place
/// to the post-move addresses.
pub fn evacuate(
    visit: &mut [usize],
    slabs: &mut BTreeMap<u32, SlabAllocator>,
    forwarding: &mut ForwardingTable,
    source: &PageSource,
    table: &PageTable,
    stats: &mut GcStats,
) {
    for entry in visit.iter_mut() {
        let old_addr = *entry;
        // SAFETY: visited addresses resolve until their headers are vacated.
        let obj = match unsafe { resolve_object(old_addr) } {
            Some(obj) => obj,
            None => continue,
        };
        let header = obj.header();
        if !header.is_allocated() || !header.is_young() || header.is_root() {
            continue;
        }

        let entry_size = obj.page.entry_size();
        let slab = match slabs.get_mut(&entry_size) {
            Some(slab) => slab,
            None => panic!("heap corruption: no slab serves size class {}", entry_size),
        };
        let (target, index) = slab.evacuation_slot(source, table);
        let new_addr = target.object_addr(index);

        let stride = obj.page.stride() as usize;
        // SAFETY: both entries span stride bytes on distinct resident
        // pages; evacuation pages never hold evacuation candidates.
        unsafe {
            std::ptr::copy_nonoverlapping(
                obj.page.entry_addr(obj.index) as *const u8,
                target.entry_addr(index) as *mut u8,
                stride,
            );
        }
        let mut fresh = ObjectHeader::fresh(header.type_id);
        fresh.set(FLAG_MARKED);
        // SAFETY: index was handed out by the evacuation slot above.
        unsafe { *target.object_header(index) = fresh };
        if target.guards_enabled() {
            target.write_guards(index);
        }

        let fwd = forwarding.push(old_addr, new_addr);
        // SAFETY: the vacated entry still belongs to this collection.
        unsafe { *obj.header_ptr() = ObjectHeader::vacated(fwd) };

        *entry = new_addr;
        stats.objects_evacuated += 1;
    }
}

fn credit(obj: &ObjectRef) {
    // SAFETY: the ref was resolved on a resident page this cycle.
    unsafe { (*obj.header_ptr()).ref_count += 1 };
}

/// Rewrites moved references and installs reference-count credits.
///
/// Every visited object has its pointer slots walked once. A slot whose
/// target was evacuated is rewritten to the new address and the target
/// is credited. A parent that is leaving the nursery this cycle also
/// credits each surviving unmoved target, so that by promotion time
/// every edge out of a former nursery object is counted exactly once.
pub fn fixup(visit: &[usize], forwarding: &ForwardingTable, table: &PageTable) {
    for &addr in visit {
        let obj = heap_child(addr, table);
        let header = obj.header();
        let leaving = header.is_young();
        let desc = descriptor_for(header.type_id);
        for slot in desc.pointer_slots() {
            let slot_ptr = (addr + slot * 8) as *mut usize;
            // SAFETY: the slot lies inside the object's data region.
            let child_addr = unsafe { *slot_ptr };
            if child_addr == 0 {
                continue;
            }
            let child = heap_child(child_addr, table);
            let child_header = child.header();
            if child_header.is_forwarded() {
                let target = forwarding.get(child_header.forward);
                // SAFETY: as above.
                unsafe { *slot_ptr = target.new };
                credit(&heap_child(target.new, table));
            } else if leaving && child_header.is_allocated() {
                credit(&child);
            }
        }
    }
}

/// Promotes the cycle's surviving nursery objects into the old
/// generation.
///
/// Evacuated survivors already carry credits from `fixup`; roots that
/// stayed in place receive one credit for the root reference itself.
pub fn promote(visit: &[usize], stats: &mut GcStats) {
    for &addr in visit {
        // SAFETY: visit holds post-move addresses of resident objects.
        if let Some(obj) = unsafe { resolve_object(addr) } {
            let header = obj.header_ptr();
            // SAFETY: as above.
            unsafe {
                if (*header).is_young() {
                    (*header).clear(FLAG_YOUNG);
                    stats.objects_promoted += 1;
                    if (*header).is_root() {
                        (*header).ref_count += 1;
                    }
                }
            }
        }
    }
}
