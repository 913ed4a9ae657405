//! Collector - Conservative roots, tracing, evacuation, and deferred
//! reference counting
//!
//! This component provides:
//! - Register, native-stack, and global-span root discovery
//! - Breadth-first precise tracing over registered type descriptors
//! - Nursery evacuation with per-cycle forwarding and reference fixup
//! - Deferred reference counting for the old generation
//! - Per-thread mutator contexts and a thread-bound heap surface

pub mod context;
pub mod heap;
pub mod refcount;
pub mod roots;
pub mod trace;
pub mod verify;

// Re-export main types
pub use context::{CollectPhase, MutatorContext};
pub use heap::{
    allocate, bootstrap_thread, bootstrap_thread_with, collect, is_heap_address, live_bytes,
    register_globals, stats, verify_heap, Heap,
};
pub use refcount::{diff_roots, ledger, process_decrements};
pub use roots::{capture_registers, current_sp, discover_roots, GlobalSpan};
pub use trace::{ForwardEntry, ForwardingTable, MarkQueue};
pub use verify::verify_slabs;
