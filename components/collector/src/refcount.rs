//! Deferred reference counting for the old generation.
//!
//! Old objects never get traced for liveness. Each carries a count of
//! incoming counted references; root-set changes and dying objects feed
//! a decrement worklist that is drained under the process-wide ledger
//! lock, a bounded batch per collection.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::OnceLock;

use parking_lot::Mutex;

use gc_types::GcStats;
use page_allocator::{resolve_object, PageTable};

use crate::trace::descriptor_for;

static RC_LEDGER: OnceLock<Mutex<()>> = OnceLock::new();

/// Process-wide lock serializing count mutation, decrement draining,
/// and page recycling across threads.
pub fn ledger() -> &'static Mutex<()> {
    RC_LEDGER.get_or_init(|| Mutex::new(()))
}

/// Splits two sorted root sets into arrivals and departures.
///
/// Returns `(incoming, outgoing)`: addresses only in `curr`, and
/// addresses only in `prev`.
pub fn diff_roots(prev: &[usize], curr: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut incoming = Vec::new();
    let mut outgoing = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < prev.len() && j < curr.len() {
        match prev[i].cmp(&curr[j]) {
            Ordering::Less => {
                outgoing.push(prev[i]);
                i += 1;
            }
            Ordering::Greater => {
                incoming.push(curr[j]);
                j += 1;
            }
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    outgoing.extend_from_slice(&prev[i..]);
    incoming.extend_from_slice(&curr[j..]);
    (incoming, outgoing)
}

/// Drains up to `budget` queued decrements.
///
/// Every popped address is revalidated before its count moves: the page
/// must still be resident, the address must resolve to an allocated old
/// object, and the count must be positive. Stale entries are dropped
/// silently. An object whose count reaches zero queues one decrement
/// per pointer slot and returns its entry to the page free list.
///
/// The caller holds the ledger lock.
pub fn process_decrements(
    pending: &mut VecDeque<usize>,
    budget: usize,
    table: &PageTable,
    stats: &mut GcStats,
) {
    let mut remaining = budget;
    while remaining > 0 {
        let addr = match pending.pop_front() {
            Some(addr) => addr,
            None => break,
        };
        remaining -= 1;

        if !table.query(addr) {
            continue;
        }
        // SAFETY: the membership index confirmed the page is resident.
        let obj = match unsafe { resolve_object(addr) } {
            Some(obj) => obj,
            None => continue,
        };
        let header = obj.header_ptr();
        // SAFETY: header_ptr points into a resident page. Counts never
        // move below zero; a zero here is a stale queue entry.
        let freed = unsafe {
            if !(*header).is_allocated() || (*header).is_young() || (*header).ref_count == 0 {
                continue;
            }
            (*header).ref_count -= 1;
            (*header).ref_count == 0
        };
        if !freed {
            continue;
        }

        let desc = descriptor_for(obj.header().type_id);
        for slot in desc.pointer_slots() {
            // SAFETY: the slot lies inside the object's data region.
            let child = unsafe { *((addr + slot * 8) as *const usize) };
            if child != 0 {
                pending.push_back(child);
            }
        }
        obj.page.push_free(obj.index);
        stats.rc_frees += 1;
    }
    stats.pending_decrements = pending.len() as u64;
}
