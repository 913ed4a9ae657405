//! Collection statistics.

use serde::Serialize;

/// Counters accumulated by one thread's heap partition.
///
/// `live_bytes` and `pending_decrements` are snapshots taken when the
/// stats are read; the rest accumulate over the partition's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GcStats {
    /// Completed collection cycles.
    pub collections: u64,
    /// Objects reached by traces.
    pub objects_marked: u64,
    /// Objects copied to evacuation pages.
    pub objects_evacuated: u64,
    /// Objects that left the nursery, in place or by evacuation.
    pub objects_promoted: u64,
    /// Objects reclaimed by reference-count decrements.
    pub rc_frees: u64,
    /// Pages obtained from the page source.
    pub pages_acquired: u64,
    /// Pages returned to the page source.
    pub pages_released: u64,
    /// Decrements still queued after the last cycle's budget ran out.
    pub pending_decrements: u64,
    /// Bytes held by allocated entries on resident pages.
    pub live_bytes: u64,
}

impl GcStats {
    /// Writes a one-line summary to stderr.
    pub fn log(&self) {
        eprintln!(
            "[gc] cycles={} marked={} evacuated={} promoted={} rc_frees={} \
             pages={}+/{}- pending={} live={}B",
            self.collections,
            self.objects_marked,
            self.objects_evacuated,
            self.objects_promoted,
            self.rc_frees,
            self.pages_acquired,
            self.pages_released,
            self.pending_decrements,
            self.live_bytes,
        );
    }

    /// Serializes the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| String::from("{}"))
    }
}
