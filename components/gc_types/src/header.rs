//! Object metadata header and entry layout constants.
//!
//! Every managed object is stored as a fixed-stride slab entry:
//!
//! ```text
//! [ ObjectHeader | front guard | data slots ... | rear guard ]
//! ^ entry start                ^ object address (data start)
//! ```
//!
//! The object's identity is its data-start address; the header sits at a
//! constant negative offset from it. Guard words are always reserved in the
//! stride but only written and checked when guard mode is enabled.

/// Entry holds a live allocation.
pub const FLAG_ALLOCATED: u8 = 1 << 0;
/// Object has not yet left the nursery.
pub const FLAG_YOUNG: u8 = 1 << 1;
/// Object was reached by the current trace. Transient, cleared at cycle end.
pub const FLAG_MARKED: u8 = 1 << 2;
/// Object was discovered as a root in the most recent root scan.
pub const FLAG_ROOT: u8 = 1 << 3;
/// Entry was vacated by evacuation this cycle; `forward` names a
/// forwarding-table slot. Distinguishes vacated entries from ordinary
/// free-list nodes, which reuse `forward` as their next link.
pub const FLAG_VACATED: u8 = 1 << 4;

/// Sentinel value of [`ObjectHeader::forward`] meaning "not forwarded".
///
/// The same field doubles as the free-list next link while an entry is
/// unallocated, with this sentinel terminating the list.
pub const FORWARD_NONE: u32 = u32::MAX;

/// Size of the object header in bytes.
pub const HEADER_SIZE: usize = 16;
/// Size of one canary guard word in bytes.
pub const GUARD_SIZE: usize = 8;
/// Byte offset from entry start to the front guard word.
pub const GUARD_FRONT_OFFSET: usize = HEADER_SIZE;
/// Byte offset from entry start to the object data slots.
pub const DATA_OFFSET: usize = HEADER_SIZE + GUARD_SIZE;

/// Canary pattern written immediately before the data slots.
pub const GUARD_FRONT: u64 = 0xC0DE_FACE_A110_CA7E;
/// Canary pattern written immediately after the data slots.
pub const GUARD_REAR: u64 = 0xBAD0_CAB1_E0DD_BA11;

/// Per-object metadata header.
///
/// Lives at the start of every slab entry, [`DATA_OFFSET`] bytes before the
/// object address. While the entry is on a free list the flags byte is zero
/// (the canonical free pattern) and `forward` holds the index of the next
/// free entry instead of a forwarding slot; the two uses never overlap
/// because forwarding indices are only installed on entries vacated by
/// evacuation, which rejoin the free list before the next cycle begins.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Flag byte, see the `FLAG_*` constants.
    pub flags: u8,
    _pad: [u8; 3],
    /// Descriptor id of the stored object's type.
    pub type_id: u32,
    /// Forwarding-table slot during evacuation, free-list next link while
    /// unallocated, [`FORWARD_NONE`] otherwise.
    pub forward: u32,
    /// Reference count. Meaningful only once the object has left the
    /// young generation.
    pub ref_count: u32,
}

impl ObjectHeader {
    /// Header of a freshly allocated object: allocated, young, unmarked,
    /// not a root, not forwarded, zero reference count.
    pub fn fresh(type_id: u32) -> ObjectHeader {
        ObjectHeader {
            flags: FLAG_ALLOCATED | FLAG_YOUNG,
            _pad: [0; 3],
            type_id,
            forward: FORWARD_NONE,
            ref_count: 0,
        }
    }

    /// Canonical free pattern: all flags clear, `forward` linking to the
    /// next free entry (or [`FORWARD_NONE`] at the list end).
    pub fn free_node(next: u32) -> ObjectHeader {
        ObjectHeader {
            flags: 0,
            _pad: [0; 3],
            type_id: 0,
            forward: next,
            ref_count: 0,
        }
    }

    /// Header written over an entry vacated by evacuation. All reachability
    /// flags are clear so the entry rejoins the free list on the next
    /// rebuild; `forward` names the forwarding-table slot recording the
    /// object's new address.
    pub fn vacated(forward: u32) -> ObjectHeader {
        ObjectHeader {
            flags: FLAG_VACATED,
            _pad: [0; 3],
            type_id: 0,
            forward,
            ref_count: 0,
        }
    }

    /// True if the entry holds a live allocation.
    pub fn is_allocated(&self) -> bool {
        self.flags & FLAG_ALLOCATED != 0
    }

    /// True if the object has not yet left the nursery.
    pub fn is_young(&self) -> bool {
        self.flags & FLAG_YOUNG != 0
    }

    /// True if the object was reached by the current trace.
    pub fn is_marked(&self) -> bool {
        self.flags & FLAG_MARKED != 0
    }

    /// True if the object was a root in the most recent root scan.
    pub fn is_root(&self) -> bool {
        self.flags & FLAG_ROOT != 0
    }

    /// True if the entry was vacated by evacuation and `forward` names a
    /// forwarding-table slot.
    pub fn is_forwarded(&self) -> bool {
        self.flags & FLAG_VACATED != 0
    }

    /// Sets the given flag bits.
    pub fn set(&mut self, flags: u8) {
        self.flags |= flags;
    }

    /// Clears the given flag bits.
    pub fn clear(&mut self, flags: u8) {
        self.flags &= !flags;
    }
}
