//! Type descriptors and the process-wide descriptor table.
//!
//! A descriptor is the minimal per-type layout record the collector
//! consumes: object size plus a per-slot pointer/non-pointer mask. The
//! compiled program registers every shape before its first allocation;
//! descriptors are immutable afterwards and live for the whole process.

use crate::error::{DescriptorError, DescriptorResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Classification of one data slot in a type's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Slot holds a managed object address (or null).
    Pointer,
    /// Slot holds raw non-pointer data.
    Scalar,
}

/// Immutable per-type layout record.
///
/// Pointer-bearing types describe their data as `slot_count` 8-byte slots
/// covered by `pointer_mask`; leaf types carry no mask and are never
/// scanned for children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Identifier stored in every instance's header.
    pub type_id: u32,
    /// Total data size in bytes.
    pub size: u32,
    /// Number of 8-byte data slots (zero for leaf types).
    pub slot_count: u32,
    /// Per-slot classification, one entry per slot.
    pub pointer_mask: Vec<SlotKind>,
    /// Human-readable type name for diagnostics.
    pub name: String,
}

impl TypeDescriptor {
    /// Builds a leaf descriptor: `size` bytes of raw data, no pointer slots.
    pub fn leaf(type_id: u32, size: u32, name: &str) -> TypeDescriptor {
        TypeDescriptor {
            type_id,
            size,
            slot_count: 0,
            pointer_mask: Vec::new(),
            name: name.to_string(),
        }
    }

    /// Builds a pointer-bearing descriptor from a slot mask. The data size
    /// is the mask length in 8-byte words.
    pub fn with_slots(type_id: u32, mask: &[SlotKind], name: &str) -> TypeDescriptor {
        TypeDescriptor {
            type_id,
            size: (mask.len() * 8) as u32,
            slot_count: mask.len() as u32,
            pointer_mask: mask.to_vec(),
            name: name.to_string(),
        }
    }

    /// True if this type carries no pointer mask and terminates traversal.
    pub fn is_leaf(&self) -> bool {
        self.pointer_mask.is_empty()
    }

    /// Number of pointer slots in the mask.
    pub fn pointer_count(&self) -> u32 {
        self.pointer_mask
            .iter()
            .filter(|k| **k == SlotKind::Pointer)
            .count() as u32
    }

    /// Indices of the slots that hold managed pointers.
    pub fn pointer_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.pointer_mask
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == SlotKind::Pointer)
            .map(|(i, _)| i)
    }

    fn validate(&self) -> DescriptorResult<()> {
        if self.size == 0 {
            return Err(DescriptorError::ZeroSize(self.type_id));
        }
        if self.pointer_mask.is_empty() {
            if self.slot_count != 0 {
                return Err(DescriptorError::SlotCountMismatch {
                    type_id: self.type_id,
                    slot_count: self.slot_count,
                    mask_len: 0,
                });
            }
            return Ok(());
        }
        if self.pointer_mask.len() != self.slot_count as usize {
            return Err(DescriptorError::SlotCountMismatch {
                type_id: self.type_id,
                slot_count: self.slot_count,
                mask_len: self.pointer_mask.len(),
            });
        }
        let expected = self.slot_count * 8;
        if self.size != expected {
            return Err(DescriptorError::SizeMismatch {
                type_id: self.type_id,
                size: self.size,
                expected,
            });
        }
        Ok(())
    }
}

/// Registry of every type shape the program allocates.
///
/// Registration leaks each accepted descriptor to give it process lifetime;
/// lookups hand out `&'static` references that stay valid for as long as
/// any instance of the type can exist. Re-registering an identical
/// descriptor is a no-op returning the existing record, so independent
/// startup paths may register shared shapes without coordination.
pub struct DescriptorTable {
    by_id: RwLock<HashMap<u32, &'static TypeDescriptor>>,
}

impl DescriptorTable {
    /// Creates an empty table.
    pub fn new() -> DescriptorTable {
        DescriptorTable {
            by_id: RwLock::new(HashMap::new()),
        }
    }

    /// Validates and registers a descriptor.
    ///
    /// # Returns
    ///
    /// The process-lifetime record, or an error if the descriptor is
    /// malformed or its id is already bound to a different shape.
    pub fn register(&self, desc: TypeDescriptor) -> DescriptorResult<&'static TypeDescriptor> {
        desc.validate()?;
        let mut map = self.by_id.write();
        if let Some(existing) = map.get(&desc.type_id) {
            if **existing == desc {
                return Ok(existing);
            }
            return Err(DescriptorError::DuplicateTypeId(desc.type_id));
        }
        let leaked: &'static TypeDescriptor = Box::leak(Box::new(desc));
        map.insert(leaked.type_id, leaked);
        Ok(leaked)
    }

    /// Looks up a descriptor by id.
    pub fn lookup(&self, type_id: u32) -> Option<&'static TypeDescriptor> {
        self.by_id.read().get(&type_id).copied()
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.by_id.read().len()
    }

    /// True if no descriptor has been registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.read().is_empty()
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

static DESCRIPTORS: OnceLock<DescriptorTable> = OnceLock::new();

/// Process-wide descriptor table.
pub fn descriptors() -> &'static DescriptorTable {
    DESCRIPTORS.get_or_init(DescriptorTable::new)
}
