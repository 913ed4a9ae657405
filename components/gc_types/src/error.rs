//! Error types for the memory runtime.
//!
//! Only descriptor registration returns recoverable errors. Heap-integrity
//! violations, OS mapping failures, and corrupted canaries are fatal by
//! design and surface as process termination with a diagnostic, never as an
//! error value.

use std::fmt;

/// Error raised when registering a malformed or conflicting descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// The id is already bound to a different shape.
    DuplicateTypeId(u32),
    /// Declared slot count disagrees with the mask length.
    SlotCountMismatch {
        /// Id of the rejected descriptor.
        type_id: u32,
        /// Declared slot count.
        slot_count: u32,
        /// Actual mask length.
        mask_len: usize,
    },
    /// A pointer-bearing type's size must be one word per slot.
    SizeMismatch {
        /// Id of the rejected descriptor.
        type_id: u32,
        /// Declared size in bytes.
        size: u32,
        /// Size implied by the slot count.
        expected: u32,
    },
    /// Descriptors must describe at least one byte of data.
    ZeroSize(u32),
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::DuplicateTypeId(id) => {
                write!(f, "type id {} is already registered with a different shape", id)
            }
            DescriptorError::SlotCountMismatch {
                type_id,
                slot_count,
                mask_len,
            } => write!(
                f,
                "type id {}: slot count {} does not match mask length {}",
                type_id, slot_count, mask_len
            ),
            DescriptorError::SizeMismatch {
                type_id,
                size,
                expected,
            } => write!(
                f,
                "type id {}: size {} does not match {} bytes implied by the slot mask",
                type_id, size, expected
            ),
            DescriptorError::ZeroSize(id) => {
                write!(f, "type id {}: size must be non-zero", id)
            }
        }
    }
}

impl std::error::Error for DescriptorError {}

/// Result alias for descriptor registration.
pub type DescriptorResult<T> = Result<T, DescriptorError>;
