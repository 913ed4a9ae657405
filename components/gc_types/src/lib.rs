//! Shared foundation types for the marrow memory runtime.
//!
//! This crate provides the types every other component consumes:
//! object header layout, type descriptors, heap configuration, collection
//! statistics, and error types.
//!
//! # Overview
//!
//! - [`ObjectHeader`] - Per-object metadata at a fixed negative offset
//!   from the object address
//! - [`TypeDescriptor`] / [`DescriptorTable`] - Per-type layout records and
//!   the process-wide registry
//! - [`HeapConfig`] - Per-partition tuning knobs
//! - [`GcStats`] - Collection counters
//! - [`DescriptorError`] - The recoverable error class
//!
//! # Examples
//!
//! ```
//! use gc_types::{descriptors, SlotKind, TypeDescriptor};
//!
//! let pair = TypeDescriptor::with_slots(
//!     100,
//!     &[SlotKind::Pointer, SlotKind::Pointer],
//!     "pair",
//! );
//! let desc = descriptors().register(pair).unwrap();
//! assert_eq!(desc.size, 16);
//! assert_eq!(desc.pointer_count(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod config;
mod descriptor;
mod error;
mod header;
mod stats;

pub use config::{HeapConfig, DEFAULT_DECREMENT_BUDGET};
pub use descriptor::{descriptors, DescriptorTable, SlotKind, TypeDescriptor};
pub use error::{DescriptorError, DescriptorResult};
pub use header::{
    ObjectHeader, DATA_OFFSET, FLAG_ALLOCATED, FLAG_MARKED, FLAG_ROOT, FLAG_VACATED, FLAG_YOUNG,
    FORWARD_NONE, GUARD_FRONT, GUARD_FRONT_OFFSET, GUARD_REAR, GUARD_SIZE, HEADER_SIZE,
};
pub use stats::GcStats;
