//! Integration test suite for the Marrow garbage collector
//!
//! This crate provides integration tests that verify the heap
//! components work together correctly across component boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use collector;
    pub use gc_types;
    pub use page_allocator;
}
