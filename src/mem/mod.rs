//! Protected Memory Management
//!
//! Provides:
//! - Page-granular blocks bound to a protection domain
//! - Zero-initialization of every block handed out
//! - Per-block access policies split by elevation state
//!
//! # Security Principles
//! - Block addresses are opaque outside this module
//! - Ownership is re-checked on every free
//! - Unsafe code is confined to the allocator's accessors

pub mod allocator;
pub mod block;

pub use allocator::{AllocError, ProtectedAllocator};
pub use block::{AccessPolicy, BlockAddr, BlockPolicy, PAGE_SIZE};
