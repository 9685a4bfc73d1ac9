//! Protection Domain Management
//!
//! A protection domain is a named partition of the crate-managed memory
//! with its own signing secret and elevation state.
//!
//! # Security Properties
//! - Domain ids come from a bounded pool and cannot be minted as live
//! - Each occupancy of a slot has its own secret; reuse rotates it
//! - Secrets are zeroized the moment a domain is freed

pub mod registry;
pub mod secret;

pub use registry::{DomainError, DomainId, DomainRegistry, MAX_DOMAINS};
pub use secret::DomainSecret;
