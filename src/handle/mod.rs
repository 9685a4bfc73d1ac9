//! Signed Pointer Authority
//!
//! Issues and authenticates tamper-evident handles over block addresses.
//!
//! # Design
//! - `sign` computes a keyed tag over (address, context, domain)
//! - `authenticate` recovers the address only on an exact binding match
//! - Secrets live in the domain registry; this module never stores state
//!
//! # Security Properties
//! - No raw address circulates outside an authenticated call
//! - Tag comparison does not short-circuit on the first mismatch

pub mod signed;
pub mod tag;

pub use signed::{AuthError, ContextToken, SignedHandle};
pub use tag::TAG_LEN;
