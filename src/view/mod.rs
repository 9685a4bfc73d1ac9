//! View Switching
//!
//! Scoped elevation of write access to one protection domain's memory.
//!
//! # Security Properties
//! - At most one elevated domain at a time
//! - Elevation always ends when its guard goes out of scope

pub mod switch;

pub use switch::{ViewError, ViewGuard, ViewState, ViewSwitch};
