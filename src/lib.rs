//! Pagevault - Software-Enforced Protection Domains
//!
//! A capability discipline over raw memory: regions are partitioned into
//! named protection domains, block addresses only circulate as signed,
//! tamper-evident handles bound to a (domain, context) pair, and write
//! access is gated by a scoped, process-wide view switch.
//!
//! # Components
//! - `domain` - bounded pool of domain ids with per-occupancy secrets
//! - `handle` - signing and authentication of pointer handles
//! - `mem` - page-granular, zeroed blocks bound to a domain
//! - `view` - scoped elevation of write access, one domain at a time
//! - `context` - `IsolationContext`, one owned instance of the whole
//!   primitive
//! - `mailbox` - a single-slot message consumer exercising the contract
//!
//! # Security Properties
//! - A bare address is never enough to read or corrupt a domain's memory
//! - Stale handles fail authentication after their domain slot is reused
//! - Elevation cannot leak past its scope, even on error paths
//!
//! # Example
//! ```
//! use pagevault::{ContextToken, IsolationContext, Mailbox};
//!
//! let mut ctx = IsolationContext::new([7; 32], 4);
//! let token = ContextToken::new(0x1);
//!
//! let mut mailbox = Mailbox::open(&mut ctx, token)?;
//! mailbox.write(&mut ctx, b"hello")?;
//!
//! let mut out = [0u8; 16];
//! let len = mailbox.read(&ctx, &mut out)?;
//! assert_eq!(&out[..len], b"hello");
//! mailbox.close(&mut ctx)?;
//! # Ok::<(), pagevault::Fault>(())
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod context;
pub mod domain;
pub mod handle;
pub mod mailbox;
pub mod mem;
pub mod view;

pub use context::IsolationContext;
pub use domain::{DomainError, DomainId, MAX_DOMAINS};
pub use handle::{AuthError, ContextToken, SignedHandle};
pub use mailbox::Mailbox;
pub use mem::{AccessPolicy, AllocError, BlockAddr, BlockPolicy, PAGE_SIZE};
pub use view::{ViewError, ViewGuard, ViewState, ViewSwitch};

use core::fmt;

/// Any failure of an isolation operation.
///
/// Each variant wraps the error of the component that rejected the
/// operation. Nothing is retried internally; every fault propagates to
/// the caller, and on the write and free paths the prior state is left
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Domain pool exhaustion or a bad domain id.
    Domain(DomainError),
    /// Handle authentication failed.
    Auth(AuthError),
    /// Protected memory exhaustion or an unknown block.
    Alloc(AllocError),
    /// View switch misuse.
    View(ViewError),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(err) => write!(f, "domain fault: {}", err),
            Self::Auth(err) => write!(f, "authentication fault: {}", err),
            Self::Alloc(err) => write!(f, "allocation fault: {}", err),
            Self::View(err) => write!(f, "view fault: {}", err),
        }
    }
}

impl From<DomainError> for Fault {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<AuthError> for Fault {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<AllocError> for Fault {
    fn from(err: AllocError) -> Self {
        Self::Alloc(err)
    }
}

impl From<ViewError> for Fault {
    fn from(err: ViewError) -> Self {
        Self::View(err)
    }
}
