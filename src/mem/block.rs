//! Protected Block Types
//!
//! Type-safe wrappers for block addresses and the per-block access policy.
//!
//! # Security Properties
//! - Block addresses cannot be dereferenced directly; only the allocator
//!   that issued them can turn them back into byte slices
//! - The access policy defaults to full access under the owner's elevated
//!   view and read-only for everyone else

use core::fmt;

use bitflags::bitflags;

use crate::domain::DomainId;

/// Page size (4 KiB).
pub const PAGE_SIZE: usize = 4096;
/// Page size mask.
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Round a size up to a whole number of pages.
///
/// Returns `None` on overflow.
#[inline]
pub(crate) const fn page_round_up(size: usize) -> Option<usize> {
    match size.checked_add(PAGE_MASK) {
        Some(padded) => Some(padded & !PAGE_MASK),
        None => None,
    }
}

/// The address of a protected block.
///
/// This is a newtype wrapper so a block address is never confused with a
/// plain integer and is never dereferenced outside the allocator. It is
/// only ever handed to consumers wrapped in a signed handle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct BlockAddr(usize);

impl BlockAddr {
    /// Create a new block address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }
}

impl fmt::Debug for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockAddr({:#018x})", self.0)
    }
}

impl fmt::Display for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

bitflags! {
    /// Access rights to a protected block.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct AccessPolicy: u8 {
        /// Read permission.
        const READ = 1 << 0;
        /// Write permission.
        const WRITE = 1 << 1;
        /// Execute permission.
        const EXECUTE = 1 << 2;
        /// Read, write and execute.
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
    }
}

/// The access policy of one block, split by elevation state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockPolicy {
    /// Rights while the owning domain's view is elevated.
    pub elevated: AccessPolicy,
    /// Rights for every other execution context.
    pub resident: AccessPolicy,
}

impl BlockPolicy {
    /// Check whether `access` is permitted given the owner's elevation state.
    #[inline]
    pub fn allows(&self, access: AccessPolicy, owner_elevated: bool) -> bool {
        let granted = if owner_elevated {
            self.elevated
        } else {
            self.resident
        };
        granted.contains(access)
    }
}

impl Default for BlockPolicy {
    /// Full access under the owner's view, read-only otherwise.
    fn default() -> Self {
        Self {
            elevated: AccessPolicy::RWX,
            resident: AccessPolicy::READ,
        }
    }
}

/// Bookkeeping for one live protected block.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BlockInfo {
    /// Backing address of the block.
    pub addr: BlockAddr,
    /// Block length in bytes (a whole number of pages).
    pub len: usize,
    /// Domain the block is bound to.
    pub owner: DomainId,
    /// Access policy of the block.
    pub policy: BlockPolicy,
}
