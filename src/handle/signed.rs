//! Signed Pointer Handles
//!
//! A `SignedHandle` is the only form of a block address that consumers
//! ever hold. It embeds the address, the domain and context it was issued
//! for, and an authenticity tag keyed by the domain's secret.
//!
//! # Security Properties
//! - Handles cannot be forged without the domain secret
//! - A handle signed for domain A under context C never authenticates as
//!   domain B or under context D
//! - Rotating the domain secret (slot reuse) invalidates all prior handles
//! - Handles are immutable; a new write cycle issues a brand-new handle

use core::fmt;

use crate::domain::{DomainId, DomainSecret};
use crate::mem::BlockAddr;

use super::tag::{self, TAG_LEN};

/// An opaque token identifying the calling context a handle is issued for.
///
/// The front end picks the value; anything stable that identifies the
/// caller works (the reference consumer uses its module identity).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ContextToken(u64);

impl ContextToken {
    /// Create a context token from a raw value.
    #[inline]
    pub const fn new(token: u64) -> Self {
        Self(token)
    }

    /// Get the raw token value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx:{:#x}", self.0)
    }
}

/// Error type for handle authentication.
///
/// Every variant means the handle was rejected and no address was
/// recovered; the distinction is for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The caller-supplied domain differs from the signed one.
    DomainMismatch,
    /// The caller-supplied context token differs from the signed one.
    ContextMismatch,
    /// The tag does not verify under the domain's current secret.
    BadTag,
    /// The domain the handle names is no longer live.
    DeadDomain,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DomainMismatch => write!(f, "handle signed for a different domain"),
            Self::ContextMismatch => write!(f, "handle signed for a different context"),
            Self::BadTag => write!(f, "handle tag verification failed"),
            Self::DeadDomain => write!(f, "handle domain is no longer live"),
        }
    }
}

/// A tamper-evident reference to a protected block.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SignedHandle {
    /// Backing address the handle wraps. Never exposed raw.
    addr: BlockAddr,
    /// Domain the handle was signed for.
    domain: DomainId,
    /// Calling context the handle was signed for.
    token: ContextToken,
    /// Tag over all of the above, keyed by the domain secret.
    tag: [u8; TAG_LEN],
}

impl SignedHandle {
    /// Sign `addr` for `(token, domain)` under the domain's secret.
    ///
    /// Pure function of its inputs; constructing the handle has no other
    /// side effect.
    pub(crate) fn sign(
        addr: BlockAddr,
        token: ContextToken,
        domain: DomainId,
        secret: &DomainSecret,
    ) -> Self {
        Self {
            addr,
            domain,
            token,
            tag: tag::compute(secret, addr, token, domain),
        }
    }

    /// Recover the block address if the binding matches exactly.
    ///
    /// Requires the caller-supplied token and domain to equal the signed
    /// ones and the tag to verify under the domain's current secret. Any
    /// mismatch is an error, never a panic.
    pub(crate) fn authenticate(
        &self,
        token: ContextToken,
        domain: DomainId,
        secret: &DomainSecret,
    ) -> Result<BlockAddr, AuthError> {
        if domain != self.domain {
            return Err(AuthError::DomainMismatch);
        }
        if token != self.token {
            return Err(AuthError::ContextMismatch);
        }

        let expected = tag::compute(secret, self.addr, self.token, self.domain);
        if !tag::tags_match(&expected, &self.tag) {
            return Err(AuthError::BadTag);
        }

        Ok(self.addr)
    }

    /// Domain this handle was signed for.
    #[inline]
    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Context this handle was signed for.
    #[inline]
    pub fn context(&self) -> ContextToken {
        self.token
    }
}

impl fmt::Debug for SignedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Neither the address nor the tag belongs in logs.
        write!(f, "SignedHandle({}, {})", self.domain, self.token)
    }
}
