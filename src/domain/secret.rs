//! Per-Domain Signing Secrets
//!
//! Every live protection domain carries a 256-bit secret that keys the
//! authenticity tags of all handles issued for it. The secret is derived
//! from the context's root key and a monotonically increasing epoch, so a
//! domain id that is freed and handed out again gets a fresh secret and
//! every handle signed for the previous occupant stops authenticating.
//!
//! # Security Properties
//! - Secrets never leave this module except as a borrowed byte view
//! - Secrets are overwritten with volatile writes when dropped
//! - Derivation is one-way (SHA-256), so a leaked domain secret does not
//!   reveal the root key

use core::fmt;
use core::ptr;
use core::sync::atomic::{compiler_fence, Ordering};

use sha2::{Digest, Sha256};

use super::registry::DomainId;

/// Length of a domain secret in bytes.
pub const SECRET_LEN: usize = 32;

/// Domain separation prefix for secret derivation.
const DERIVE_PREFIX: &[u8] = b"pagevault.domain-secret.v1";

/// A 256-bit signing secret bound to one occupancy of a domain slot.
pub struct DomainSecret([u8; SECRET_LEN]);

impl DomainSecret {
    /// Wrap raw key material (used for the context root key).
    pub(crate) const fn new(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive the secret for one occupancy of a domain slot.
    ///
    /// The epoch is bumped on every domain allocation, which is what
    /// invalidates stale handles after a slot is reused.
    pub(crate) fn derive(root: &DomainSecret, domain: DomainId, epoch: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DERIVE_PREFIX);
        hasher.update(root.as_bytes());
        hasher.update(domain.as_u16().to_le_bytes());
        hasher.update(epoch.to_le_bytes());
        Self(hasher.finalize().into())
    }

    /// Borrow the raw secret bytes for tag computation.
    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}

impl Drop for DomainSecret {
    fn drop(&mut self) {
        // Volatile writes so the wipe cannot be optimized away.
        for byte in self.0.iter_mut() {
            // SAFETY: `byte` is a valid mutable reference into the array.
            unsafe {
                ptr::write_volatile(byte, 0);
            }
        }
        compiler_fence(Ordering::SeqCst);
    }
}

impl fmt::Debug for DomainSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        write!(f, "DomainSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> DomainSecret {
        DomainSecret::new([0x42; SECRET_LEN])
    }

    #[test]
    fn derivation_is_deterministic() {
        let d = DomainId::new(3).unwrap();
        let a = DomainSecret::derive(&root(), d, 7);
        let b = DomainSecret::derive(&root(), d, 7);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn epoch_rotates_secret() {
        let d = DomainId::new(3).unwrap();
        let a = DomainSecret::derive(&root(), d, 1);
        let b = DomainSecret::derive(&root(), d, 2);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn domains_get_distinct_secrets() {
        let a = DomainSecret::derive(&root(), DomainId::new(0).unwrap(), 1);
        let b = DomainSecret::derive(&root(), DomainId::new(1).unwrap(), 1);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn debug_redacts_key_material() {
        let s = format!("{:?}", root());
        assert!(!s.contains("42"));
    }
}
