//! Authenticity Tag Computation
//!
//! The tag binds a block address to the (domain, context) pair it was
//! signed for, keyed by the domain's current secret. Anyone holding the
//! handle but not the secret can neither forge a tag for a different
//! binding nor adjust the embedded fields without detection.

use sha2::{Digest, Sha256};

use crate::domain::{DomainId, DomainSecret};
use crate::mem::BlockAddr;

use super::signed::ContextToken;

/// Length of an authenticity tag in bytes.
pub const TAG_LEN: usize = 16;

/// Domain separation prefix for tag computation.
const TAG_PREFIX: &[u8] = b"pagevault.handle-tag.v1";

/// Compute the tag over `(addr, token, domain)` keyed by `secret`.
pub(crate) fn compute(
    secret: &DomainSecret,
    addr: BlockAddr,
    token: ContextToken,
    domain: DomainId,
) -> [u8; TAG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(TAG_PREFIX);
    hasher.update(secret.as_bytes());
    hasher.update((addr.as_usize() as u64).to_le_bytes());
    hasher.update(token.as_u64().to_le_bytes());
    hasher.update(domain.as_u16().to_le_bytes());

    let digest = hasher.finalize();
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&digest[..TAG_LEN]);
    tag
}

/// Compare two tags without an early exit on the first differing byte.
pub(crate) fn tags_match(a: &[u8; TAG_LEN], b: &[u8; TAG_LEN]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(fill: u8) -> DomainSecret {
        DomainSecret::new([fill; 32])
    }

    fn domain(index: u16) -> DomainId {
        DomainId::new(index).unwrap()
    }

    #[test]
    fn tag_is_deterministic() {
        let s = secret(1);
        let a = compute(&s, BlockAddr::new(0x1000), ContextToken::new(7), domain(2));
        let b = compute(&s, BlockAddr::new(0x1000), ContextToken::new(7), domain(2));
        assert!(tags_match(&a, &b));
    }

    #[test]
    fn any_field_change_breaks_the_tag() {
        let s = secret(1);
        let base = compute(&s, BlockAddr::new(0x1000), ContextToken::new(7), domain(2));

        let other_addr = compute(&s, BlockAddr::new(0x2000), ContextToken::new(7), domain(2));
        let other_token = compute(&s, BlockAddr::new(0x1000), ContextToken::new(8), domain(2));
        let other_domain = compute(&s, BlockAddr::new(0x1000), ContextToken::new(7), domain(3));
        let other_secret = compute(
            &secret(2),
            BlockAddr::new(0x1000),
            ContextToken::new(7),
            domain(2),
        );

        assert!(!tags_match(&base, &other_addr));
        assert!(!tags_match(&base, &other_token));
        assert!(!tags_match(&base, &other_domain));
        assert!(!tags_match(&base, &other_secret));
    }
}
