//! Protection Domain Registry
//!
//! Allocates and frees protection domain identifiers from a fixed-size pool
//! and holds the per-domain signing secret for every live domain.
//!
//! # Design
//! - Domain ids are slot indices in `[0, MAX_DOMAINS)`
//! - A slot is live exactly when it holds a secret
//! - Exactly one registry owns the liveness state; nothing else mutates it
//!
//! # Security Properties
//! - Freeing a slot drops (and thereby zeroizes) its secret
//! - Reallocating a slot derives a fresh secret, so handles signed for the
//!   previous occupant can never authenticate again
//! - Double-free and out-of-range ids are reported, never ignored

use core::fmt;

use log::debug;

use super::secret::DomainSecret;

/// Number of domain slots in the pool.
pub const MAX_DOMAINS: usize = 64;

/// A protection domain identifier.
///
/// This is a newtype to prevent using arbitrary integers as domain ids.
/// Holding a `DomainId` grants nothing by itself; every operation checks
/// liveness against the registry that issued it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct DomainId(u16);

impl DomainId {
    /// Create a domain id from a slot index.
    ///
    /// Returns `None` if the index is out of range.
    #[inline]
    pub const fn new(index: u16) -> Option<Self> {
        if (index as usize) < MAX_DOMAINS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Get the slot index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the raw id value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pd{}", self.0)
    }
}

/// Error type for domain registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainError {
    /// Every slot in the pool is live.
    Exhausted,
    /// The id is out of range or the slot is not live.
    InvalidDomain,
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "domain pool exhausted"),
            Self::InvalidDomain => write!(f, "invalid or freed domain id"),
        }
    }
}

/// The registry of live protection domains.
pub struct DomainRegistry {
    /// One slot per domain id; `Some` means live and holds its secret.
    slots: [Option<DomainSecret>; MAX_DOMAINS],
    /// Number of live slots.
    live: usize,
    /// Bumped on every allocation so reused slots get fresh secrets.
    epoch: u64,
    /// Root key all domain secrets are derived from.
    root: DomainSecret,
}

impl DomainRegistry {
    /// Create an empty registry keyed by `root_key`.
    pub fn new(root_key: [u8; 32]) -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            live: 0,
            epoch: 0,
            root: DomainSecret::new(root_key),
        }
    }

    /// Allocate the first free domain slot.
    ///
    /// Returns `DomainError::Exhausted` when every slot is live.
    pub fn allocate(&mut self) -> Result<DomainId, DomainError> {
        for index in 0..MAX_DOMAINS {
            if self.slots[index].is_some() {
                continue;
            }

            let id = DomainId(index as u16);
            self.epoch += 1;
            self.slots[index] = Some(DomainSecret::derive(&self.root, id, self.epoch));
            self.live += 1;

            debug!("allocated {} (live={})", id, self.live);
            return Ok(id);
        }

        Err(DomainError::Exhausted)
    }

    /// Free a live domain slot.
    ///
    /// Dropping the slot's secret zeroizes it and invalidates every handle
    /// still bound to this occupancy. Freeing an id that is not live is a
    /// caller bug and is reported as `InvalidDomain`.
    pub fn free(&mut self, id: DomainId) -> Result<(), DomainError> {
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or(DomainError::InvalidDomain)?;

        if slot.take().is_none() {
            return Err(DomainError::InvalidDomain);
        }

        self.live -= 1;
        debug!("freed {} (live={})", id, self.live);
        Ok(())
    }

    /// Get the current secret of a live domain.
    pub fn secret(&self, id: DomainId) -> Result<&DomainSecret, DomainError> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(DomainError::InvalidDomain)
    }

    /// Check whether a domain id is live.
    #[inline]
    pub fn is_live(&self, id: DomainId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    /// Number of live domains.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DomainRegistry {
        DomainRegistry::new([0x42; 32])
    }

    #[test]
    fn allocate_returns_first_free_slot() {
        let mut reg = registry();
        let a = reg.allocate().unwrap();
        let b = reg.allocate().unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(reg.live_count(), 2);
    }

    #[test]
    fn pool_exhaustion_then_recovery() {
        let mut reg = registry();
        let mut ids = Vec::new();
        for _ in 0..MAX_DOMAINS {
            ids.push(reg.allocate().unwrap());
        }
        assert_eq!(reg.allocate(), Err(DomainError::Exhausted));

        // Freeing one slot allows exactly one more allocation.
        reg.free(ids[10]).unwrap();
        let reused = reg.allocate().unwrap();
        assert_eq!(reused, ids[10]);
        assert_eq!(reg.allocate(), Err(DomainError::Exhausted));
    }

    #[test]
    fn double_free_is_reported() {
        let mut reg = registry();
        let id = reg.allocate().unwrap();
        reg.free(id).unwrap();
        assert_eq!(reg.free(id), Err(DomainError::InvalidDomain));
    }

    #[test]
    fn secret_of_freed_domain_is_unavailable() {
        let mut reg = registry();
        let id = reg.allocate().unwrap();
        assert!(reg.secret(id).is_ok());
        reg.free(id).unwrap();
        assert_eq!(reg.secret(id).err(), Some(DomainError::InvalidDomain));
    }

    #[test]
    fn reused_slot_gets_a_fresh_secret() {
        let mut reg = registry();
        let id = reg.allocate().unwrap();
        let before: [u8; 32] = *reg.secret(id).unwrap().as_bytes();
        reg.free(id).unwrap();
        let again = reg.allocate().unwrap();
        assert_eq!(id, again);
        assert_ne!(&before, reg.secret(again).unwrap().as_bytes());
    }

    #[test]
    fn out_of_range_id_is_rejected() {
        assert!(DomainId::new(MAX_DOMAINS as u16).is_none());
        assert!(DomainId::new(u16::MAX).is_none());
    }
}
