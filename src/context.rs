//! Isolation Context
//!
//! One `IsolationContext` owns a complete, independent instance of the
//! isolation primitive: the domain registry, the protected allocator and
//! the view switch. Nothing is ambient process state, so multiple contexts
//! coexist and tests get a fresh world each.
//!
//! # Data Flow
//! A caller allocates a domain id, asks for memory bound to that id, and
//! only ever holds the resulting `SignedHandle`. Mutation elevates the
//! owning domain's view for the duration of a bounded copy; reads
//! authenticate the handle and copy out without elevation.

use log::warn;

use crate::domain::{DomainError, DomainId, DomainRegistry};
use crate::handle::{AuthError, ContextToken, SignedHandle};
use crate::mem::{AccessPolicy, AllocError, BlockAddr, ProtectedAllocator};
use crate::view::{ViewError, ViewSwitch};
use crate::Fault;

/// An independent instance of the protection-domain primitive.
pub struct IsolationContext {
    registry: DomainRegistry,
    allocator: ProtectedAllocator,
    view: ViewSwitch,
}

impl IsolationContext {
    /// Create a context keyed by `root_key`, with a protected arena of
    /// roughly `capacity_pages` pages.
    ///
    /// The root key seeds every per-domain secret; callers should draw it
    /// from their platform's entropy source.
    pub fn new(root_key: [u8; 32], capacity_pages: usize) -> Self {
        Self {
            registry: DomainRegistry::new(root_key),
            allocator: ProtectedAllocator::new(capacity_pages),
            view: ViewSwitch::new(),
        }
    }

    /// Allocate a protection domain from the pool.
    pub fn allocate_domain(&mut self) -> Result<DomainId, Fault> {
        Ok(self.registry.allocate()?)
    }

    /// Free a protection domain.
    ///
    /// Blocks the domain still owns are reclaimed: their handles could
    /// never authenticate again once the secret is gone, so leaving them
    /// would leak the memory silently.
    pub fn free_domain(&mut self, domain: DomainId) -> Result<(), Fault> {
        self.registry.free(domain)?;

        let reclaimed = self.allocator.release_owned(domain);
        if reclaimed > 0 {
            warn!("{}: reclaimed {} block(s) left behind at free", domain, reclaimed);
        }
        Ok(())
    }

    /// Sign a block address for `(token, domain)`.
    ///
    /// Pure function of its inputs and the domain's current secret.
    pub fn sign(
        &self,
        addr: BlockAddr,
        token: ContextToken,
        domain: DomainId,
    ) -> Result<SignedHandle, Fault> {
        let secret = self.registry.secret(domain)?;
        Ok(SignedHandle::sign(addr, token, domain, secret))
    }

    /// Recover the block address from a handle.
    ///
    /// Succeeds only on an exact match of domain, context and tag against
    /// the domain's current secret. A freed (or freed-and-reused) domain
    /// reports an authentication failure, not an invalid id: from the
    /// holder's perspective the handle is simply stale.
    pub fn authenticate(
        &self,
        handle: &SignedHandle,
        token: ContextToken,
        domain: DomainId,
    ) -> Result<BlockAddr, Fault> {
        let secret = self
            .registry
            .secret(domain)
            .map_err(|_| Fault::Auth(AuthError::DeadDomain))?;

        match handle.authenticate(token, domain, secret) {
            Ok(addr) => Ok(addr),
            Err(err) => {
                warn!("{}: handle rejected: {}", domain, err);
                Err(Fault::Auth(err))
            }
        }
    }

    /// Allocate a zeroed, page-granular block bound to `domain` and return
    /// it as a signed handle.
    ///
    /// The block's default policy grants full access only while the
    /// domain's view is elevated and read-only access otherwise.
    pub fn allocate(
        &mut self,
        domain: DomainId,
        token: ContextToken,
        size: usize,
    ) -> Result<SignedHandle, Fault> {
        if !self.registry.is_live(domain) {
            return Err(Fault::Domain(DomainError::InvalidDomain));
        }

        let (addr, _len) = self.allocator.allocate(domain, size)?;
        self.sign(addr, token, domain)
    }

    /// Free the block a handle refers to.
    ///
    /// The handle is authenticated first; on any failure the block is left
    /// intact. Unauthenticated memory is never freed.
    pub fn free(
        &mut self,
        handle: &SignedHandle,
        token: ContextToken,
        domain: DomainId,
    ) -> Result<(), Fault> {
        let addr = self.authenticate(handle, token, domain)?;
        self.allocator.free(addr, domain)?;
        Ok(())
    }

    /// Replace a block under the single-slot policy: authenticate and free
    /// the previous block first, then allocate a fresh one.
    ///
    /// If the old handle fails authentication the new allocation is
    /// aborted, so a corrupted prior handle cannot mask a leak.
    pub fn replace(
        &mut self,
        previous: Option<&SignedHandle>,
        token: ContextToken,
        domain: DomainId,
        size: usize,
    ) -> Result<SignedHandle, Fault> {
        if let Some(old) = previous {
            self.free(old, token, domain)?;
        }
        self.allocate(domain, token, size)
    }

    /// Copy `data` into the handle's block under the owning domain's
    /// elevated view.
    ///
    /// Elevation is scoped to this call and released on every exit path.
    /// The copy is bounded to the block size; the number of bytes written
    /// is returned. Fails if another domain's view is already elevated.
    pub fn write_block(
        &mut self,
        handle: &SignedHandle,
        token: ContextToken,
        domain: DomainId,
        data: &[u8],
    ) -> Result<usize, Fault> {
        let addr = self.authenticate(handle, token, domain)?;
        let info = *self
            .allocator
            .block(addr)
            .ok_or(Fault::Alloc(AllocError::UnknownBlock))?;

        let guard = self.view.activate(domain)?;

        let written = if !info.policy.allows(AccessPolicy::WRITE, guard.domain() == info.owner) {
            Err(Fault::View(ViewError::NotElevated))
        } else {
            match self.allocator.bytes_mut(addr) {
                Some(bytes) => {
                    let count = data.len().min(bytes.len());
                    bytes[..count].copy_from_slice(&data[..count]);
                    Ok(count)
                }
                None => Err(Fault::Alloc(AllocError::UnknownBlock)),
            }
        };

        guard.deactivate();
        written
    }

    /// Copy the handle's block out into `out`, bounded to the block size.
    ///
    /// Reads need no elevation under the default resident policy.
    pub fn read_block(
        &self,
        handle: &SignedHandle,
        token: ContextToken,
        domain: DomainId,
        out: &mut [u8],
    ) -> Result<usize, Fault> {
        let addr = self.authenticate(handle, token, domain)?;

        let info = self
            .allocator
            .block(addr)
            .ok_or(Fault::Alloc(AllocError::UnknownBlock))?;
        let elevated = self.view.is_elevated_for(info.owner);
        if !info.policy.allows(AccessPolicy::READ, elevated) {
            return Err(Fault::View(ViewError::NotElevated));
        }

        let bytes = self
            .allocator
            .bytes(addr)
            .ok_or(Fault::Alloc(AllocError::UnknownBlock))?;
        let count = out.len().min(bytes.len());
        out[..count].copy_from_slice(&bytes[..count]);
        Ok(count)
    }

    /// Number of live protected blocks across all domains.
    #[inline]
    pub fn live_blocks(&self) -> usize {
        self.allocator.live_blocks()
    }

    /// The view switch of this context.
    ///
    /// A guard taken from it borrows the context, so no mutating operation
    /// can run while external code holds an elevation.
    #[inline]
    pub fn view(&self) -> &ViewSwitch {
        &self.view
    }
}
