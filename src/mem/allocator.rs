//! Protected Page Allocator
//!
//! Carves page-granular, zero-initialized blocks out of a crate-owned
//! arena and binds each block to the protection domain it was allocated
//! for.
//!
//! # Design
//! - The arena is a single heap allocation managed by `linked_list_allocator`
//! - Live blocks are tracked in a fixed-size slot table
//! - Addresses only become byte slices through this allocator's accessors
//!
//! # Security Properties
//! - Every block is zeroed before it is handed out
//! - Freeing checks the (address, owner) binding; a mismatch releases nothing
//! - Blocks left behind by a freed domain can be reclaimed in bulk

use core::alloc::Layout;
use core::ptr::{self, NonNull};

use alloc::boxed::Box;
use alloc::vec;

use linked_list_allocator::Heap;
use log::{debug, warn};

use crate::domain::DomainId;

use super::block::{page_round_up, BlockAddr, BlockInfo, BlockPolicy, PAGE_SIZE};

/// Number of simultaneously live blocks the allocator tracks.
const MAX_BLOCKS: usize = 64;

/// Error type for protected allocation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The arena (or the block table) has no room left.
    OutOfMemory,
    /// No live block matches the given address and owner.
    UnknownBlock,
}

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of protected memory"),
            Self::UnknownBlock => write!(f, "no such protected block"),
        }
    }
}

/// The allocator for domain-bound protected blocks.
pub struct ProtectedAllocator {
    /// Free-space bookkeeping over the arena.
    heap: Heap,
    /// Backing memory the heap carves blocks from. Kept alive for as long
    /// as any issued address may be dereferenced.
    arena: Box<[u8]>,
    /// Slot table of live blocks.
    blocks: [Option<BlockInfo>; MAX_BLOCKS],
}

impl ProtectedAllocator {
    /// Create an allocator with room for roughly `capacity_pages` pages.
    ///
    /// One extra page of slack absorbs alignment of the first block and
    /// the heap's bookkeeping.
    pub fn new(capacity_pages: usize) -> Self {
        let arena_len = (capacity_pages + 1) * PAGE_SIZE;
        let mut arena = vec![0u8; arena_len].into_boxed_slice();

        let mut heap = Heap::empty();
        // SAFETY: The arena is a live heap allocation that this struct owns
        // for its whole lifetime, and it is never handed out except through
        // blocks the heap itself carved from it.
        unsafe {
            heap.init(arena.as_mut_ptr(), arena.len());
        }

        Self {
            heap,
            arena,
            blocks: core::array::from_fn(|_| None),
        }
    }

    /// Total arena size in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Number of live blocks.
    pub fn live_blocks(&self) -> usize {
        self.blocks.iter().filter(|slot| slot.is_some()).count()
    }

    /// Allocate a zeroed, page-aligned block of at least `size` bytes,
    /// bound to `owner` at the default access policy.
    pub fn allocate(
        &mut self,
        owner: DomainId,
        size: usize,
    ) -> Result<(BlockAddr, usize), AllocError> {
        let len = page_round_up(size.max(1)).ok_or(AllocError::OutOfMemory)?;
        let slot = self
            .blocks
            .iter()
            .position(Option::is_none)
            .ok_or(AllocError::OutOfMemory)?;

        let layout =
            Layout::from_size_align(len, PAGE_SIZE).map_err(|_| AllocError::OutOfMemory)?;
        let block = self
            .heap
            .allocate_first_fit(layout)
            .map_err(|_| AllocError::OutOfMemory)?;

        // SAFETY: `block` points to `len` bytes freshly carved from the
        // arena, with no other reference to them.
        unsafe {
            ptr::write_bytes(block.as_ptr(), 0, len);
        }

        let addr = BlockAddr::new(block.as_ptr() as usize);
        self.blocks[slot] = Some(BlockInfo {
            addr,
            len,
            owner,
            policy: BlockPolicy::default(),
        });

        debug!("{}: allocated {} byte block at {}", owner, len, addr);
        Ok((addr, len))
    }

    /// Release the block at `addr`, checking that it is bound to `owner`.
    ///
    /// An address that does not match a live block of that owner releases
    /// nothing and reports `UnknownBlock`.
    pub fn free(&mut self, addr: BlockAddr, owner: DomainId) -> Result<(), AllocError> {
        let slot = self
            .blocks
            .iter()
            .position(|entry| matches!(entry, Some(info) if info.addr == addr && info.owner == owner))
            .ok_or(AllocError::UnknownBlock)?;
        let info = self.blocks[slot].take().ok_or(AllocError::UnknownBlock)?;

        self.release(&info)?;
        debug!("{}: freed {} byte block at {}", owner, info.len, addr);
        Ok(())
    }

    /// Release every block still bound to `owner`, returning how many
    /// blocks were reclaimed.
    ///
    /// Used when a domain is freed while blocks are still live; their
    /// handles could never authenticate again, so the memory would
    /// otherwise leak.
    pub fn release_owned(&mut self, owner: DomainId) -> usize {
        let mut reclaimed = 0;
        for slot in 0..MAX_BLOCKS {
            let owned = matches!(self.blocks[slot], Some(info) if info.owner == owner);
            if !owned {
                continue;
            }
            if let Some(info) = self.blocks[slot].take() {
                if self.release(&info).is_err() {
                    warn!("{}: failed to reclaim block at {}", owner, info.addr);
                } else {
                    reclaimed += 1;
                }
            }
        }
        reclaimed
    }

    /// Look up the bookkeeping entry for a live block.
    pub(crate) fn block(&self, addr: BlockAddr) -> Option<&BlockInfo> {
        self.blocks
            .iter()
            .flatten()
            .find(|info| info.addr == addr)
    }

    /// Borrow the bytes of a live block.
    pub(crate) fn bytes(&self, addr: BlockAddr) -> Option<&[u8]> {
        let info = self.block(addr)?;
        // SAFETY: `info` describes a block carved from the arena this
        // allocator owns; the block stays live for at least as long as the
        // returned borrow of `self`.
        Some(unsafe { core::slice::from_raw_parts(info.addr.as_usize() as *const u8, info.len) })
    }

    /// Borrow the bytes of a live block mutably.
    pub(crate) fn bytes_mut(&mut self, addr: BlockAddr) -> Option<&mut [u8]> {
        let info = *self.block(addr)?;
        // SAFETY: Same as `bytes`, and the `&mut self` borrow guarantees
        // exclusive access for the lifetime of the slice.
        Some(unsafe { core::slice::from_raw_parts_mut(info.addr.as_usize() as *mut u8, info.len) })
    }

    /// Return a block's memory to the heap.
    fn release(&mut self, info: &BlockInfo) -> Result<(), AllocError> {
        let layout =
            Layout::from_size_align(info.len, PAGE_SIZE).map_err(|_| AllocError::UnknownBlock)?;
        let block =
            NonNull::new(info.addr.as_usize() as *mut u8).ok_or(AllocError::UnknownBlock)?;
        // SAFETY: `block` and `layout` are exactly what `allocate_first_fit`
        // returned when this entry was created.
        unsafe {
            self.heap.deallocate(block, layout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(index: u16) -> DomainId {
        DomainId::new(index).unwrap()
    }

    #[test]
    fn blocks_are_page_aligned_and_zeroed() {
        let mut alloc = ProtectedAllocator::new(4);
        let (addr, len) = alloc.allocate(owner(0), 5).unwrap();
        assert!(addr.is_aligned());
        assert_eq!(len, PAGE_SIZE);
        assert!(alloc.bytes(addr).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn sizes_round_up_to_whole_pages() {
        let mut alloc = ProtectedAllocator::new(4);
        let (_, len) = alloc.allocate(owner(0), PAGE_SIZE + 1).unwrap();
        assert_eq!(len, 2 * PAGE_SIZE);
    }

    #[test]
    fn arena_exhaustion_is_reported() {
        let mut alloc = ProtectedAllocator::new(2);
        let mut allocated = 0;
        let err = loop {
            match alloc.allocate(owner(0), PAGE_SIZE) {
                Ok(_) => allocated += 1,
                Err(err) => break err,
            }
            assert!(allocated <= 4, "arena never ran out");
        };
        assert_eq!(err, AllocError::OutOfMemory);
        assert!(allocated >= 2);
    }

    #[test]
    fn free_requires_matching_owner() {
        let mut alloc = ProtectedAllocator::new(4);
        let (addr, _) = alloc.allocate(owner(0), 16).unwrap();
        assert_eq!(alloc.free(addr, owner(1)), Err(AllocError::UnknownBlock));
        // The block is untouched and can still be freed by its owner.
        assert!(alloc.free(addr, owner(0)).is_ok());
    }

    #[test]
    fn freed_memory_is_reusable() {
        let mut alloc = ProtectedAllocator::new(2);
        let (a, _) = alloc.allocate(owner(0), PAGE_SIZE).unwrap();
        alloc.free(a, owner(0)).unwrap();
        let (b, _) = alloc.allocate(owner(0), PAGE_SIZE).unwrap();
        alloc.free(b, owner(0)).unwrap();
        assert_eq!(alloc.live_blocks(), 0);
    }

    #[test]
    fn release_owned_reclaims_leaked_blocks() {
        let mut alloc = ProtectedAllocator::new(4);
        alloc.allocate(owner(3), 1).unwrap();
        alloc.allocate(owner(3), 1).unwrap();
        alloc.allocate(owner(5), 1).unwrap();

        assert_eq!(alloc.release_owned(owner(3)), 2);
        assert_eq!(alloc.live_blocks(), 1);
        assert_eq!(alloc.release_owned(owner(3)), 0);
    }
}
