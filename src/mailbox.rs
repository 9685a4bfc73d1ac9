//! Single-Slot Message Mailbox
//!
//! The in-process consumer of the isolation primitive: one protection
//! domain, one current message block, one signed handle. Writing replaces
//! the block; reading authenticates the handle and copies the message out.
//! This is the whole call contract a device-style front end needs; device
//! nodes and file semantics are out of scope.
//!
//! # Invariants
//! - The mailbox never holds a raw address, only the current handle
//! - A failed write leaves the previous message fully readable
//! - Authentication failures are reported as faults, never as empty data

use log::debug;

use crate::context::IsolationContext;
use crate::domain::DomainId;
use crate::handle::{ContextToken, SignedHandle};
use crate::mem::PAGE_SIZE;
use crate::Fault;

/// A single-slot message store bound to one protection domain.
pub struct Mailbox {
    /// Domain all message blocks are bound to.
    domain: DomainId,
    /// Context every handle is signed under.
    token: ContextToken,
    /// Handle to the current message block, if any.
    current: Option<SignedHandle>,
    /// Length of the current message in bytes.
    message_len: usize,
}

impl Mailbox {
    /// Open a mailbox, allocating its protection domain.
    ///
    /// Domain exhaustion is fatal to the open; no partial mailbox exists
    /// afterwards.
    pub fn open(ctx: &mut IsolationContext, token: ContextToken) -> Result<Self, Fault> {
        let domain = ctx.allocate_domain()?;
        debug!("mailbox opened on {}", domain);
        Ok(Self {
            domain,
            token,
            current: None,
            message_len: 0,
        })
    }

    /// Domain this mailbox writes into.
    #[inline]
    pub fn domain(&self) -> DomainId {
        self.domain
    }

    /// Length of the stored message, zero if none.
    #[inline]
    pub fn message_len(&self) -> usize {
        self.message_len
    }

    /// Store `payload` as the current message.
    ///
    /// The previous block, if any, is authenticated and freed first; a
    /// stale or tampered prior handle aborts the write with the old
    /// message intact. The payload is copied under the domain's elevated
    /// view, bounded to one page; the stored length is returned.
    pub fn write(&mut self, ctx: &mut IsolationContext, payload: &[u8]) -> Result<usize, Fault> {
        let handle = ctx.replace(self.current.as_ref(), self.token, self.domain, PAGE_SIZE)?;
        // The previous block is gone; until the copy lands the slot holds a
        // fresh zeroed block with no message in it.
        self.current = Some(handle);
        self.message_len = 0;

        let written = ctx.write_block(&handle, self.token, self.domain, payload)?;
        self.message_len = written;
        Ok(written)
    }

    /// Copy the current message into `out`, returning the number of bytes.
    ///
    /// Exactly the stored message length is returned, with no residual
    /// block bytes past it. A mailbox that was never written reads zero
    /// bytes; a handle that fails authentication is a fault.
    pub fn read(&self, ctx: &IsolationContext, out: &mut [u8]) -> Result<usize, Fault> {
        let handle = match &self.current {
            Some(handle) => handle,
            None => return Ok(0),
        };

        let wanted = self.message_len.min(out.len());
        let copied = ctx.read_block(handle, self.token, self.domain, &mut out[..wanted])?;
        Ok(copied)
    }

    /// Tear the mailbox down: free the current block, then the domain.
    pub fn close(self, ctx: &mut IsolationContext) -> Result<(), Fault> {
        if let Some(handle) = &self.current {
            ctx.free(handle, self.token, self.domain)?;
        }
        ctx.free_domain(self.domain)?;
        debug!("mailbox closed on {}", self.domain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::AuthError;
    use crate::mem::AllocError;

    const TOKEN: ContextToken = ContextToken::new(0x1157);

    fn context() -> IsolationContext {
        IsolationContext::new([0x42; 32], 8)
    }

    #[test]
    fn hello_round_trip() {
        let mut ctx = context();
        let mut mailbox = Mailbox::open(&mut ctx, TOKEN).unwrap();

        assert_eq!(mailbox.write(&mut ctx, b"hello").unwrap(), 5);

        let mut out = [0u8; 32];
        let read = mailbox.read(&ctx, &mut out).unwrap();
        assert_eq!(read, 5);
        assert_eq!(&out[..read], b"hello");
        // No residual bytes past the message length.
        assert!(out[read..].iter().all(|&b| b == 0));
    }

    #[test]
    fn wrong_context_read_is_a_fault_not_empty() {
        let mut ctx = context();
        let mut mailbox = Mailbox::open(&mut ctx, TOKEN).unwrap();
        mailbox.write(&mut ctx, b"hello").unwrap();

        // Same domain and handle, different calling context.
        let intruder = Mailbox {
            domain: mailbox.domain,
            token: ContextToken::new(0xBAD),
            current: mailbox.current,
            message_len: mailbox.message_len,
        };

        let mut out = [0u8; 8];
        assert!(matches!(
            intruder.read(&ctx, &mut out),
            Err(Fault::Auth(AuthError::ContextMismatch))
        ));
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn rewrite_replaces_the_message() {
        let mut ctx = context();
        let mut mailbox = Mailbox::open(&mut ctx, TOKEN).unwrap();

        mailbox.write(&mut ctx, b"first message").unwrap();
        mailbox.write(&mut ctx, b"second").unwrap();

        let mut out = [0u8; 32];
        let read = mailbox.read(&ctx, &mut out).unwrap();
        assert_eq!(&out[..read], b"second");
        // Only the current block is live; the first was freed on replace.
        assert_eq!(ctx.live_blocks(), 1);
    }

    #[test]
    fn unwritten_mailbox_reads_empty() {
        let mut ctx = context();
        let mailbox = Mailbox::open(&mut ctx, TOKEN).unwrap();

        let mut out = [0u8; 8];
        assert_eq!(mailbox.read(&ctx, &mut out).unwrap(), 0);
    }

    #[test]
    fn oversized_message_is_truncated_to_one_page() {
        let mut ctx = context();
        let mut mailbox = Mailbox::open(&mut ctx, TOKEN).unwrap();

        let oversized = vec![b'x'; PAGE_SIZE + 100];
        assert_eq!(mailbox.write(&mut ctx, &oversized).unwrap(), PAGE_SIZE);
        assert_eq!(mailbox.message_len(), PAGE_SIZE);
    }

    #[test]
    fn close_releases_block_and_domain() {
        let mut ctx = context();
        let mut mailbox = Mailbox::open(&mut ctx, TOKEN).unwrap();
        mailbox.write(&mut ctx, b"bye").unwrap();

        let domain = mailbox.domain();
        let handle = mailbox.current.unwrap();
        mailbox.close(&mut ctx).unwrap();

        // The domain slot is free again and the old handle is dead.
        assert_eq!(ctx.allocate_domain().unwrap(), domain);
        assert!(matches!(
            ctx.read_block(&handle, TOKEN, domain, &mut [0u8; 4]),
            Err(Fault::Auth(_)) | Err(Fault::Alloc(AllocError::UnknownBlock))
        ));
    }
}
