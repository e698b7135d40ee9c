use core::mem;

use network_types::{
    eth::{EthHdr, VlanHdr},
    ip::{Ipv4Hdr, Ipv6Hdr},
    udp::UdpHdr,
    Error,
};

use crate::context::PacketContext;

/// Types that may be read straight out of packet memory.
///
/// # Safety
///
/// Implementors must be valid for every bit pattern and have an alignment of 1.
pub unsafe trait Plain: Copy {}

unsafe impl Plain for u8 {}
unsafe impl<const N: usize> Plain for [u8; N] {}
unsafe impl Plain for EthHdr {}
unsafe impl Plain for VlanHdr {}
unsafe impl Plain for Ipv4Hdr {}
unsafe impl Plain for Ipv6Hdr {}
unsafe impl Plain for UdpHdr {}

/// Returns a pointer to a `T` at `offset` bytes into the frame, only if all of it lies before
/// `data_end`.
#[inline(always)]
fn ptr_at<C: PacketContext, T: Plain>(ctx: &C, offset: usize) -> Result<*const T, Error> {
    let start = ctx.data();
    let end = ctx.data_end();
    let len = mem::size_of::<T>();

    if start + offset + len > end {
        return Err(Error::OutOfBounds);
    }

    Ok((start + offset) as *const T)
}

/// Read position into the frame, owned by one packet's walk through the pipeline.
///
/// The position only ever moves forward, and only to offsets that are inside the frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HdrCursor {
    pos: usize,
}

impl HdrCursor {
    pub const fn new() -> Self {
        HdrCursor { pos: 0 }
    }

    #[inline(always)]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Reads a `T` at the current position without moving.
    #[inline(always)]
    pub fn load<C: PacketContext, T: Plain>(&self, ctx: &C) -> Result<T, Error> {
        self.load_at(ctx, 0)
    }

    /// Reads a `T` at `offset` bytes past the current position without moving.
    #[inline(always)]
    pub fn load_at<C: PacketContext, T: Plain>(&self, ctx: &C, offset: usize) -> Result<T, Error> {
        let ptr = ptr_at::<C, T>(ctx, self.pos + offset)?;
        // SAFETY: `ptr_at` checked that the whole `T` is inside the frame, and `T: Plain` has no
        // alignment or validity requirements.
        Ok(unsafe { ptr.read_unaligned() })
    }

    /// Moves the position forward by `n` bytes. Fails, leaving the position untouched, if that
    /// would pass the end of the frame.
    #[inline(always)]
    pub fn advance<C: PacketContext>(&mut self, ctx: &C, n: usize) -> Result<(), Error> {
        if self.pos + n > ctx.len() {
            return Err(Error::OutOfBounds);
        }
        self.pos += n;
        Ok(())
    }

    /// Reads a `T` at the current position and moves past it.
    #[inline(always)]
    pub fn take<C: PacketContext, T: Plain>(&mut self, ctx: &C) -> Result<T, Error> {
        let value = self.load::<C, T>(ctx)?;
        self.advance(ctx, mem::size_of::<T>())?;
        Ok(value)
    }
}
