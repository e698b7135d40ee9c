//! Event emitter: reserve a record, fill it from the frame, submit it.

use core::{cmp, mem::MaybeUninit, ptr::addr_of_mut};

use hijack_common::{CaptureStatus, CapturedFrame, CAPTURE_CAPACITY};

use crate::context::{CopyError, PacketContext};

/// A reserved, not yet published, record in an event channel.
pub trait FrameSlot {
    /// The reserved record. Its content is unspecified until the emitter writes it.
    fn frame(&mut self) -> &mut MaybeUninit<CapturedFrame>;

    /// Publishes the record to consumers.
    fn submit(self);
}

/// A multi-producer channel of [`CapturedFrame`] records with a fixed capacity.
pub trait EventSink {
    type Slot<'a>: FrameSlot
    where
        Self: 'a;

    /// Claims one record, or returns `None` when the channel is full.
    fn reserve(&self) -> Option<Self::Slot<'_>>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Emit {
    /// The frame was copied and the record submitted.
    Submitted,
    /// The record was submitted with `CaptureStatus::CopyFailed`.
    CopyFailed,
    /// No record could be reserved. Nothing was written.
    ChannelFull,
}

/// Copies the frame, from its first byte, into a freshly reserved record.
///
/// `len` is always the full frame length; at most [`CAPTURE_CAPACITY`] bytes are copied. A
/// reserved record is submitted whether or not the copy worked, so capacity is never leaked.
#[inline(always)]
pub fn emit<C: PacketContext, S: EventSink>(ctx: &C, sink: &S) -> Emit {
    let Some(mut slot) = sink.reserve() else {
        return Emit::ChannelFull;
    };

    let len = ctx.len();
    let copy_len = cmp::min(len, CAPTURE_CAPACITY);

    let record = slot.frame().as_mut_ptr();
    // SAFETY: `record` points at a live, exclusively held slot. Every write goes through a raw
    // field pointer, and the byte array is viewed as `MaybeUninit<u8>`, so nothing reads
    // uninitialized memory.
    let copied = unsafe {
        addr_of_mut!((*record).len).write(u32::try_from(len).unwrap_or(u32::MAX));
        addr_of_mut!((*record)._pad).write([0; 3]);
        let packet = &mut *addr_of_mut!((*record).packet)
            .cast::<[MaybeUninit<u8>; CAPTURE_CAPACITY]>();
        match packet.get_mut(..copy_len) {
            Some(dst) => ctx.copy_prefix(dst),
            None => Err(CopyError),
        }
    };

    let status = match copied {
        Ok(()) => CaptureStatus::Complete,
        Err(_) => CaptureStatus::CopyFailed,
    };
    // SAFETY: as above.
    unsafe { addr_of_mut!((*record).status).write(status as u8) };

    slot.submit();

    match status {
        CaptureStatus::Complete => Emit::Submitted,
        CaptureStatus::CopyFailed => Emit::CopyFailed,
    }
}
