//! In-process event ring used when frames are classified in userspace.
//!
//! A bounded queue of [`CapturedFrame`] records with the same reserve, fill, submit protocol as
//! the kernel `RingBuf`, so the classifier's emitter writes into either one unchanged. Reserving
//! claims capacity up front and the record is only pushed onto the queue when it is submitted,
//! so consumers never see a record that is still being written.

use std::{
    mem::MaybeUninit,
    sync::atomic::{AtomicUsize, Ordering},
};

use crossbeam::queue::ArrayQueue;
use hijack_common::{CapturedFrame, DEFAULT_RING_BYTE_SIZE};
use hijack_ebpf::{EventSink, FrameSlot};

/// Per-record header the kernel ring buffer puts in front of each sample.
const RECORD_HEADER_LEN: usize = 8;

/// Bytes one record occupies in a ring of the kernel's layout.
pub const fn record_stride() -> usize {
    (CapturedFrame::LEN + RECORD_HEADER_LEN + 7) & !7
}

pub struct EventRing {
    queue: ArrayQueue<CapturedFrame>,
    /// Records reserved and not yet popped. Never exceeds the queue's capacity, so a push of a
    /// reserved record always has room.
    reserved: AtomicUsize,
}

impl EventRing {
    /// Creates a ring holding `capacity` records.
    ///
    /// # Panics
    ///
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "event ring capacity must be non-zero");
        EventRing {
            queue: ArrayQueue::new(capacity),
            reserved: AtomicUsize::new(0),
        }
    }

    /// Creates a ring that holds as many records as a kernel ring buffer of `byte_size` bytes.
    pub fn with_byte_size(byte_size: u32) -> Self {
        Self::new((byte_size as usize / record_stride()).max(1))
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Records reserved but not yet popped. Only a snapshot under concurrent use.
    pub fn len(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claims capacity for one record, or `None` if the ring is full.
    pub fn try_reserve(&self) -> Option<RingSlot<'_>> {
        let capacity = self.capacity();
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .ok()?;

        Some(RingSlot {
            ring: self,
            frame: MaybeUninit::new(CapturedFrame::zeroed()),
            submitted: false,
        })
    }

    /// Removes the oldest submitted record.
    pub fn pop(&self) -> Option<CapturedFrame> {
        let frame = self.queue.pop()?;
        self.release();
        Some(frame)
    }

    fn release(&self) {
        self.reserved.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for EventRing {
    fn default() -> Self {
        Self::with_byte_size(DEFAULT_RING_BYTE_SIZE)
    }
}

impl std::fmt::Debug for EventRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRing")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// A reserved record. Submitting queues it; dropping it unsubmitted gives the capacity back.
pub struct RingSlot<'a> {
    ring: &'a EventRing,
    frame: MaybeUninit<CapturedFrame>,
    submitted: bool,
}

impl FrameSlot for RingSlot<'_> {
    fn frame(&mut self) -> &mut MaybeUninit<CapturedFrame> {
        &mut self.frame
    }

    fn submit(mut self) {
        // SAFETY: the slot starts out as a zeroed record, and `CapturedFrame` is plain data, so
        // whatever the emitter wrote over it leaves it initialized.
        let frame = unsafe { self.frame.assume_init_read() };
        self.submitted = self.ring.queue.push(frame).is_ok();
    }
}

impl Drop for RingSlot<'_> {
    fn drop(&mut self) {
        if !self.submitted {
            self.ring.release();
        }
    }
}

impl EventSink for EventRing {
    type Slot<'a> = RingSlot<'a>;

    fn reserve(&self) -> Option<RingSlot<'_>> {
        self.try_reserve()
    }
}
