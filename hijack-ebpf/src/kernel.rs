//! Binds the generic pipeline to the in-kernel types: `XdpContext` for the frame and the
//! `RingBuf` map for events.

use core::{ffi::c_void, mem::MaybeUninit};

use aya_ebpf::{
    bindings::xdp_action,
    helpers::gen,
    maps::{ring_buf::RingBufEntry, RingBuf},
    programs::XdpContext,
};
use hijack_common::CapturedFrame;

use crate::{
    context::{CopyError, PacketContext},
    dispatch::Verdict,
    emit::{EventSink, FrameSlot},
};

impl PacketContext for XdpContext {
    #[inline(always)]
    fn data(&self) -> usize {
        XdpContext::data(self)
    }

    #[inline(always)]
    fn data_end(&self) -> usize {
        XdpContext::data_end(self)
    }

    #[inline(always)]
    fn copy_prefix(&self, dst: &mut [MaybeUninit<u8>]) -> Result<(), CopyError> {
        let ret = unsafe {
            gen::bpf_probe_read_kernel(
                dst.as_mut_ptr().cast::<c_void>(),
                dst.len() as u32,
                XdpContext::data(self) as *const c_void,
            )
        };
        if ret < 0 {
            return Err(CopyError);
        }
        Ok(())
    }
}

impl EventSink for RingBuf {
    type Slot<'a> = RingBufEntry<CapturedFrame>;

    #[inline(always)]
    fn reserve(&self) -> Option<RingBufEntry<CapturedFrame>> {
        RingBuf::reserve::<CapturedFrame>(self, 0)
    }
}

impl FrameSlot for RingBufEntry<CapturedFrame> {
    #[inline(always)]
    fn frame(&mut self) -> &mut MaybeUninit<CapturedFrame> {
        &mut **self
    }

    #[inline(always)]
    fn submit(self) {
        RingBufEntry::submit(self, 0)
    }
}

#[inline(always)]
pub fn xdp_action(verdict: Verdict) -> u32 {
    match verdict {
        Verdict::Pass => xdp_action::XDP_PASS,
    }
}
