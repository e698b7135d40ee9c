#![cfg_attr(target_arch = "bpf", no_std)]
#![cfg_attr(target_arch = "bpf", no_main)]

#[cfg(not(target_arch = "bpf"))]
fn main() {}

#[cfg(target_arch = "bpf")]
use aya_ebpf::{
    macros::{map, xdp},
    maps::RingBuf,
    programs::XdpContext,
};
#[cfg(target_arch = "bpf")]
use aya_log_ebpf::debug;
#[cfg(target_arch = "bpf")]
use hijack_common::{DEFAULT_PORT, DEFAULT_RING_BYTE_SIZE};
#[cfg(target_arch = "bpf")]
use hijack_ebpf::{dispatch, kernel, ClassifierConfig, Dispatch, Outcome};

/// UDP destination port to inspect. The loader rewrites it with `EbpfLoader::set_global`.
#[cfg(target_arch = "bpf")]
#[no_mangle]
static PORT: u16 = DEFAULT_PORT;

/// Captured frames. The loader may resize it with `EbpfLoader::set_max_entries`.
#[cfg(target_arch = "bpf")]
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(DEFAULT_RING_BYTE_SIZE, 0);

#[cfg(target_arch = "bpf")]
#[xdp]
pub fn hijack(ctx: XdpContext) -> u32 {
    // volatile, otherwise the default value is folded in at compile time
    let port = unsafe { core::ptr::read_volatile(&PORT) };

    let Dispatch { verdict, outcome } = dispatch(&ctx, &ClassifierConfig { port }, &EVENTS);

    match outcome {
        Outcome::Captured(protocol) => debug!(
            &ctx,
            "hijack: captured {} frame, {} bytes",
            protocol.as_str(),
            (ctx.data_end() - ctx.data()) as u32
        ),
        Outcome::CaptureFailed => debug!(&ctx, "hijack: frame copy failed, record flagged"),
        Outcome::ChannelFull => debug!(&ctx, "hijack: event ring full, frame not captured"),
        Outcome::Skipped(_) => {}
    }

    kernel::xdp_action(verdict)
}

#[cfg(target_arch = "bpf")]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[cfg(target_arch = "bpf")]
#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
