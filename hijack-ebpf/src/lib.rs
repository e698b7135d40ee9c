#![cfg_attr(not(test), no_std)]

//! Packet classification core of the hijack XDP program.
//!
//! Everything here is generic over a [`PacketContext`] (where the frame lives) and an
//! [`EventSink`] (where matching frames go), so the exact same parsing and classification code
//! runs in the kernel against an `XdpContext` and a `RingBuf`, and on the host against a byte
//! slice and an in-process ring. Nothing in the hot path loops over packet data or allocates.
//!
//! The per-packet pipeline is:
//!
//! ```text
//! Start -> EthParsed -> L3Parsed -> UdpParsed -> PortMatched -> Classified -> Emitted/Skipped
//! ```
//!
//! and every exit from it forwards the frame unmodified.

pub mod classify;
pub mod context;
pub mod cursor;
pub mod dispatch;
pub mod emit;
pub mod parser;

#[cfg(target_arch = "bpf")]
pub mod kernel;

#[cfg(test)]
mod testing;

pub use classify::Protocol;
pub use context::{CopyError, PacketContext, PacketView};
pub use dispatch::{dispatch, ClassifierConfig, Dispatch, Outcome, Skip, SkipReason, Stage, Verdict};
pub use emit::{emit, Emit, EventSink, FrameSlot};
