//! Entry dispatcher: runs one frame through parse, port filter, classify and emit.

use hijack_common::DEFAULT_PORT;
use network_types::Error;

use crate::{
    classify::{classify, Protocol},
    context::PacketContext,
    emit::{emit, Emit, EventSink},
    parser::parse_udp_packet,
};

/// Read-only settings fixed when the program is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// UDP destination port whose payloads are inspected. Everything else is forwarded untouched.
    pub port: u16,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig { port: DEFAULT_PORT }
    }
}

/// What happens to the frame on the network path. The classifier never drops or redirects.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
}

/// Pipeline states a frame can be skipped from, in the order a frame reaches them. A classified
/// frame always goes on to the emitter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    EthParsed,
    L3Parsed,
    UdpParsed,
    PortMatched,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::EthParsed => "eth_parsed",
            Stage::L3Parsed => "l3_parsed",
            Stage::UdpParsed => "udp_parsed",
            Stage::PortMatched => "port_matched",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The next header could not be parsed.
    Parse(Error),
    /// UDP destination port is not the configured one.
    PortMismatch(u16),
    /// Neither the discovery nor the STUN test matched.
    NoMatch,
}

/// Why a frame left the pipeline without an event. `stage` is the last state it reached.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Skip {
    pub stage: Stage,
    pub reason: SkipReason,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A record with the frame was submitted.
    Captured(Protocol),
    /// A record was submitted but the frame copy failed.
    CaptureFailed,
    /// The frame matched but no record could be reserved.
    ChannelFull,
    Skipped(Skip),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub verdict: Verdict,
    pub outcome: Outcome,
}

impl Dispatch {
    #[inline(always)]
    fn pass(outcome: Outcome) -> Self {
        Dispatch {
            verdict: Verdict::Pass,
            outcome,
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self.outcome, Outcome::Captured(_) | Outcome::CaptureFailed)
    }
}

/// Processes one frame. Single pass, no loops over packet data, and every path ends in
/// [`Verdict::Pass`].
#[inline(always)]
pub fn dispatch<C: PacketContext, S: EventSink>(
    ctx: &C,
    config: &ClassifierConfig,
    sink: &S,
) -> Dispatch {
    let packet = match parse_udp_packet(ctx) {
        Ok(packet) => packet,
        Err(skip) => return Dispatch::pass(Outcome::Skipped(skip)),
    };

    let dst_port = packet.udp.dst_port();
    if dst_port != config.port {
        return Dispatch::pass(Outcome::Skipped(Skip {
            stage: Stage::UdpParsed,
            reason: SkipReason::PortMismatch(dst_port),
        }));
    }

    let Some(protocol) = classify(ctx, packet.payload_off) else {
        return Dispatch::pass(Outcome::Skipped(Skip {
            stage: Stage::PortMatched,
            reason: SkipReason::NoMatch,
        }));
    };

    let outcome = match emit(ctx, sink) {
        Emit::Submitted => Outcome::Captured(protocol),
        Emit::CopyFailed => Outcome::CaptureFailed,
        Emit::ChannelFull => Outcome::ChannelFull,
    };
    Dispatch::pass(outcome)
}
