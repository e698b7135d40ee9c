//! Turns captured frames back into addressed datagrams.

use std::net::SocketAddr;

use hijack_common::CapturedFrame;
use hijack_ebpf::{
    classify::classify,
    parser::{parse_udp_packet, UdpPacket},
    PacketView, Protocol, Skip,
};
use thiserror::Error;

/// A disco or STUN datagram addressed to this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub kind: Protocol,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame copy failed in the classifier")]
    CopyFailed,

    #[error("frame of {0} bytes is longer than the capture buffer")]
    Truncated(u32),

    #[error("frame stopped parsing after {stage}: {reason:?}", stage = .0.stage.as_str(), reason = .0.reason)]
    Malformed(Skip),

    #[error("payload is neither disco nor stun")]
    Unclassified,
}

/// Decodes a record from the event ring. Records whose copy failed and frames that did not fit
/// in the record are rejected, since their payload is incomplete.
pub fn decode_frame(frame: &CapturedFrame) -> Result<Datagram, DecodeError> {
    if frame.is_truncated() {
        return Err(DecodeError::Truncated(frame.len));
    }
    let bytes = frame.bytes().ok_or(DecodeError::CopyFailed)?;
    decode_bytes(bytes)
}

/// Decodes a complete Ethernet frame. The payload ends where the UDP length field says it does,
/// which drops any link-layer padding.
pub fn decode_bytes(bytes: &[u8]) -> Result<Datagram, DecodeError> {
    let ctx = PacketView::new(bytes);
    let UdpPacket {
        ip,
        udp,
        payload_off,
    } = parse_udp_packet(&ctx).map_err(DecodeError::Malformed)?;

    let kind = classify(&ctx, payload_off).ok_or(DecodeError::Unclassified)?;

    let declared = udp.payload_len().unwrap_or(0);
    let end = payload_off.saturating_add(declared).min(bytes.len());

    Ok(Datagram {
        src: SocketAddr::new(ip.src_addr(), udp.src_port()),
        dst: SocketAddr::new(ip.dst_addr(), udp.dst_port()),
        kind,
        payload: bytes[payload_off..end].to_vec(),
    })
}
