//! Layer parsers for Ethernet, IPv4, IPv6 and UDP.
//!
//! Each parser reads its header through the [`HdrCursor`], which checks the header against
//! `data_end` before touching it. On success the cursor sits on the first byte of the next layer.
//! Parsers never look ahead and never guess at a partial header.

use network_types::{
    eth::{EthHdr, EtherType, VlanHdr},
    ip::{IpHdr, IpProto, Ipv4Hdr, Ipv6Hdr},
    udp::UdpHdr,
    Error,
};

use crate::{
    context::PacketContext,
    cursor::HdrCursor,
    dispatch::{Skip, SkipReason, Stage},
};

/// Stacked VLAN tags skipped in front of the network header (802.1ad outer + 802.1Q inner).
pub const MAX_VLAN_TAGS: usize = 2;

/// Parses the Ethernet header and any VLAN tags, and returns the network-layer EtherType.
/// Only IPv4 and IPv6 are returned; any other EtherType is [`Error::Unsupported`].
///
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                     destination_mac_addr                      |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  | destination_mac_addr (con't)  |        source_mac_addr        |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                    source_mac_addr (con't)                    |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |           eth_type            |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[inline(always)]
pub fn parse_ethernet<C: PacketContext>(
    ctx: &C,
    cursor: &mut HdrCursor,
) -> Result<EtherType, Error> {
    let eth: EthHdr = cursor.take(ctx)?;

    // Unrolled, one step per tag in MAX_VLAN_TAGS.
    let ether_type = skip_vlan_tag(ctx, cursor, eth.ether_type)?;
    let ether_type = skip_vlan_tag(ctx, cursor, ether_type)?;

    match EtherType::try_from(u16::from_be_bytes(ether_type)) {
        Ok(EtherType::Ipv4) => Ok(EtherType::Ipv4),
        Ok(EtherType::Ipv6) => Ok(EtherType::Ipv6),
        _ => Err(Error::Unsupported),
    }
}

#[inline(always)]
fn skip_vlan_tag<C: PacketContext>(
    ctx: &C,
    cursor: &mut HdrCursor,
    ether_type: [u8; 2],
) -> Result<[u8; 2], Error> {
    match EtherType::try_from(u16::from_be_bytes(ether_type)) {
        Ok(t) if t.is_vlan() => {
            let tag: VlanHdr = cursor.take(ctx)?;
            Ok(tag.ether_type)
        }
        _ => Ok(ether_type),
    }
}

/// Parses an IPv4 header, options included, and moves the cursor past it.
///
/// The header length comes from the IHL field. The version nibble is not checked, the EtherType
/// already selected this parser. Only UDP continues; every other protocol is
/// [`Error::Unsupported`]. Fragments are not reassembled.
#[inline(always)]
pub fn parse_ipv4<C: PacketContext>(ctx: &C, cursor: &mut HdrCursor) -> Result<Ipv4Hdr, Error> {
    let hdr: Ipv4Hdr = cursor.load(ctx)?;

    let ihl = hdr.ihl();
    if ihl < Ipv4Hdr::LEN {
        return Err(Error::MalformedHeader);
    }
    cursor.advance(ctx, ihl)?;

    if hdr.proto != IpProto::Udp as u8 {
        return Err(Error::Unsupported);
    }
    Ok(hdr)
}

/// Parses the fixed IPv6 header. The next header must be UDP; extension header chains are not
/// walked, so UDP behind a hop-by-hop, routing, fragment or destination options header is
/// [`Error::Unsupported`].
#[inline(always)]
pub fn parse_ipv6<C: PacketContext>(ctx: &C, cursor: &mut HdrCursor) -> Result<Ipv6Hdr, Error> {
    let hdr: Ipv6Hdr = cursor.take(ctx)?;

    if hdr.next_hdr != IpProto::Udp as u8 {
        return Err(Error::Unsupported);
    }
    Ok(hdr)
}

/// Parses the UDP header. A length field shorter than the header itself is
/// [`Error::MalformedHeader`].
#[inline(always)]
pub fn parse_udp<C: PacketContext>(ctx: &C, cursor: &mut HdrCursor) -> Result<UdpHdr, Error> {
    let hdr: UdpHdr = cursor.take(ctx)?;

    if hdr.payload_len().is_none() {
        return Err(Error::MalformedHeader);
    }
    Ok(hdr)
}

/// Headers of a frame that made it through Ethernet, IP and UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpPacket {
    pub ip: IpHdr,
    pub udp: UdpHdr,
    /// Offset of the UDP payload from the start of the frame.
    pub payload_off: usize,
}

/// Runs the layer parsers in order. On failure the returned [`Skip`] records the last stage the
/// frame reached and why it went no further.
#[inline(always)]
pub fn parse_udp_packet<C: PacketContext>(ctx: &C) -> Result<UdpPacket, Skip> {
    let mut cursor = HdrCursor::new();

    let ether_type =
        parse_ethernet(ctx, &mut cursor).map_err(|e| Skip::parse(Stage::Start, e))?;

    let ip = match ether_type {
        EtherType::Ipv4 => parse_ipv4(ctx, &mut cursor).map(IpHdr::V4),
        _ => parse_ipv6(ctx, &mut cursor).map(IpHdr::V6),
    }
    .map_err(|e| Skip::parse(Stage::EthParsed, e))?;

    let udp = parse_udp(ctx, &mut cursor).map_err(|e| Skip::parse(Stage::L3Parsed, e))?;

    Ok(UdpPacket {
        ip,
        udp,
        payload_off: cursor.pos(),
    })
}

impl Skip {
    #[inline(always)]
    fn parse(stage: Stage, error: Error) -> Self {
        Skip {
            stage,
            reason: SkipReason::Parse(error),
        }
    }
}
