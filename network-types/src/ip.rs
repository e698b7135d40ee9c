//! ## IP Headers
//!
//! IPv4 header, which is present after the Ethernet header.
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |ip_ver | h_len |  ip_dscp  |ecn|        ip_total_length        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |       ip_identification       |flags|   ip_fragment_offset    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    ip_ttl     |  ip_protocol  |          ip_checksum          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         source_ipaddr                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      destination_ipaddr                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          ip_options                           |
//! /                              ...                              /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! IPv6 header, which is present after the Ethernet header.
//! ```text
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |ip_ver |  ip_dscp  |ecn|             ip_flow_label             |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |       ip_payload_length       |ip_next_header | ip_hop_limit  |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                         source_ipaddr                         |
//!  +                                                               +
//!  |                      (128 bits in total)                      |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                      destination_ipaddr                       |
//!  +                                                               +
//!  |                      (128 bits in total)                      |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Fixed part of the IPv4 header. Options, if any, follow it and are covered by [`Ipv4Hdr::ihl`].
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ipv4Hdr {
    pub vihl: u8,
    pub dscp_ecn: u8,
    pub tot_len: [u8; 2],
    pub id: [u8; 2],
    pub frag_off: [u8; 2],
    pub ttl: u8,
    pub proto: u8,
    pub check: [u8; 2],
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
}

impl Ipv4Hdr {
    /// The length of the IPv4 header without options.
    pub const LEN: usize = 20;

    /// Returns the IP header length in bytes, options included.
    #[inline]
    pub fn ihl(&self) -> usize {
        ((self.vihl & 0xF) as usize) << 2
    }

    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_addr)
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_addr)
    }
}

/// The fixed 40-byte IPv6 header.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Ipv6Hdr {
    pub vcf: [u8; 4],
    pub payload_len: [u8; 2],
    pub next_hdr: u8,
    pub hop_limit: u8,
    pub src_addr: [u8; 16],
    pub dst_addr: [u8; 16],
}

impl Ipv6Hdr {
    /// The length of the IPv6 header.
    pub const LEN: usize = 40;

    #[inline]
    pub fn src_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.src_addr)
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.dst_addr)
    }
}

/// Either network-layer header, as found after the Ethernet header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IpHdr {
    V4(Ipv4Hdr),
    V6(Ipv6Hdr),
}

impl IpHdr {
    pub fn src_addr(&self) -> IpAddr {
        match self {
            IpHdr::V4(hdr) => IpAddr::V4(hdr.src_addr()),
            IpHdr::V6(hdr) => IpAddr::V6(hdr.src_addr()),
        }
    }

    pub fn dst_addr(&self) -> IpAddr {
        match self {
            IpHdr::V4(hdr) => IpAddr::V4(hdr.dst_addr()),
            IpHdr::V6(hdr) => IpAddr::V6(hdr.dst_addr()),
        }
    }
}

/// Protocol numbers the classifier follows or has to recognise.
/// <https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml>
#[repr(u8)]
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum IpProto {
    /// IPv6 Hop-by-Hop Option
    HopOpt = 0,
    /// Internet Control Message
    Icmp = 1,
    /// Transmission Control
    Tcp = 6,
    /// User Datagram
    Udp = 17,
    /// Routing Header for IPv6
    Ipv6Route = 43,
    /// Fragment Header for IPv6
    Ipv6Frag = 44,
    /// Destination Options for IPv6
    Ipv6Opts = 60,
}
