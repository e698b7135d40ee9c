/// Ethernet header structure that appears at the beginning of every Ethernet frame.
///
/// This structure represents the standard IEEE 802.3 Ethernet header format.
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
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EthHdr {
    pub dst_addr: [u8; 6],
    pub src_addr: [u8; 6],
    /// EtherType in network byte order.
    pub ether_type: [u8; 2],
}

impl EthHdr {
    /// The length of the Ethernet header.
    pub const LEN: usize = 14;
}

/// 802.1Q / 802.1ad tag that sits between the MAC addresses and the real EtherType.
///
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  | PCP |D|         VLAN ID       |        inner eth_type         |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///
/// The tag protocol identifier (0x8100 / 0x88A8) is the `ether_type` of the header in front of
/// this one, so only the TCI and the next EtherType are part of this layout.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VlanHdr {
    pub tci: [u8; 2],
    pub ether_type: [u8; 2],
}

impl VlanHdr {
    pub const LEN: usize = 4;
}

/// Protocol which is encapsulated in the payload of the Ethernet frame.
/// These values represent the standard IEEE assigned protocol numbers in host byte order.
#[repr(u16)]
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    Ieee8021q = 0x8100,
    Ipv6 = 0x86DD,
    Ieee8021ad = 0x88A8,
}

// This allows converting a host-order u16 value into an EtherType enum variant.
impl TryFrom<u16> for EtherType {
    type Error = u16; // Return the unknown value itself as the error

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0800 => Ok(EtherType::Ipv4),
            0x0806 => Ok(EtherType::Arp),
            0x8100 => Ok(EtherType::Ieee8021q),
            0x86DD => Ok(EtherType::Ipv6),
            0x88A8 => Ok(EtherType::Ieee8021ad),
            _ => Err(value),
        }
    }
}

impl From<EtherType> for u16 {
    fn from(ether_type: EtherType) -> Self {
        ether_type as u16
    }
}

impl EtherType {
    /// Whether this EtherType announces a VLAN tag rather than a payload protocol.
    #[inline]
    pub fn is_vlan(self) -> bool {
        matches!(self, EtherType::Ieee8021q | EtherType::Ieee8021ad)
    }
}
