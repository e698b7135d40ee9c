//! UDP header, which is present after the IP header.
//!
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |          Source Port          |       Destination Port        |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |          PDU Length           |           Checksum            |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                             data                              |
//!  /                              ...                              /
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! This struct represents the User Datagram Protocol (UDP) header as defined in RFC 768.
//! The UDP header is 8 bytes long and contains source and destination ports, length, and checksum fields.
//! All fields are stored in network byte order (big-endian).

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UdpHdr {
    pub src: [u8; 2],
    pub dst: [u8; 2],
    pub len: [u8; 2],
    pub check: [u8; 2],
}

impl UdpHdr {
    pub const LEN: usize = 8;

    /// Returns the source port number in host byte order.
    #[inline]
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.src)
    }

    /// Returns the destination port number in host byte order.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes(self.dst)
    }

    /// Length of the payload announced by the header, or `None` when the length field is
    /// smaller than the header itself.
    ///
    /// The length field covers both the UDP header (8 bytes) and the payload.
    #[inline]
    pub fn payload_len(&self) -> Option<usize> {
        (u16::from_be_bytes(self.len) as usize).checked_sub(Self::LEN)
    }
}
