//! Frame builders and in-memory sinks shared by the unit tests.

#![allow(dead_code)]

use core::{cell::RefCell, mem::MaybeUninit};

use hijack_common::CapturedFrame;
use network_types::{eth::EtherType, ip::IpProto};

use crate::{
    context::{CopyError, PacketContext, PacketView},
    emit::{EventSink, FrameSlot},
};

pub const SRC_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
pub const DST_MAC: [u8; 6] = [0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB];
pub const SRC_IPV4: [u8; 4] = [192, 168, 1, 1];
pub const DST_IPV4: [u8; 4] = [192, 168, 1, 2];
pub const SRC_IPV6: [u8; 16] = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01];
pub const DST_IPV6: [u8; 16] = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x02];
pub const SRC_PORT: u16 = 41641;

pub const STUN_BINDING: [u8; 8] = [0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xA4, 0x42];

// Helper function to create an Ethernet header
pub fn create_eth_header(ether_type: EtherType) -> Vec<u8> {
    let mut packet = Vec::new();
    packet.extend_from_slice(&DST_MAC);
    packet.extend_from_slice(&SRC_MAC);
    packet.extend_from_slice(&u16::from(ether_type).to_be_bytes());
    packet
}

// Helper function to create an 802.1Q/802.1ad tag announcing `inner`
pub fn create_vlan_tag(vid: u16, inner: EtherType) -> Vec<u8> {
    let mut tag = Vec::new();
    tag.extend_from_slice(&(vid & 0x0FFF).to_be_bytes());
    tag.extend_from_slice(&u16::from(inner).to_be_bytes());
    tag
}

// Helper function to create an IPv4 header, optionally with options
pub fn create_ipv4_header(proto: IpProto, options: &[u8], payload_len: usize) -> Vec<u8> {
    assert_eq!(options.len() % 4, 0, "options must be a multiple of 4 bytes");
    let ihl = 5 + options.len() / 4;
    let tot_len = (ihl * 4 + payload_len) as u16;

    let mut packet = Vec::new();
    // Version (4) and IHL
    packet.push(0x40 | ihl as u8);
    // DSCP and ECN
    packet.push(0x00);
    packet.extend_from_slice(&tot_len.to_be_bytes());
    // Identification
    packet.extend_from_slice(&[0x00, 0x00]);
    // Flags (DF) and Fragment Offset
    packet.extend_from_slice(&[0x40, 0x00]);
    // TTL
    packet.push(64);
    packet.push(proto as u8);
    // Header Checksum
    packet.extend_from_slice(&[0x00, 0x00]);
    packet.extend_from_slice(&SRC_IPV4);
    packet.extend_from_slice(&DST_IPV4);
    packet.extend_from_slice(options);
    packet
}

// Helper function to create an IPv6 header
pub fn create_ipv6_header(next_hdr: IpProto, payload_len: usize) -> Vec<u8> {
    let mut packet = Vec::new();
    // Version (6), Traffic Class, Flow Label
    packet.extend_from_slice(&[0x60, 0x00, 0x00, 0x00]);
    packet.extend_from_slice(&(payload_len as u16).to_be_bytes());
    packet.push(next_hdr as u8);
    // Hop Limit
    packet.push(64);
    packet.extend_from_slice(&SRC_IPV6);
    packet.extend_from_slice(&DST_IPV6);
    packet
}

// Helper function to create a UDP header
pub fn create_udp_header(dst_port: u16, payload_len: usize) -> Vec<u8> {
    let mut packet = Vec::new();
    packet.extend_from_slice(&SRC_PORT.to_be_bytes());
    packet.extend_from_slice(&dst_port.to_be_bytes());
    packet.extend_from_slice(&((8 + payload_len) as u16).to_be_bytes());
    // Checksum (unused)
    packet.extend_from_slice(&[0x00, 0x00]);
    packet
}

/// Ethernet + IPv4 + UDP frame carrying `payload` to `dst_port`.
pub fn udp_ipv4_frame(dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = create_eth_header(EtherType::Ipv4);
    frame.extend(create_ipv4_header(IpProto::Udp, &[], 8 + payload.len()));
    frame.extend(create_udp_header(dst_port, payload.len()));
    frame.extend_from_slice(payload);
    frame
}

/// Ethernet + IPv6 + UDP frame carrying `payload` to `dst_port`.
pub fn udp_ipv6_frame(dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = create_eth_header(EtherType::Ipv6);
    frame.extend(create_ipv6_header(IpProto::Udp, 8 + payload.len()));
    frame.extend(create_udp_header(dst_port, payload.len()));
    frame.extend_from_slice(payload);
    frame
}

/// Sink that keeps submitted frames in a `Vec` and refuses reservations past `capacity`.
pub struct VecSink {
    capacity: usize,
    frames: RefCell<Vec<CapturedFrame>>,
}

impl VecSink {
    pub fn new(capacity: usize) -> Self {
        VecSink {
            capacity,
            frames: RefCell::new(Vec::new()),
        }
    }

    pub fn frames(&self) -> Vec<CapturedFrame> {
        self.frames.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.borrow().len()
    }
}

pub struct VecSlot<'a> {
    sink: &'a VecSink,
    frame: Box<MaybeUninit<CapturedFrame>>,
}

impl EventSink for VecSink {
    type Slot<'a> = VecSlot<'a>;

    fn reserve(&self) -> Option<VecSlot<'_>> {
        if self.len() >= self.capacity {
            return None;
        }
        Some(VecSlot {
            sink: self,
            frame: Box::new(MaybeUninit::new(CapturedFrame::zeroed())),
        })
    }
}

impl FrameSlot for VecSlot<'_> {
    fn frame(&mut self) -> &mut MaybeUninit<CapturedFrame> {
        &mut self.frame
    }

    fn submit(self) {
        // SAFETY: the slot starts out zeroed, so every byte is initialized.
        let frame = unsafe { self.frame.assume_init_read() };
        self.sink.frames.borrow_mut().push(frame);
    }
}

/// Wraps a frame so that every copy out of it fails.
pub struct FailingCopy<'a>(pub PacketView<'a>);

impl PacketContext for FailingCopy<'_> {
    fn data(&self) -> usize {
        self.0.data()
    }

    fn data_end(&self) -> usize {
        self.0.data_end()
    }

    fn copy_prefix(&self, _dst: &mut [MaybeUninit<u8>]) -> Result<(), CopyError> {
        Err(CopyError)
    }
}
