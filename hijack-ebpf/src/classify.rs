//! Stateless payload predicates.
//!
//! Both tests take the offset of the UDP payload and check their own length requirement against
//! `data_end`, independently of whatever the parsers already verified.

use hijack_common::STUN_MAGIC_COOKIE;

use crate::{context::PacketContext, cursor::HdrCursor};

/// Bit that marks a peer-discovery packet type in the first payload byte.
pub const DISCO_TYPE_BIT: u8 = 0x80;

/// Offset of the magic cookie inside a STUN header.
pub const STUN_COOKIE_OFFSET: usize = 4;

/// Application protocol a captured frame was recognised as.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Protocol {
    Disco = 1,
    Stun = 2,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Disco => "disco",
            Protocol::Stun => "stun",
        }
    }
}

#[inline(always)]
fn payload_cursor<C: PacketContext>(ctx: &C, payload_off: usize) -> Option<HdrCursor> {
    let mut cursor = HdrCursor::new();
    cursor.advance(ctx, payload_off).ok()?;
    Some(cursor)
}

/// At least one payload byte, with the top bit set.
#[inline(always)]
pub fn is_disco_packet<C: PacketContext>(ctx: &C, payload_off: usize) -> bool {
    let Some(cursor) = payload_cursor(ctx, payload_off) else {
        return false;
    };
    match cursor.load::<C, u8>(ctx) {
        Ok(first) => first & DISCO_TYPE_BIT != 0,
        Err(_) => false,
    }
}

/// At least eight payload bytes, with bytes 4..8 equal to the STUN magic cookie in network order.
#[inline(always)]
pub fn is_stun_packet<C: PacketContext>(ctx: &C, payload_off: usize) -> bool {
    let Some(cursor) = payload_cursor(ctx, payload_off) else {
        return false;
    };
    // Loading the 8-byte prefix proves the whole STUN header start is present.
    match cursor.load::<C, [u8; 8]>(ctx) {
        Ok(head) => {
            let cookie = [
                head[STUN_COOKIE_OFFSET],
                head[STUN_COOKIE_OFFSET + 1],
                head[STUN_COOKIE_OFFSET + 2],
                head[STUN_COOKIE_OFFSET + 3],
            ];
            u32::from_be_bytes(cookie) == STUN_MAGIC_COOKIE
        }
        Err(_) => false,
    }
}

/// Runs both tests. When both match, the frame is reported as [`Protocol::Disco`].
#[inline(always)]
pub fn classify<C: PacketContext>(ctx: &C, payload_off: usize) -> Option<Protocol> {
    if is_disco_packet(ctx, payload_off) {
        Some(Protocol::Disco)
    } else if is_stun_packet(ctx, payload_off) {
        Some(Protocol::Stun)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::context::PacketView;

    #[test]
    fn test_disco_needs_top_bit() {
        let payload = [0x80u8];
        assert!(is_disco_packet(&PacketView::new(&payload), 0));

        let payload = [0x7Fu8, 0xFF];
        assert!(!is_disco_packet(&PacketView::new(&payload), 0));
    }

    #[test]
    fn test_disco_needs_one_byte() {
        let payload = [0xFFu8; 4];
        // payload starts exactly at data_end
        assert!(!is_disco_packet(&PacketView::new(&payload), 4));
        // payload offset past data_end
        assert!(!is_disco_packet(&PacketView::new(&payload), 5));
        assert!(is_disco_packet(&PacketView::new(&payload), 3));
    }

    #[test]
    fn test_stun_cookie() {
        let payload = [0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xA4, 0x42];
        assert!(is_stun_packet(&PacketView::new(&payload), 0));

        let wrong = [0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xA4, 0x43];
        assert!(!is_stun_packet(&PacketView::new(&wrong), 0));

        // byte-swapped cookie must not match
        let swapped = [0x00, 0x01, 0x00, 0x00, 0x42, 0xA4, 0x12, 0x21];
        assert!(!is_stun_packet(&PacketView::new(&swapped), 0));
    }

    #[test]
    fn test_stun_needs_eight_bytes() {
        let payload = [0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xA4, 0x42];
        for available in 0..payload.len() {
            assert!(!is_stun_packet(&PacketView::new(&payload[..available]), 0));
        }
    }

    #[test]
    fn test_classify_prefers_disco() {
        let both = [0x80, 0x00, 0x00, 0x00, 0x21, 0x12, 0xA4, 0x42];
        assert_eq!(classify(&PacketView::new(&both), 0), Some(Protocol::Disco));

        let stun = [0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xA4, 0x42];
        assert_eq!(classify(&PacketView::new(&stun), 0), Some(Protocol::Stun));

        let neither = [0x00u8; 8];
        assert_eq!(classify(&PacketView::new(&neither), 0), None);
    }

    #[test]
    fn test_disco_matches_any_payload_with_top_bit() {
        proptest!(|(first in 0x80u8..=0xFF, rest in proptest::collection::vec(any::<u8>(), 0..64))| {
            let mut payload = vec![first];
            payload.extend(rest);
            prop_assert!(is_disco_packet(&PacketView::new(&payload), 0));
        });
    }

    #[test]
    fn test_stun_matches_independent_of_disco() {
        proptest!(|(prefix in any::<[u8; 4]>(), tail in proptest::collection::vec(any::<u8>(), 0..64))| {
            let mut payload = prefix.to_vec();
            payload.extend_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
            payload.extend(tail);
            prop_assert!(is_stun_packet(&PacketView::new(&payload), 0));
            prop_assert!(classify(&PacketView::new(&payload), 0).is_some());
        });
    }
}
