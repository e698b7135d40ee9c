#![no_std]

/// UDP destination port inspected when nothing else is configured.
pub const DEFAULT_PORT: u16 = 63455;

/// Number of frame bytes an event can carry. Longer frames are truncated to this size.
pub const CAPTURE_CAPACITY: usize = 2048;

/// Byte size of the `EVENTS` ring buffer (16 MiB).
pub const DEFAULT_RING_BYTE_SIZE: u32 = 1 << 24;

/// STUN magic cookie (RFC 5389), found at bytes 4..8 of every STUN message.
pub const STUN_MAGIC_COOKIE: u32 = 0x2112_A442;

/// Outcome of copying the frame into a [`CapturedFrame`].
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CaptureStatus {
    /// `packet` holds the first `min(len, CAPTURE_CAPACITY)` bytes of the frame.
    #[default]
    Complete = 0,
    /// The copy helper failed; `packet` content is undefined, `len` is still accurate.
    CopyFailed = 1,
}

impl TryFrom<u8> for CaptureStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CaptureStatus::Complete),
            1 => Ok(CaptureStatus::CopyFailed),
            other => Err(other),
        }
    }
}

/// One captured frame, as written into the event ring by the classifier.
///
/// The layout is shared with the consumer byte for byte, so it is `#[repr(C)]` with explicit
/// padding and no implicit holes.
///
/// ```text
/// offset  size  field
///      0     4  len      total frame length (data_end - data), native endian
///      4     1  status   CaptureStatus
///      5     3  _pad
///      8  2048  packet   frame prefix, starting at the Ethernet header
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedFrame {
    pub len: u32,
    pub status: u8,
    pub _pad: [u8; 3],
    pub packet: [u8; CAPTURE_CAPACITY],
}

impl CapturedFrame {
    pub const LEN: usize = core::mem::size_of::<CapturedFrame>();

    pub const fn zeroed() -> Self {
        CapturedFrame {
            len: 0,
            status: CaptureStatus::Complete as u8,
            _pad: [0; 3],
            packet: [0; CAPTURE_CAPACITY],
        }
    }

    /// Builds a record from a frame the same way the classifier does.
    pub fn from_frame(frame: &[u8]) -> Self {
        let mut record = Self::zeroed();
        record.len = frame.len() as u32;
        let n = record.captured_len();
        record.packet[..n].copy_from_slice(&frame[..n]);
        record
    }

    #[inline]
    pub fn status(&self) -> Result<CaptureStatus, u8> {
        CaptureStatus::try_from(self.status)
    }

    #[inline]
    pub fn copy_failed(&self) -> bool {
        self.status != CaptureStatus::Complete as u8
    }

    /// Whether the frame was longer than the record can hold.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.len as usize > CAPTURE_CAPACITY
    }

    /// Number of valid bytes at the start of `packet`.
    #[inline]
    pub fn captured_len(&self) -> usize {
        core::cmp::min(self.len as usize, CAPTURE_CAPACITY)
    }

    /// The valid prefix of the frame, or `None` if the copy failed.
    pub fn bytes(&self) -> Option<&[u8]> {
        if self.copy_failed() {
            return None;
        }
        self.packet.get(..self.captured_len())
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for CapturedFrame {}

#[cfg(test)]
mod tests {
    use core::mem::{align_of, size_of};

    use super::*;

    #[test]
    fn test_captured_frame_layout() {
        let expected_size = 4 + 1 + 3 + CAPTURE_CAPACITY;
        let actual_size = size_of::<CapturedFrame>();

        assert_eq!(
            actual_size, expected_size,
            "Size of CapturedFrame should be {expected_size} bytes, but was {actual_size} bytes"
        );
        assert_eq!(CapturedFrame::LEN, expected_size);
        assert_eq!(align_of::<CapturedFrame>(), 4);
        assert_eq!(core::mem::offset_of!(CapturedFrame, packet), 8);
    }

    #[test]
    fn test_short_frame_is_fully_captured() {
        let frame = [0xABu8; 100];
        let record = CapturedFrame::from_frame(&frame);

        assert_eq!(record.len, 100);
        assert!(!record.is_truncated());
        assert_eq!(record.captured_len(), 100);
        assert_eq!(record.bytes(), Some(&frame[..]));
        assert_eq!(record.status(), Ok(CaptureStatus::Complete));
    }

    #[test]
    fn test_long_frame_is_truncated() {
        let mut frame = [0u8; 4096];
        for (i, b) in frame.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let record = CapturedFrame::from_frame(&frame);

        assert_eq!(record.len, 4096);
        assert!(record.is_truncated());
        assert_eq!(record.captured_len(), CAPTURE_CAPACITY);
        assert_eq!(record.bytes(), Some(&frame[..CAPTURE_CAPACITY]));
    }

    #[test]
    fn test_copy_failed_hides_bytes_but_keeps_len() {
        let mut record = CapturedFrame::from_frame(&[1, 2, 3]);
        record.status = CaptureStatus::CopyFailed as u8;

        assert!(record.copy_failed());
        assert_eq!(record.len, 3);
        assert_eq!(record.bytes(), None);
    }

    #[test]
    fn test_capture_status_try_from() {
        assert_eq!(CaptureStatus::try_from(0), Ok(CaptureStatus::Complete));
        assert_eq!(CaptureStatus::try_from(1), Ok(CaptureStatus::CopyFailed));
        assert_eq!(CaptureStatus::try_from(7), Err(7));

        let mut record = CapturedFrame::zeroed();
        record.status = 7;
        assert_eq!(record.status(), Err(7));
        assert!(record.copy_failed());
    }

    #[test]
    fn test_stun_cookie_network_order() {
        assert_eq!(STUN_MAGIC_COOKIE.to_be_bytes(), [0x21, 0x12, 0xA4, 0x42]);
    }
}
