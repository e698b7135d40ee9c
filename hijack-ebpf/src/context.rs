use core::{fmt, marker::PhantomData, mem::MaybeUninit, ptr};

/// The byte range of one received frame, `[data, data_end)`.
///
/// Addresses are plain integers so the bounds checks read the same way the kernel verifier wants
/// them: `data + offset + size <= data_end`.
pub trait PacketContext {
    fn data(&self) -> usize;

    fn data_end(&self) -> usize;

    /// Copies the first `dst.len()` bytes of the frame into `dst`.
    ///
    /// Callers never ask for more than [`len`](Self::len) bytes. The copy itself may still fail
    /// in the kernel, where it goes through `bpf_probe_read_kernel`.
    fn copy_prefix(&self, dst: &mut [MaybeUninit<u8>]) -> Result<(), CopyError>;

    /// Total frame length.
    #[inline(always)]
    fn len(&self) -> usize {
        self.data_end().saturating_sub(self.data())
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The frame could not be copied out of packet memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyError;

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to copy frame")
    }
}

impl core::error::Error for CopyError {}

/// A frame held in ordinary memory, used by the raw-socket receiver, the frame decoder and tests.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    start: usize,
    end: usize,
    _bytes: PhantomData<&'a [u8]>,
}

impl<'a> PacketView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        let start = bytes.as_ptr() as usize;
        PacketView {
            start,
            end: start + bytes.len(),
            _bytes: PhantomData,
        }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        // SAFETY: start/end were taken from a live `&'a [u8]` in `new`.
        unsafe { core::slice::from_raw_parts(self.start as *const u8, self.end - self.start) }
    }
}

impl<'a> From<&'a [u8]> for PacketView<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        PacketView::new(bytes)
    }
}

impl PacketContext for PacketView<'_> {
    #[inline(always)]
    fn data(&self) -> usize {
        self.start
    }

    #[inline(always)]
    fn data_end(&self) -> usize {
        self.end
    }

    fn copy_prefix(&self, dst: &mut [MaybeUninit<u8>]) -> Result<(), CopyError> {
        let src = self.as_bytes().get(..dst.len()).ok_or(CopyError)?;
        // SAFETY: both ranges are `dst.len()` bytes long and cannot overlap, since `dst` is
        // exclusively borrowed.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), dst.as_mut_ptr().cast::<u8>(), dst.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_bounds() {
        let bytes = [1u8, 2, 3, 4, 5];
        let view = PacketView::new(&bytes);

        assert_eq!(view.len(), 5);
        assert_eq!(view.data_end() - view.data(), 5);
        assert_eq!(view.as_bytes(), &bytes);
        assert!(!view.is_empty());
        assert!(PacketView::new(&[]).is_empty());
    }

    #[test]
    fn test_copy_prefix() {
        let bytes = [9u8, 8, 7, 6];
        let view = PacketView::from(&bytes[..]);

        let mut dst = [MaybeUninit::<u8>::uninit(); 3];
        view.copy_prefix(&mut dst).unwrap();
        let copied: [u8; 3] = dst.map(|b| unsafe { b.assume_init() });
        assert_eq!(copied, [9, 8, 7]);
    }

    #[test]
    fn test_copy_prefix_longer_than_frame_fails() {
        let bytes = [1u8, 2];
        let view = PacketView::new(&bytes);

        let mut dst = [MaybeUninit::<u8>::uninit(); 3];
        assert_eq!(view.copy_prefix(&mut dst), Err(CopyError));
    }
}
