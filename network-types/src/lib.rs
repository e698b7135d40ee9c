#![no_std]

//! Fixed wire layouts for the headers the hijack classifier walks through.
//!
//! Every header type is `#[repr(C)]` and built only from `u8` and `[u8; N]` fields, so it has an
//! alignment of 1 and every bit pattern is a valid value. That lets a header be read straight out
//! of packet memory once the caller has proven that `offset + LEN <= data_end`. All multi-byte
//! fields are kept in network byte order and decoded through accessor methods.

pub mod eth;
pub mod ip;
pub mod udp;

/// Reasons a header could not be taken from a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The header does not fit in the bytes remaining before `data_end`.
    OutOfBounds,
    /// The header fits but one of its fields is impossible (IHL below 5, UDP length below 8, ...).
    MalformedHeader,
    /// The header is well formed but announces a protocol that is not followed.
    Unsupported,
}

impl Error {
    pub fn as_str(self) -> &'static str {
        match self {
            Error::OutOfBounds => "out of bounds",
            Error::MalformedHeader => "malformed header",
            Error::Unsupported => "unsupported protocol",
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for Error {}
