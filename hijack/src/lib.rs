//! Userspace side of hijack: loads the XDP classifier, drains its event ring and hands decoded
//! disco and STUN datagrams to the caller. A raw-socket receiver runs the same classifier in
//! process where XDP is unavailable.

pub mod error;
pub mod loader;
pub mod receiver;
pub mod ring;
pub mod runtime;
pub mod source;

pub use error::HijackError;
pub use receiver::Receiver;
pub use ring::EventRing;
pub use source::{decode::Datagram, filter::AddressFilter};
