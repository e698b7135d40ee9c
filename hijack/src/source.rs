//! Sources of captured frames and the shared path that turns a record into a delivered
//! [`Datagram`].

use hijack_common::CapturedFrame;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::source::{
    decode::{decode_frame, Datagram, DecodeError},
    filter::AddressFilter,
};

pub mod decode;
pub mod filter;
pub mod rawsock;
pub mod ringbuf;

/// What happened to one record on its way to the receiver channel.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The destination address is not local.
    Filtered,
    Undecodable(DecodeError),
    /// The channel was full and the datagram was dropped.
    ChannelFull,
    /// The receiving side is gone.
    Closed,
}

/// Decodes `frame`, applies the address filter and offers the datagram to `tx` without waiting.
pub fn deliver(
    frame: &CapturedFrame,
    filter: &AddressFilter,
    tx: &mpsc::Sender<Datagram>,
) -> Delivery {
    let datagram = match decode_frame(frame) {
        Ok(datagram) => datagram,
        Err(e) => {
            debug!(
                event.name = "source.frame_undecodable",
                frame.len = frame.len,
                error = %e,
                "dropping captured frame"
            );
            return Delivery::Undecodable(e);
        }
    };

    if !filter.accepts(datagram.dst.ip()) {
        trace!(
            event.name = "source.datagram_filtered",
            destination.address = %datagram.dst.ip(),
            "destination is not a local address"
        );
        return Delivery::Filtered;
    }

    match tx.try_send(datagram) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(datagram)) => {
            debug!(
                event.name = "source.channel_full",
                source.address = %datagram.src,
                datagram.kind = datagram.kind.as_str(),
                "receiver channel full, dropping datagram"
            );
            Delivery::ChannelFull
        }
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}
