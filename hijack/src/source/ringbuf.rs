//! Consumer for the kernel event ring.

use std::{mem::size_of, os::fd::AsRawFd, sync::Arc};

use aya::maps::{MapData, RingBuf};
use hijack_common::CapturedFrame;
use tokio::{io::unix::AsyncFd, sync::mpsc};
use tracing::{error, info, warn};

use crate::source::{decode::Datagram, deliver, filter::AddressFilter, Delivery};

/// Reads records from the kernel ring buffer and forwards them as datagrams.
///
/// Waiting is event-driven through `AsyncFd`; every wakeup drains all available records.
pub struct RingBufReader {
    interface: String,
    ring_buf: RingBuf<MapData>,
    filter: Arc<AddressFilter>,
    tx: mpsc::Sender<Datagram>,
}

impl RingBufReader {
    pub fn new(
        interface: String,
        ring_buf: RingBuf<MapData>,
        filter: Arc<AddressFilter>,
        tx: mpsc::Sender<Datagram>,
    ) -> Self {
        Self {
            interface,
            ring_buf,
            filter,
            tx,
        }
    }

    /// Runs until the receiving side of the channel is dropped or the fd fails.
    pub async fn run(mut self) {
        info!(
            event.name = "ringbuf.reader_started",
            network.interface.name = %self.interface,
            "reading captured frames from ring buffer"
        );

        let async_fd = match AsyncFd::new(self.ring_buf.as_raw_fd()) {
            Ok(fd) => fd,
            Err(e) => {
                error!(
                    event.name = "ringbuf.asyncfd_failed",
                    network.interface.name = %self.interface,
                    error = %e,
                    "failed to create AsyncFd for ring buffer"
                );
                return;
            }
        };

        loop {
            let mut guard = match async_fd.readable().await {
                Ok(guard) => guard,
                Err(e) => {
                    error!(
                        event.name = "ringbuf.wait_failed",
                        network.interface.name = %self.interface,
                        error = %e,
                        "error waiting for ring buffer readability"
                    );
                    return;
                }
            };

            while let Some(bytes) = self.ring_buf.next() {
                if bytes.len() < size_of::<CapturedFrame>() {
                    warn!(
                        event.name = "ringbuf.short_record",
                        got = bytes.len(),
                        expected = size_of::<CapturedFrame>(),
                        "ring buffer record too short for CapturedFrame"
                    );
                    continue;
                }

                // SAFETY: the length was checked above and CapturedFrame is repr(C) plain data
                // written by the classifier with this exact layout.
                let frame: CapturedFrame =
                    unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const CapturedFrame) };
                drop(bytes);

                if deliver(&frame, &self.filter, &self.tx) == Delivery::Closed {
                    info!(
                        event.name = "ringbuf.reader_stopped",
                        network.interface.name = %self.interface,
                        "receiver closed, stopping ring buffer reader"
                    );
                    return;
                }
            }

            guard.clear_ready();
        }
    }
}
