//! Fallback receiver that classifies frames in process.
//!
//! An `AF_PACKET` socket bound to the interface sees every frame. Each one goes through the same
//! `dispatch` the XDP program runs, with an [`EventRing`] in place of the kernel ring, and a
//! drain task forwards what was captured.

use std::{
    io, mem,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    sync::Arc,
};

use hijack_ebpf::{dispatch, ClassifierConfig, Outcome, PacketView};
use tokio::{
    io::unix::AsyncFd,
    sync::{mpsc, Notify},
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    error::HijackError,
    loader::if_index,
    ring::EventRing,
    source::{decode::Datagram, deliver, filter::AddressFilter, Delivery},
};

/// Large enough for any frame the interface can hand over without GRO.
const RECV_BUFFER_LEN: usize = 1 << 16;

/// A non-blocking `AF_PACKET` socket receiving every protocol on one interface.
#[derive(Debug)]
pub struct RawSocket {
    fd: OwnedFd,
    interface: String,
}

impl RawSocket {
    pub fn bind(interface: &str) -> Result<Self, HijackError> {
        let ifindex = if_index(interface)?;
        let protocol = (libc::ETH_P_ALL as u16).to_be();

        // SAFETY: plain syscall, the result is checked before use.
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                protocol as libc::c_int,
            )
        };
        if fd < 0 {
            return Err(HijackError::last_os_error("opening AF_PACKET socket"));
        }
        // SAFETY: `fd` was just returned by socket(2) and is owned by nothing else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        // SAFETY: sockaddr_ll is plain data and all-zero is a valid value.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = protocol;
        addr.sll_ifindex = ifindex as i32;

        // SAFETY: `addr` outlives the call and the length matches its type.
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&addr as *const libc::sockaddr_ll).cast(),
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(HijackError::last_os_error("binding AF_PACKET socket"));
        }

        Ok(RawSocket {
            fd,
            interface: interface.to_string(),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Reads one frame into `buf`. Returns the frame's real length, which can exceed
    /// `buf.len()`, and its packet type.
    fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, u8)> {
        // SAFETY: zeroed sockaddr_ll is valid and is filled in by the kernel.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        let mut addr_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;

        // SAFETY: `buf` and `addr` are valid for writes of the lengths passed.
        let n = unsafe {
            libc::recvfrom(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                libc::MSG_TRUNC,
                (&mut addr as *mut libc::sockaddr_ll).cast(),
                &mut addr_len,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((n as usize, addr.sll_pkttype))
    }
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Runs one frame through the classifier into `ring` and wakes the drain task on capture.
pub fn classify_into(
    frame: &[u8],
    config: &ClassifierConfig,
    ring: &EventRing,
    notify: &Notify,
) -> Outcome {
    let outcome = dispatch(&PacketView::new(frame), config, ring).outcome;
    match outcome {
        Outcome::Captured(protocol) => {
            trace!(
                event.name = "rawsock.frame_captured",
                datagram.kind = protocol.as_str(),
                frame.len = frame.len(),
                "captured frame"
            );
            notify.notify_one();
        }
        Outcome::CaptureFailed => notify.notify_one(),
        Outcome::ChannelFull => debug!(
            event.name = "rawsock.ring_full",
            "event ring full, frame not captured"
        ),
        Outcome::Skipped(_) => {}
    }
    outcome
}

/// Reads frames from a [`RawSocket`] and classifies them into an [`EventRing`].
pub struct RawSocketCapture {
    socket: AsyncFd<RawSocket>,
    config: ClassifierConfig,
    ring: Arc<EventRing>,
    notify: Arc<Notify>,
}

impl RawSocketCapture {
    /// Must be called from within a tokio runtime.
    pub fn new(
        socket: RawSocket,
        config: ClassifierConfig,
        ring: Arc<EventRing>,
        notify: Arc<Notify>,
    ) -> Result<Self, HijackError> {
        let socket = AsyncFd::new(socket).map_err(HijackError::io("registering raw socket"))?;
        Ok(RawSocketCapture {
            socket,
            config,
            ring,
            notify,
        })
    }

    pub async fn run(self) {
        info!(
            event.name = "rawsock.capture_started",
            network.interface.name = %self.socket.get_ref().interface(),
            udp.port = self.config.port,
            "classifying frames from raw socket"
        );
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        loop {
            let mut guard = match self.socket.readable().await {
                Ok(guard) => guard,
                Err(e) => {
                    error!(
                        event.name = "rawsock.wait_failed",
                        error = %e,
                        "error waiting for raw socket readability"
                    );
                    return;
                }
            };

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf)) {
                Ok(Ok((_, libc::PACKET_OUTGOING))) => {}
                Ok(Ok((len, _))) => {
                    let frame = &buf[..len.min(buf.len())];
                    classify_into(frame, &self.config, &self.ring, &self.notify);
                }
                Ok(Err(e)) => warn!(
                    event.name = "rawsock.recv_failed",
                    error = %e,
                    "failed to read from raw socket"
                ),
                Err(_would_block) => continue,
            }
        }
    }
}

/// Forwards everything in `ring` to `tx`, then waits for `notify`. Returns once the receiving
/// side of `tx` is gone.
pub async fn drain(
    ring: Arc<EventRing>,
    notify: Arc<Notify>,
    filter: Arc<AddressFilter>,
    tx: mpsc::Sender<Datagram>,
) {
    loop {
        while let Some(frame) = ring.pop() {
            if deliver(&frame, &filter, &tx) == Delivery::Closed {
                return;
            }
        }
        tokio::select! {
            _ = notify.notified() => {}
            _ = tx.closed() => return,
        }
    }
}
