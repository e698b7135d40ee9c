use std::{collections::BTreeMap, sync::Arc};

use hijack_ebpf::ClassifierConfig;
use pnet::datalink;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::HijackError,
    loader::{Attachment, LoadOptions},
    ring::EventRing,
    runtime::conf::{Conf, ReceiverMode},
    source::{
        decode::Datagram,
        filter::AddressFilter,
        rawsock::{drain, RawSocket, RawSocketCapture},
        ringbuf::RingBufReader,
    },
};

/// An interface the classifier is attached to, and the task reading its ring.
struct Link {
    attachment: Attachment,
    reader: JoinHandle<()>,
}

/// Where the XDP receiver attaches.
struct XdpPlan {
    template: LoadOptions,
    all_interfaces: bool,
}

/// Delivers captured disco and STUN datagrams addressed to this host.
///
/// Datagrams are buffered in a bounded channel; when the caller falls behind, new ones are
/// dropped rather than queued. With XDP every attached interface feeds the same channel.
pub struct Receiver {
    rx: mpsc::Receiver<Datagram>,
    tx: mpsc::Sender<Datagram>,
    filter: Arc<AddressFilter>,
    tasks: Vec<JoinHandle<()>>,
    plan: Option<XdpPlan>,
    links: BTreeMap<String, Link>,
}

impl Receiver {
    /// Starts the receiver selected by `conf.mode`. Must be called from within a tokio runtime.
    pub fn start(conf: &Conf) -> Result<Self, HijackError> {
        let filter = Arc::new(AddressFilter::from_config(conf.local_addresses.as_deref()));

        match conf.mode {
            ReceiverMode::Xdp => Self::xdp(conf, filter),
            ReceiverMode::RawSocket => Self::raw_socket(conf, filter),
        }
    }

    fn xdp(conf: &Conf, filter: Arc<AddressFilter>) -> Result<Self, HijackError> {
        let (tx, rx) = mpsc::channel(conf.channel_capacity);
        let mut receiver = Receiver {
            rx,
            tx,
            filter,
            tasks: Vec::new(),
            plan: Some(XdpPlan {
                template: LoadOptions {
                    interface: conf.interface.clone(),
                    port: conf.port,
                    ring_byte_size: conf.ring_byte_size,
                    xdp_mode: conf.xdp_mode,
                },
                all_interfaces: conf.all_interfaces,
            }),
            links: BTreeMap::new(),
        };

        if conf.all_interfaces {
            if receiver.attach_untracked() == 0 {
                return Err(HijackError::NoInterfaceAttached);
            }
        } else {
            receiver.attach(&conf.interface)?;
        }
        Ok(receiver)
    }

    fn raw_socket(conf: &Conf, filter: Arc<AddressFilter>) -> Result<Self, HijackError> {
        let socket = RawSocket::bind(&conf.interface)?;
        let ring = Arc::new(EventRing::with_byte_size(conf.ring_byte_size));
        let notify = Arc::new(Notify::new());

        let capture = RawSocketCapture::new(
            socket,
            ClassifierConfig { port: conf.port },
            Arc::clone(&ring),
            Arc::clone(&notify),
        )?;

        let mut receiver = Self::hosted(ring, notify, filter, conf.channel_capacity);
        receiver.tasks.push(tokio::spawn(capture.run()));
        Ok(receiver)
    }

    /// A receiver fed by an in-process ring. Whoever classifies into `ring` signals `notify`.
    pub fn hosted(
        ring: Arc<EventRing>,
        notify: Arc<Notify>,
        filter: Arc<AddressFilter>,
        channel_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let drainer = tokio::spawn(drain(ring, notify, Arc::clone(&filter), tx.clone()));

        Receiver {
            rx,
            tx,
            filter,
            tasks: vec![drainer],
            plan: None,
            links: BTreeMap::new(),
        }
    }

    /// Attaches the classifier to `interface` and starts reading its ring into the shared
    /// channel.
    fn attach(&mut self, interface: &str) -> Result<(), HijackError> {
        let Some(plan) = &self.plan else {
            return Ok(());
        };
        let opts = LoadOptions {
            interface: interface.to_string(),
            ..plan.template.clone()
        };

        let mut attachment = Attachment::load(&opts)?;
        let ring_buf = attachment.take_events()?;
        let reader = RingBufReader::new(
            interface.to_string(),
            ring_buf,
            Arc::clone(&self.filter),
            self.tx.clone(),
        );

        self.links.insert(
            interface.to_string(),
            Link {
                attachment,
                reader: tokio::spawn(reader.run()),
            },
        );
        Ok(())
    }

    /// Attaches to every host interface that has no link yet. Interfaces that refuse the
    /// program are skipped and tried again on the next call. Returns how many were attached.
    fn attach_untracked(&mut self) -> usize {
        let available = datalink::interfaces().into_iter().map(|iface| iface.name);
        let mut attached = 0;

        for interface in untracked(&self.links, available) {
            match self.attach(&interface) {
                Ok(()) => attached += 1,
                Err(e) => debug!(
                    event.name = "receiver.attach_skipped",
                    network.interface.name = %interface,
                    error = %e,
                    "could not attach to interface"
                ),
            }
        }
        attached
    }

    /// Drops links whose reader stopped or whose program is gone, so they can be attached again.
    fn prune_links(&mut self) {
        let dead: Vec<String> = self
            .links
            .iter()
            .filter(|(_, link)| {
                link.reader.is_finished() || link.attachment.health_check().is_err()
            })
            .map(|(interface, _)| interface.clone())
            .collect();

        for interface in dead {
            if let Some(link) = self.links.remove(&interface) {
                link.reader.abort();
                info!(
                    event.name = "receiver.link_dropped",
                    network.interface.name = %interface,
                    "interface no longer captured"
                );
            }
        }
    }

    /// Interfaces the classifier is currently attached to.
    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }

    /// Waits for the next datagram. `None` once the receiver is closed and drained.
    pub async fn recv(&mut self) -> Option<Datagram> {
        self.rx.recv().await
    }

    /// Reloads the local address set. When attached to every interface, also drops dead links
    /// and attaches to interfaces that appeared since the last refresh. Returns the number of
    /// local addresses.
    pub fn refresh(&mut self) -> usize {
        let addresses = self.filter.refresh();

        if self.plan.as_ref().is_some_and(|plan| plan.all_interfaces) {
            self.prune_links();
            let attached = self.attach_untracked();
            if attached > 0 {
                info!(
                    event.name = "receiver.interfaces_attached",
                    network.interface.count = attached,
                    "attached to new interfaces"
                );
            }
        }
        addresses
    }

    /// Whether the XDP program is still attached everywhere. Always healthy for the hosted
    /// receivers.
    pub fn health_check(&self) -> Result<(), HijackError> {
        self.links
            .values()
            .try_for_each(|link| link.attachment.health_check())
    }

    /// Stops the capture tasks and detaches the program. Datagrams already buffered can still be
    /// read with [`Receiver::recv`].
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.rx.close();

        for (interface, mut link) in std::mem::take(&mut self.links) {
            link.reader.abort();
            if let Err(e) = link.attachment.detach() {
                warn!(
                    event.name = "receiver.detach_failed",
                    network.interface.name = %interface,
                    error = %e,
                    "failed to detach xdp program, it is released on drop"
                );
            }
        }
        info!(event.name = "receiver.closed", "receiver closed");
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        for link in self.links.values() {
            link.reader.abort();
        }
    }
}

/// Names from `available` with no entry in `tracked`, each listed once.
fn untracked<V>(
    tracked: &BTreeMap<String, V>,
    available: impl IntoIterator<Item = String>,
) -> Vec<String> {
    let mut names: Vec<String> = available
        .into_iter()
        .filter(|name| !tracked.contains_key(name))
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use hijack_ebpf::Protocol;

    use super::*;
    use crate::source::{
        decode::tests::{ipv4_frame, STUN_BINDING},
        rawsock::classify_into,
    };

    fn hosted(capacity: usize, filter: AddressFilter) -> (Receiver, Arc<EventRing>, Arc<Notify>) {
        let ring = Arc::new(EventRing::new(64));
        let notify = Arc::new(Notify::new());
        let receiver = Receiver::hosted(
            Arc::clone(&ring),
            Arc::clone(&notify),
            Arc::new(filter),
            capacity,
        );
        (receiver, ring, notify)
    }

    #[tokio::test]
    async fn test_recv_returns_classified_datagrams() {
        let (mut receiver, ring, notify) = hosted(10, AddressFilter::accept_all());
        let config = ClassifierConfig::default();

        classify_into(&ipv4_frame(63455, &STUN_BINDING), &config, &ring, &notify);
        // not on the inspected port
        classify_into(&ipv4_frame(3478, &STUN_BINDING), &config, &ring, &notify);
        classify_into(&ipv4_frame(63455, &[0x80, 0x01]), &config, &ring, &notify);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.kind, Protocol::Stun);
        assert_eq!(first.payload, STUN_BINDING);

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.kind, Protocol::Disco);
        assert_eq!(second.dst.port(), 63455);
    }

    #[tokio::test]
    async fn test_filter_drops_foreign_destination() {
        let filter = AddressFilter::new([IpAddr::V4(Ipv4Addr::new(10, 9, 9, 9))]);
        let (mut receiver, ring, notify) = hosted(10, filter);
        let config = ClassifierConfig::default();

        classify_into(&ipv4_frame(63455, &[0x80]), &config, &ring, &notify);
        tokio::task::yield_now().await;
        receiver.close();

        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_full_channel_drops_newest() {
        let (mut receiver, ring, notify) = hosted(1, AddressFilter::accept_all());
        let config = ClassifierConfig::default();

        classify_into(&ipv4_frame(63455, &[0x80, 1]), &config, &ring, &notify);
        classify_into(&ipv4_frame(63455, &[0x80, 2]), &config, &ring, &notify);

        // the drain task empties the ring in one pass; only the first fits in the channel
        while !ring.is_empty() {
            tokio::task::yield_now().await;
        }
        receiver.close();

        assert_eq!(receiver.recv().await.unwrap().payload, vec![0x80, 1]);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_ends_recv() {
        let (mut receiver, _ring, _notify) = hosted(4, AddressFilter::accept_all());
        receiver.close();
        assert!(receiver.recv().await.is_none());
        assert!(receiver.health_check().is_ok());
    }

    #[tokio::test]
    async fn test_refresh_of_hosted_receiver_keeps_addresses() {
        let filter = AddressFilter::new([IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        let (mut receiver, _ring, _notify) = hosted(4, filter);
        assert_eq!(receiver.refresh(), 1);
        assert_eq!(receiver.interfaces().count(), 0);
    }

    #[test]
    fn test_untracked_skips_attached_interfaces() {
        let tracked: BTreeMap<String, ()> = [("eth0".to_string(), ())].into_iter().collect();
        let available = ["lo", "eth0", "tailscale0", "lo"].map(String::from);

        assert_eq!(
            untracked(&tracked, available),
            vec!["lo".to_string(), "tailscale0".to_string()]
        );
        assert!(untracked(&tracked, ["eth0".to_string()]).is_empty());
    }

    #[tokio::test]
    async fn test_start_on_every_interface_attaches_or_reports_none() {
        let conf = Conf {
            all_interfaces: true,
            local_addresses: Some(Vec::new()),
            ..Conf::default()
        };

        match Receiver::start(&conf) {
            Ok(mut receiver) => {
                assert!(receiver.interfaces().count() > 0);
                receiver.close();
                assert_eq!(receiver.interfaces().count(), 0);
            }
            Err(e) => assert!(matches!(e, HijackError::NoInterfaceAttached), "{e}"),
        }
    }

    #[tokio::test]
    async fn test_start_on_unknown_interface_fails() {
        let conf = Conf {
            interface: "hijack-nope0".to_string(),
            local_addresses: Some(Vec::new()),
            ..Conf::default()
        };

        assert!(matches!(
            Receiver::start(&conf),
            Err(HijackError::InterfaceNotFound(_) | HijackError::MissingObject)
        ));
    }
}
