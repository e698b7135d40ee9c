use std::{
    collections::HashSet,
    net::IpAddr,
    sync::{PoisonError, RwLock},
};

use pnet::datalink;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Every destination is accepted.
    Any,
    /// A fixed list, never refreshed.
    Fixed,
    /// The addresses of every interface on the host, re-read on refresh.
    Host,
}

/// Set of destination addresses datagrams are delivered for.
///
/// Only [`AddressFilter::accept_all`] accepts every destination. Any other filter with no
/// addresses rejects everything, so a host that loses its addresses stops delivering.
#[derive(Debug)]
pub struct AddressFilter {
    scope: Scope,
    addrs: RwLock<HashSet<IpAddr>>,
}

impl AddressFilter {
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        AddressFilter {
            scope: Scope::Fixed,
            addrs: RwLock::new(addrs.into_iter().map(|a| a.to_canonical()).collect()),
        }
    }

    pub fn accept_all() -> Self {
        AddressFilter {
            scope: Scope::Any,
            addrs: RwLock::new(HashSet::new()),
        }
    }

    /// Filter for the current addresses of every interface on the host.
    pub fn host() -> Self {
        let addrs = host_addresses();
        debug!(
            event.name = "filter.addresses_loaded",
            address.count = addrs.len(),
            "loaded local addresses"
        );
        AddressFilter {
            scope: Scope::Host,
            addrs: RwLock::new(addrs),
        }
    }

    /// An explicit list wins, and an explicitly empty list accepts everything. Without a list
    /// the host's addresses are used.
    pub fn from_config(local_addresses: Option<&[IpAddr]>) -> Self {
        match local_addresses {
            Some([]) => Self::accept_all(),
            Some(addrs) => Self::new(addrs.iter().copied()),
            None => Self::host(),
        }
    }

    pub fn accepts(&self, addr: IpAddr) -> bool {
        match self.scope {
            Scope::Any => true,
            Scope::Fixed | Scope::Host => self
                .addrs
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&addr.to_canonical()),
        }
    }

    pub fn len(&self) -> usize {
        self.addrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-reads the host addresses. Returns the new number of addresses.
    pub fn refresh(&self) -> usize {
        if self.scope != Scope::Host {
            return self.len();
        }
        let fresh = host_addresses();
        let count = fresh.len();
        *self.addrs.write().unwrap_or_else(PoisonError::into_inner) = fresh;

        debug!(
            event.name = "filter.addresses_refreshed",
            address.count = count,
            "refreshed local addresses"
        );
        count
    }
}

fn host_addresses() -> HashSet<IpAddr> {
    datalink::interfaces()
        .iter()
        .flat_map(|iface| iface.ips.iter())
        .map(|net| net.ip().to_canonical())
        .collect()
}
