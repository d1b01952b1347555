//! Applies link and address messages to the interface table.

use std::net::IpAddr;

use super::{
    ConnectedAddress, IFINDEX_INTERNAL, InterfaceTable, Notification, NotificationSink,
    normalize_hwaddr,
};
use crate::netlink::messages::{AddressMessage, LinkMessage};
use crate::netlink::pump::{Change, RtHandler};
use crate::netlink::types::{family, ifa_flags, iff};
use crate::netlink::{Error, Result};

/// Message handler that keeps an [`InterfaceTable`] in step with the kernel
/// and reports lifecycle changes to a [`NotificationSink`].
#[derive(Debug)]
pub struct Reconciler<S> {
    table: InterfaceTable,
    sink: S,
    link_detect: bool,
}

impl<S: NotificationSink> Reconciler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            table: InterfaceTable::new(),
            sink,
            link_detect: false,
        }
    }

    /// Require a carrier (IFF_RUNNING) as well as IFF_UP for an interface to
    /// count as operative.
    pub fn with_link_detect(mut self, link_detect: bool) -> Self {
        self.link_detect = link_detect;
        self
    }

    pub fn link_detect(&self) -> bool {
        self.link_detect
    }

    pub fn table(&self) -> &InterfaceTable {
        &self.table
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn emit(&mut self, notification: Notification) {
        tracing::info!(event = notification.name(), "{}", notification);
        self.sink.notify(notification);
    }

    /// Retire whichever interface other than `name` holds `index`.
    fn displace(&mut self, index: u32, name: &str) {
        let old = match self.table.by_index(index) {
            Some(holder) if holder.name != name => holder.name.clone(),
            _ => return,
        };
        let Some(before) = self.table.deactivate(&old) else {
            return;
        };

        tracing::debug!(
            ifindex = index,
            "interface index {} was renamed from {} to {}",
            index,
            old,
            name
        );
        if before.is_operative(self.link_detect) {
            tracing::error!(
                ifindex = index,
                "interface rename detected on up interface: index {} was renamed from {} to {}, results are uncertain!",
                index,
                old,
                name
            );
        }

        if let Some(after) = self.table.get(&old).cloned() {
            self.emit(Notification::InterfaceDeleted(after));
        }
    }

    fn new_link(&mut self, link: &LinkMessage<'_>) -> Result<()> {
        if link.is_wireless_noop() {
            tracing::debug!(ifindex = link.header().ifi_index, "ignoring wireless event");
            return Ok(());
        }

        let name = link
            .name()?
            .ok_or_else(|| Error::InvalidMessage("link message without IFLA_IFNAME".into()))?;
        let index = link.index()?;
        if index == IFINDEX_INTERNAL {
            tracing::error!(
                ifname = name,
                "netlink is setting interface {} ifindex to reserved internal value {}",
                name,
                IFINDEX_INTERNAL
            );
            return Err(Error::ReservedIndex {
                name: name.to_string(),
            });
        }
        let flags = link.flags() & iff::KEPT;
        let mtu = link.mtu()?;
        let hardware_address = link.hardware_address();

        self.displace(index, name);

        let link_detect = self.link_detect;
        let iface = self.table.entry(name);
        let was_active = iface.active;
        let was_operative = was_active && iface.is_operative(link_detect);
        if was_active && iface.index != index {
            tracing::debug!(
                ifname = name,
                "interface index changed from {} to {}",
                iface.index,
                index
            );
        }

        iface.flags = flags;
        if let Some(mtu) = mtu {
            iface.mtu = mtu;
        }
        // Absent IFLA_ADDRESS leaves the known address alone.
        if hardware_address.is_some() {
            iface.hardware_address = normalize_hwaddr(name, hardware_address);
        }
        if !was_active {
            iface.metric = 1;
        }
        self.table.bind(name, index);

        let Some(iface) = self.table.get(name).cloned() else {
            return Ok(());
        };
        let operative = iface.is_operative(link_detect);

        tracing::debug!(
            ifname = name,
            ifindex = index,
            mtu = iface.mtu,
            flags = %iff::describe(iface.flags),
            "RTM_NEWLINK"
        );

        if !was_active {
            self.emit(Notification::InterfaceAdded(iface.clone()));
            if operative {
                self.emit(Notification::InterfaceUp(iface));
            }
        } else if was_operative && !operative {
            self.emit(Notification::InterfaceDown(iface));
        } else if !was_operative && operative {
            self.emit(Notification::InterfaceUp(iface));
        }
        Ok(())
    }

    fn del_link(&mut self, link: &LinkMessage<'_>) -> Result<()> {
        let name = match link.name()? {
            Some(name) => name.to_string(),
            None => match self.table.by_index(link.index()?) {
                Some(iface) => iface.name.clone(),
                None => {
                    tracing::warn!(
                        ifindex = link.header().ifi_index,
                        "unnamed interface is deleted but can't find"
                    );
                    return Ok(());
                }
            },
        };

        let Some(iface) = self.table.get(&name) else {
            tracing::warn!(ifname = %name, "interface {} is deleted but can't find", name);
            return Ok(());
        };
        if !iface.active {
            tracing::debug!(ifname = %name, "interface {} is already inactive", name);
            return Ok(());
        }

        self.table.deactivate(&name);
        if let Some(after) = self.table.get(&name).cloned() {
            self.emit(Notification::InterfaceDeleted(after));
        }
        Ok(())
    }

    fn address(&mut self, change: Change, addr: &AddressMessage<'_>) -> Result<()> {
        let af = addr.family();
        if af != family::AF_INET && af != family::AF_INET6 {
            tracing::debug!(family = af, "ignoring address of unsupported family");
            return Ok(());
        }

        let index = addr.index();
        let ifname = match self.table.by_index(index) {
            Some(iface) => iface.name.clone(),
            None => {
                tracing::error!(
                    ifindex = index,
                    "can't find interface by index {}",
                    index
                );
                return Err(Error::UnknownInterface { index });
            }
        };

        let max_prefix = if af == family::AF_INET { 32 } else { 128 };
        if addr.prefix_len() > max_prefix {
            return Err(Error::InvalidMessage(format!(
                "prefix length {} out of range",
                addr.prefix_len()
            )));
        }

        let local_raw = addr
            .local()
            .or(addr.address())
            .ok_or_else(|| Error::InvalidMessage("address message without local address".into()))?;

        // A distinct IFA_ADDRESS is the remote end of a point-to-point link.
        let (destination_raw, peer) = match (addr.local(), addr.address()) {
            (Some(local), Some(address)) if local != address => (Some(address), true),
            _ => (addr.broadcast(), false),
        };

        let local = ip_from(af, local_raw)?;
        let destination = destination_raw.map(|raw| ip_from(af, raw)).transpose()?;
        let label = addr
            .label()?
            .filter(|label| *label != ifname)
            .map(str::to_string);

        let connected = ConnectedAddress {
            ifindex: index,
            ifname,
            local,
            prefix_len: addr.prefix_len(),
            destination,
            secondary: addr.flags() & ifa_flags::SECONDARY != 0,
            peer,
            label,
        };
        let key = connected.key();

        match change {
            Change::New => {
                if let Some(existing) = self.table.find_address(&connected.ifname, &key) {
                    if *existing == connected {
                        tracing::debug!(address = %connected, "address unchanged");
                        return Ok(());
                    }
                    if let Some(old) = self.table.remove_address(&connected.ifname, &key) {
                        self.emit(Notification::AddressDeleted(old));
                    }
                }
                self.table.insert_address(connected.clone());
                self.emit(Notification::AddressAdded(connected));
            }
            Change::Del => match self.table.remove_address(&connected.ifname, &key) {
                Some(old) => self.emit(Notification::AddressDeleted(old)),
                None => tracing::debug!(address = %connected, "deleted address was not known"),
            },
        }
        Ok(())
    }
}

impl<S: NotificationSink> RtHandler for Reconciler<S> {
    fn handle_link(&mut self, change: Change, link: &LinkMessage<'_>) -> Result<()> {
        match change {
            Change::New => self.new_link(link),
            Change::Del => self.del_link(link),
        }
    }

    fn handle_address(&mut self, change: Change, addr: &AddressMessage<'_>) -> Result<()> {
        self.address(change, addr)
    }
}

fn ip_from(af: u8, raw: &[u8]) -> Result<IpAddr> {
    let bad_len = || Error::InvalidAttribute(format!("address of {} bytes", raw.len()));
    if af == family::AF_INET {
        <[u8; 4]>::try_from(raw)
            .map(IpAddr::from)
            .map_err(|_| bad_len())
    } else {
        <[u8; 16]>::try_from(raw)
            .map(IpAddr::from)
            .map_err(|_| bad_len())
    }
}
