//! Interface and connected-address model kept in sync with the kernel.

mod notify;
mod reconcile;
mod table;

pub use notify::{Notification, NotificationSink};
pub use reconcile::Reconciler;
pub use table::InterfaceTable;

use std::fmt;
use std::net::IpAddr;

use serde::{Serialize, Serializer};

use crate::netlink::types::iff;

/// Longest hardware address kept; longer ones are dropped.
pub const INTERFACE_HWADDR_MAX: usize = 20;

/// Index value reserved for interfaces the kernel does not know about.
pub const IFINDEX_INTERNAL: u32 = 0;

/// A network interface as last reported by the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    pub index: u32,
    pub name: String,
    #[serde(serialize_with = "serialize_hwaddr")]
    pub hardware_address: Option<Vec<u8>>,
    pub mtu: u32,
    #[serde(serialize_with = "serialize_flags")]
    pub flags: u32,
    pub metric: u32,
    pub active: bool,
}

impl Interface {
    /// A fresh, inactive entry.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            index: IFINDEX_INTERNAL,
            name: name.into(),
            hardware_address: None,
            mtu: 0,
            flags: 0,
            metric: 1,
            active: false,
        }
    }

    /// Administratively up.
    pub fn is_up(&self) -> bool {
        self.flags & iff::UP != 0
    }

    pub fn is_running(&self) -> bool {
        self.flags & iff::RUNNING != 0
    }

    pub fn is_loopback(&self) -> bool {
        self.flags & iff::LOOPBACK != 0
    }

    /// Able to pass traffic. With `link_detect` the carrier must be up too.
    pub fn is_operative(&self, link_detect: bool) -> bool {
        self.is_up() && (self.is_running() || !link_detect)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (index {})", self.name, self.index)
    }
}

/// Normalize a raw hardware address: oversized or all-zero means absent.
pub fn normalize_hwaddr(name: &str, raw: Option<&[u8]>) -> Option<Vec<u8>> {
    let raw = raw?;
    if raw.len() > INTERFACE_HWADDR_MAX {
        tracing::warn!(
            ifname = name,
            len = raw.len(),
            max = INTERFACE_HWADDR_MAX,
            "hardware address is too large, ignoring it"
        );
        return None;
    }
    if raw.iter().all(|&b| b == 0) {
        return None;
    }
    Some(raw.to_vec())
}

/// Render a hardware address as colon-separated hex.
pub fn format_hwaddr(addr: &[u8]) -> String {
    addr.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn serialize_hwaddr<S: Serializer>(addr: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match addr {
        Some(addr) => s.serialize_some(&format_hwaddr(addr)),
        None => s.serialize_none(),
    }
}

fn serialize_flags<S: Serializer>(flags: &u32, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&iff::describe(*flags))
}

/// An address configured on an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectedAddress {
    /// Owning interface's kernel index.
    pub ifindex: u32,
    /// Owning interface's name.
    pub ifname: String,
    pub local: IpAddr,
    pub prefix_len: u8,
    /// Peer address if `peer` is set, otherwise the broadcast address.
    pub destination: Option<IpAddr>,
    pub secondary: bool,
    pub peer: bool,
    pub label: Option<String>,
}

impl ConnectedAddress {
    /// Identity of this address on its interface.
    pub fn key(&self) -> AddressKey {
        AddressKey {
            ipv6: self.local.is_ipv6(),
            local: self.local,
            prefix_len: self.prefix_len,
            destination: self.destination,
        }
    }

    /// Address family constant (AF_INET / AF_INET6).
    pub fn family(&self) -> u8 {
        if self.local.is_ipv6() {
            libc::AF_INET6 as u8
        } else {
            libc::AF_INET as u8
        }
    }
}

impl fmt::Display for ConnectedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.local, self.prefix_len)?;
        match (self.destination, self.peer) {
            (Some(dst), true) => write!(f, " peer {}", dst)?,
            (Some(dst), false) => write!(f, " brd {}", dst)?,
            (None, _) => {}
        }
        write!(f, " on {}", self.ifname)
    }
}

/// Uniqueness key of a connected address within one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressKey {
    pub ipv6: bool,
    pub local: IpAddr,
    pub prefix_len: u8,
    pub destination: Option<IpAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operative_state() {
        let mut iface = Interface::new("eth0");
        iface.flags = iff::UP;
        assert!(iface.is_operative(false));
        assert!(!iface.is_operative(true));
        iface.flags |= iff::RUNNING;
        assert!(iface.is_operative(true));
        iface.flags = iff::RUNNING;
        assert!(!iface.is_operative(false));
    }

    #[test]
    fn test_hwaddr_normalization() {
        assert_eq!(normalize_hwaddr("eth0", None), None);
        assert_eq!(normalize_hwaddr("eth0", Some(&[0; 6])), None);
        assert_eq!(normalize_hwaddr("ib0", Some(&[1; 21])), None);
        assert_eq!(
            normalize_hwaddr("eth0", Some(&[0, 0x1b, 0x21, 0, 0, 1])),
            Some(vec![0, 0x1b, 0x21, 0, 0, 1])
        );
        assert_eq!(format_hwaddr(&[0, 0x1b, 0xfe]), "00:1b:fe");
    }

    #[test]
    fn test_address_display() {
        let addr = ConnectedAddress {
            ifindex: 3,
            ifname: "ppp0".into(),
            local: "10.1.1.1".parse().unwrap(),
            prefix_len: 32,
            destination: Some("10.1.1.2".parse().unwrap()),
            secondary: false,
            peer: true,
            label: None,
        };
        assert_eq!(addr.to_string(), "10.1.1.1/32 peer 10.1.1.2 on ppp0");
        assert_eq!(addr.family(), libc::AF_INET as u8);
    }
}
