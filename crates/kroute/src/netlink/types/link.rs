//! Link (network interface) message types.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::body_from_bytes;
use crate::netlink::error::Result;

/// Interface info message (struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    /// Address family (usually AF_UNSPEC).
    pub ifi_family: u8,
    /// Padding.
    pub __ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    /// Interface index.
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Change mask.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create a new interface info message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: i32) -> Self {
        self.ifi_index = index;
        self
    }

    /// Set the device flags.
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.ifi_flags = flags;
        self
    }

    /// Set the change mask.
    pub fn with_change(mut self, change: u32) -> Self {
        self.ifi_change = change;
        self
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        body_from_bytes(data)
    }
}

/// Interface link attributes (IFLA_*) this crate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IflaAttr {
    Unspec = 0,
    Address = 1,
    Broadcast = 2,
    Ifname = 3,
    Mtu = 4,
    Link = 5,
    Qdisc = 6,
    Stats = 7,
    Cost = 8,
    Priority = 9,
    Master = 10,
    /// Wireless extensions
    Wireless = 11,
    /// Protocol specific information
    Protinfo = 12,
    TxqLen = 13,
    Map = 14,
    Weight = 15,
    Operstate = 16,
}

impl IflaAttr {
    /// Highest type code kept when decoding link messages.
    pub const MAX: u16 = 64;
}

impl From<IflaAttr> for u16 {
    fn from(attr: IflaAttr) -> Self {
        attr as u16
    }
}

/// Interface flags (IFF_*).
pub mod iff {
    pub const UP: u32 = libc::IFF_UP as u32;
    pub const BROADCAST: u32 = libc::IFF_BROADCAST as u32;
    pub const DEBUG: u32 = libc::IFF_DEBUG as u32;
    pub const LOOPBACK: u32 = libc::IFF_LOOPBACK as u32;
    pub const POINTOPOINT: u32 = libc::IFF_POINTOPOINT as u32;
    pub const RUNNING: u32 = libc::IFF_RUNNING as u32;
    pub const NOARP: u32 = libc::IFF_NOARP as u32;
    pub const PROMISC: u32 = libc::IFF_PROMISC as u32;
    pub const MULTICAST: u32 = libc::IFF_MULTICAST as u32;
    pub const LOWER_UP: u32 = libc::IFF_LOWER_UP as u32;
    pub const DORMANT: u32 = libc::IFF_DORMANT as u32;
    pub const ECHO: u32 = libc::IFF_ECHO as u32;

    /// Bits of `ifi_flags` the interface table keeps (IFF_UP through IFF_ECHO).
    pub const KEPT: u32 = 0x000f_ffff;

    /// Render flags the way `ip link` prints them.
    pub fn describe(flags: u32) -> String {
        const NAMES: &[(u32, &str)] = &[
            (UP, "UP"),
            (BROADCAST, "BROADCAST"),
            (LOOPBACK, "LOOPBACK"),
            (POINTOPOINT, "POINTOPOINT"),
            (RUNNING, "RUNNING"),
            (NOARP, "NOARP"),
            (PROMISC, "PROMISC"),
            (MULTICAST, "MULTICAST"),
            (LOWER_UP, "LOWER_UP"),
            (DORMANT, "DORMANT"),
            (ECHO, "ECHO"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| flags & bit != 0)
            .map(|(_, name)| *name)
            .collect();
        format!("<{}>", names.join(","))
    }
}
