//! Borrowed view of a link message.

use crate::netlink::attr::AttrTable;
use crate::netlink::error::{Error, Result};
use crate::netlink::types::link::{IfInfoMsg, IflaAttr};

/// Link message: `ifinfomsg` body plus its attribute table.
#[derive(Debug, Clone)]
pub struct LinkMessage<'a> {
    header: IfInfoMsg,
    attrs: AttrTable<'a>,
}

impl<'a> LinkMessage<'a> {
    /// Parse a link message body.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let header = *IfInfoMsg::from_bytes(payload)?;
        let attrs = AttrTable::parse(&payload[IfInfoMsg::SIZE..], IflaAttr::MAX)?;
        Ok(Self { header, attrs })
    }

    pub fn header(&self) -> &IfInfoMsg {
        &self.header
    }

    /// Kernel interface index.
    ///
    /// Negative values never come from a real kernel and are rejected.
    pub fn index(&self) -> Result<u32> {
        u32::try_from(self.header.ifi_index).map_err(|_| {
            Error::InvalidMessage(format!("negative ifindex {}", self.header.ifi_index))
        })
    }

    pub fn flags(&self) -> u32 {
        self.header.ifi_flags
    }

    pub fn change(&self) -> u32 {
        self.header.ifi_change
    }

    /// Interface name (IFLA_IFNAME).
    pub fn name(&self) -> Result<Option<&'a str>> {
        self.attrs.string(IflaAttr::Ifname.into())
    }

    /// MTU (IFLA_MTU).
    pub fn mtu(&self) -> Result<Option<u32>> {
        self.attrs.u32(IflaAttr::Mtu.into())
    }

    /// Raw hardware address (IFLA_ADDRESS), unvalidated.
    pub fn hardware_address(&self) -> Option<&'a [u8]> {
        self.attrs.get(IflaAttr::Address.into())
    }

    /// Wireless-extension event that carries no link change.
    pub fn is_wireless_noop(&self) -> bool {
        self.attrs.contains(IflaAttr::Wireless.into()) && self.header.ifi_change == 0
    }

    pub fn attrs(&self) -> &AttrTable<'a> {
        &self.attrs
    }
}
