//! Borrowed view of an address message.

use crate::netlink::attr::AttrTable;
use crate::netlink::error::Result;
use crate::netlink::types::addr::{IfAddrMsg, IfaAttr};

/// Address message: `ifaddrmsg` body plus its attribute table.
#[derive(Debug, Clone)]
pub struct AddressMessage<'a> {
    header: IfAddrMsg,
    attrs: AttrTable<'a>,
}

impl<'a> AddressMessage<'a> {
    /// Parse an address message body.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let header = *IfAddrMsg::from_bytes(payload)?;
        let attrs = AttrTable::parse(&payload[IfAddrMsg::SIZE..], IfaAttr::MAX)?;
        Ok(Self { header, attrs })
    }

    pub fn header(&self) -> &IfAddrMsg {
        &self.header
    }

    pub fn family(&self) -> u8 {
        self.header.ifa_family
    }

    pub fn prefix_len(&self) -> u8 {
        self.header.ifa_prefixlen
    }

    pub fn flags(&self) -> u8 {
        self.header.ifa_flags
    }

    pub fn index(&self) -> u32 {
        self.header.ifa_index
    }

    /// IFA_LOCAL payload.
    pub fn local(&self) -> Option<&'a [u8]> {
        self.attrs.get(IfaAttr::Local.into())
    }

    /// IFA_ADDRESS payload (peer on point-to-point links).
    pub fn address(&self) -> Option<&'a [u8]> {
        self.attrs.get(IfaAttr::Address.into())
    }

    /// IFA_BROADCAST payload.
    pub fn broadcast(&self) -> Option<&'a [u8]> {
        self.attrs.get(IfaAttr::Broadcast.into())
    }

    /// IFA_LABEL.
    pub fn label(&self) -> Result<Option<&'a str>> {
        self.attrs.string(IfaAttr::Label.into())
    }

    pub fn attrs(&self) -> &AttrTable<'a> {
        &self.attrs
    }
}
