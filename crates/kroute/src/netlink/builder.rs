//! Message builder for constructing netlink messages.
//!
//! Builders have a fixed capacity. Every append checks the room left and
//! fails with [`Error::CapacityExceeded`] instead of growing the buffer, so a
//! caller that ignores the result cannot send a half-built request.

use zerocopy::{Immutable, IntoBytes};

use super::attr::{NLA_F_NESTED, NLA_HDRLEN, NlAttr, nla_align};
use super::error::{Error, Result};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Default capacity of a request message.
pub const DEFAULT_REQUEST_CAPACITY: usize = 1024;

/// Append one padded attribute record to `buf`, bounded by `capacity`.
fn put_attr(buf: &mut Vec<u8>, capacity: usize, attr_type: u16, data: &[u8]) -> Result<()> {
    let record = NLA_HDRLEN + data.len();
    let needed = nla_align(record);
    let available = capacity.saturating_sub(buf.len());
    if record > u16::MAX as usize || needed > available {
        return Err(Error::CapacityExceeded { needed, available });
    }

    let attr = NlAttr::new(attr_type, data.len());
    buf.extend_from_slice(attr.as_bytes());
    buf.extend_from_slice(data);
    let aligned = nla_align(buf.len());
    buf.resize(aligned, 0);
    Ok(())
}

/// Builder for constructing netlink messages.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
    capacity: usize,
}

impl MessageBuilder {
    /// Create a new message builder with the given type and flags.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self::with_capacity(msg_type, flags, DEFAULT_REQUEST_CAPACITY)
    }

    /// Create a builder whose finished message may not exceed `capacity` bytes.
    pub fn with_capacity(msg_type: u16, flags: u16, capacity: usize) -> Self {
        let header = NlMsgHdr::new(msg_type, flags);
        let mut buf = Vec::with_capacity(capacity.max(NLMSG_HDRLEN));
        buf.extend_from_slice(header.as_bytes());
        buf.resize(NLMSG_HDRLEN, 0);
        Self {
            buf,
            capacity: capacity.max(NLMSG_HDRLEN),
        }
    }

    /// Get the current message length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if the message is empty (header only).
    pub fn is_empty(&self) -> bool {
        self.buf.len() == NLMSG_HDRLEN
    }

    /// Bytes that can still be appended.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.buf.len())
    }

    /// Message type in the header.
    pub fn msg_type(&self) -> u16 {
        u16::from_ne_bytes([self.buf[4], self.buf[5]])
    }

    /// Append raw bytes to the message (with alignment padding).
    pub fn append_bytes(&mut self, data: &[u8]) -> Result<()> {
        let needed = nlmsg_align(data.len());
        let available = self.remaining();
        if needed > available {
            return Err(Error::CapacityExceeded { needed, available });
        }
        self.buf.extend_from_slice(data);
        let aligned = nlmsg_align(self.buf.len());
        self.buf.resize(aligned, 0);
        Ok(())
    }

    /// Append a fixed-size body struct to the message.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) -> Result<()> {
        self.append_bytes(data.as_bytes())
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        put_attr(&mut self.buf, self.capacity, attr_type, data)
    }

    /// Append a u32 attribute (native endian).
    pub fn append_attr_u32(&mut self, attr_type: u16, value: u32) -> Result<()> {
        self.append_attr(attr_type, &value.to_ne_bytes())
    }

    /// Append a null-terminated string attribute.
    pub fn append_attr_str(&mut self, attr_type: u16, value: &str) -> Result<()> {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        self.append_attr(attr_type, &data)
    }

    /// Append a finished nested container as one attribute.
    pub fn append_nested(&mut self, attr_type: u16, nested: NestedAttrs) -> Result<()> {
        self.append_attr(attr_type | NLA_F_NESTED, &nested.buf)
    }

    /// Set the sequence number.
    pub fn set_seq(&mut self, seq: u32) {
        self.buf[8..12].copy_from_slice(&seq.to_ne_bytes());
    }

    /// Set the port ID.
    pub fn set_pid(&mut self, pid: u32) {
        self.buf[12..16].copy_from_slice(&pid.to_ne_bytes());
    }

    /// OR extra bits into the header flags.
    pub fn add_flags(&mut self, flags: u16) {
        let current = u16::from_ne_bytes([self.buf[6], self.buf[7]]);
        self.buf[6..8].copy_from_slice(&(current | flags).to_ne_bytes());
    }

    /// Finalize and return the message bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
        self.buf
    }

    /// Get the current buffer for inspection.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// A sub-attribute container with its own capacity.
///
/// Encoded with the same record format as top-level attributes; append the
/// result to a parent with [`MessageBuilder::append_nested`] or
/// [`NestedAttrs::append_nested`].
#[derive(Debug, Clone, Default)]
pub struct NestedAttrs {
    buf: Vec<u8>,
    capacity: usize,
}

impl NestedAttrs {
    /// Create an empty container that may hold up to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an attribute with the given type and data.
    pub fn append_attr(&mut self, attr_type: u16, data: &[u8]) -> Result<()> {
        put_attr(&mut self.buf, self.capacity, attr_type, data)
    }

    /// Append another container as a nested attribute.
    pub fn append_nested(&mut self, attr_type: u16, nested: NestedAttrs) -> Result<()> {
        self.append_attr(attr_type | NLA_F_NESTED, &nested.buf)
    }

    /// Encoded length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the encoded records.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::AttrTable;
    use crate::netlink::message::{NLM_F_ACK, NLM_F_REQUEST};

    #[test]
    fn test_simple_message() {
        let msg = MessageBuilder::new(16, NLM_F_REQUEST).finish();
        assert_eq!(msg.len(), NLMSG_HDRLEN);

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_len as usize, NLMSG_HDRLEN);
        assert_eq!(header.nlmsg_type, 16);
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST);
    }

    #[test]
    fn test_header_stamps() {
        let mut builder = MessageBuilder::new(20, NLM_F_REQUEST);
        builder.set_seq(42);
        builder.set_pid(7);
        builder.add_flags(NLM_F_ACK);
        assert_eq!(builder.msg_type(), 20);
        let msg = builder.finish();

        let header = NlMsgHdr::from_bytes(&msg).unwrap();
        assert_eq!(header.nlmsg_seq, 42);
        assert_eq!(header.nlmsg_pid, 7);
        assert_eq!(header.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK);
    }

    #[test]
    fn test_attribute_is_padded() {
        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        builder.append_attr(3, b"lo\0").unwrap();
        let msg = builder.finish();
        assert_eq!(msg.len(), NLMSG_HDRLEN + 8);

        let table = AttrTable::parse(&msg[NLMSG_HDRLEN..], 8).unwrap();
        assert_eq!(table.string(3).unwrap(), Some("lo"));
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut builder = MessageBuilder::with_capacity(20, NLM_F_REQUEST, NLMSG_HDRLEN + 8);
        builder.append_attr_u32(1, 5).unwrap();
        let err = builder.append_attr_u32(2, 6).unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityExceeded {
                needed: 8,
                available: 0
            }
        ));
        // The failed append left the message untouched.
        assert_eq!(builder.len(), NLMSG_HDRLEN + 8);
    }

    #[test]
    fn test_nested_has_own_capacity() {
        let mut inner = NestedAttrs::with_capacity(8);
        inner.append_attr(1, &[1, 2, 3, 4]).unwrap();
        assert!(inner.append_attr(2, &[]).is_err());

        let mut builder = MessageBuilder::new(16, NLM_F_REQUEST);
        builder.append_nested(9, inner).unwrap();
        let msg = builder.finish();

        let table = AttrTable::parse(&msg[NLMSG_HDRLEN..], 16).unwrap();
        let nested = AttrTable::parse_nested(table.get(9).unwrap(), 4).unwrap();
        assert_eq!(nested.get(1), Some(&[1, 2, 3, 4][..]));
    }
}
