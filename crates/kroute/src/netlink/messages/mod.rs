//! Decoded rtnetlink messages.
//!
//! [`DecodedMessage`] is a framed message with its header classified;
//! [`RtMessage`] is the typed view handed to a [`RtHandler`](super::pump::RtHandler).
//! Both borrow from the receive buffer and are dropped once handled.

mod address;
mod link;

pub use address::*;
pub use link::*;

use super::error::Result;
use super::message::{MessageKind, NlMsgHdr, message_type_name};

/// One framed message from a datagram.
#[derive(Debug, Clone, Copy)]
pub struct DecodedMessage<'a> {
    header: NlMsgHdr,
    payload: &'a [u8],
}

impl<'a> DecodedMessage<'a> {
    /// Wrap a header and the payload that follows it.
    pub fn new(header: &NlMsgHdr, payload: &'a [u8]) -> Self {
        Self {
            header: *header,
            payload,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.header.kind()
    }

    pub fn msg_type(&self) -> u16 {
        self.header.nlmsg_type
    }

    /// Message type name for logging.
    pub fn type_name(&self) -> &'static str {
        message_type_name(self.header.nlmsg_type)
    }

    pub fn seq(&self) -> u32 {
        self.header.nlmsg_seq
    }

    /// Port id stamped in the message header.
    pub fn pid(&self) -> u32 {
        self.header.nlmsg_pid
    }

    pub fn flags(&self) -> u16 {
        self.header.nlmsg_flags
    }

    pub fn header(&self) -> &NlMsgHdr {
        &self.header
    }

    /// Body after the netlink header.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Decode the body into its typed view.
    pub fn decode(&self) -> Result<RtMessage<'a>> {
        Ok(match self.kind() {
            MessageKind::NewLink => RtMessage::NewLink(LinkMessage::parse(self.payload)?),
            MessageKind::DelLink => RtMessage::DelLink(LinkMessage::parse(self.payload)?),
            MessageKind::NewAddress => {
                RtMessage::NewAddress(AddressMessage::parse(self.payload)?)
            }
            MessageKind::DelAddress => {
                RtMessage::DelAddress(AddressMessage::parse(self.payload)?)
            }
            _ => RtMessage::Other(*self),
        })
    }
}

/// Typed rtnetlink message, one variant per kind the reconciler handles.
#[derive(Debug, Clone)]
pub enum RtMessage<'a> {
    NewLink(LinkMessage<'a>),
    DelLink(LinkMessage<'a>),
    NewAddress(AddressMessage<'a>),
    DelAddress(AddressMessage<'a>),
    /// Anything else (route notifications, unexpected types).
    Other(DecodedMessage<'a>),
}
