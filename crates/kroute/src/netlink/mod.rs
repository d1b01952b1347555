//! rtnetlink plumbing: wire codec, sockets, the message pump and the
//! request/reply driver.
//!
//! # Example
//!
//! ```ignore
//! use kroute::netlink::{Connection, NetlinkSocket, NlMsgType, SocketRole};
//! use kroute::netlink::types::family;
//!
//! let socket = NetlinkSocket::open(SocketRole::Command, 0)?;
//! let conn = Connection::new(socket);
//!
//! // Feed every link the kernel knows about to `handler`
//! conn.request_and_await(NlMsgType::RTM_GETLINK, family::AF_PACKET, &mut handler)
//!     .await?;
//! ```

pub mod attr;
pub mod builder;
pub mod connection;
mod error;
pub mod filter;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod message;
pub mod messages;
pub mod pump;
pub mod socket;
pub mod types;

pub use attr::{AttrIter, AttrTable};
pub use builder::{MessageBuilder, NestedAttrs};
pub use connection::{Connection, DEFAULT_COMMAND_TIMEOUT, dump_request, is_benign_race};
pub use error::{Error, Result};
pub use message::{MessageIter, MessageKind, NlMsgHdr, NlMsgType, message_type_name};
pub use messages::{AddressMessage, DecodedMessage, LinkMessage, RtMessage};
pub use pump::{Change, Pump, PumpReport, RtHandler, dispatch};
pub use socket::{Datagram, NetlinkSocket, SocketRole, Transport, groups};
