//! Fixed message bodies and attribute identifiers for rtnetlink.

pub mod addr;
pub mod link;

pub use addr::{IfAddrMsg, IfaAttr, ifa_flags};
pub use link::{IfInfoMsg, IflaAttr, iff};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Address families used in requests.
pub mod family {
    pub const AF_UNSPEC: u8 = libc::AF_UNSPEC as u8;
    pub const AF_INET: u8 = libc::AF_INET as u8;
    pub const AF_INET6: u8 = libc::AF_INET6 as u8;
    pub const AF_PACKET: u8 = libc::AF_PACKET as u8;
}

/// Generic rtnetlink request body (struct rtgenmsg), used by dump requests.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RtGenMsg {
    pub rtgen_family: u8,
}

impl RtGenMsg {
    pub fn new(family: u8) -> Self {
        Self {
            rtgen_family: family,
        }
    }
}

/// Parse a fixed body from the front of a message payload.
pub(crate) fn body_from_bytes<T>(data: &[u8]) -> Result<&T>
where
    T: FromBytes + Immutable + KnownLayout,
{
    T::ref_from_prefix(data)
        .map(|(r, _)| r)
        .map_err(|_| Error::Truncated {
            expected: std::mem::size_of::<T>(),
            actual: data.len(),
        })
}
