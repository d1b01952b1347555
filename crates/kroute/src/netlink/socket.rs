//! Transport sockets for the event and command channels.

use std::future::Future;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll, Waker};

use bytes::{Bytes, BytesMut};
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use super::error::{Error, Result};

/// Receive buffer size for one datagram.
pub const RECV_BUFFER_SIZE: usize = 32768;

/// Size of `struct sockaddr_nl`, the only sender address length accepted.
pub const SOCKADDR_NL_LEN: usize = std::mem::size_of::<libc::sockaddr_nl>();

/// Which channel a socket serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    /// Bound to multicast groups; receives unsolicited kernel events.
    Event,
    /// Bound to no group; carries requests and their replies.
    Command,
}

impl SocketRole {
    /// Label used in every log line about this socket.
    pub fn label(self) -> &'static str {
        match self {
            SocketRole::Event => "netlink-listen",
            SocketRole::Command => "netlink-cmd",
        }
    }
}

impl std::fmt::Display for SocketRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One datagram read from a socket.
#[derive(Debug, Clone)]
pub struct Datagram {
    /// Bytes received; empty means the peer closed the channel.
    pub data: Bytes,
    /// Port id of the sender (0 for the kernel).
    pub sender_pid: u32,
    /// Length of the sender address reported by the kernel.
    pub addr_len: usize,
    /// The datagram did not fit the receive buffer.
    pub truncated: bool,
}

impl Datagram {
    /// A datagram sent by the kernel.
    pub fn from_kernel(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            sender_pid: 0,
            addr_len: SOCKADDR_NL_LEN,
            truncated: false,
        }
    }
}

/// Channel the message pump and request driver run over.
///
/// Implemented by [`NetlinkSocket`]; tests substitute a scripted transport.
pub trait Transport {
    /// Role of this channel.
    fn role(&self) -> SocketRole;

    /// Port id the kernel assigned at bind time.
    fn pid(&self) -> u32;

    /// Get the next sequence number. Never repeats for the socket's lifetime.
    fn next_seq(&self) -> u32;

    /// Send one complete message.
    fn send(&self, msg: &[u8]) -> impl Future<Output = Result<()>>;

    /// Receive one datagram if one is ready, without waiting.
    fn try_recv(&self) -> Result<Option<Datagram>>;

    /// Wait for and receive one datagram.
    fn recv(&self) -> impl Future<Output = Result<Datagram>>;

    /// Wait until a datagram is ready to read.
    fn readable(&self) -> impl Future<Output = Result<()>>;
}

/// Async rtnetlink socket.
pub struct NetlinkSocket {
    /// The underlying async file descriptor.
    fd: AsyncFd<Socket>,
    /// Sequence number counter.
    seq: AtomicU32,
    /// Local port ID (assigned by kernel).
    pid: u32,
    /// Multicast group mask passed at bind time.
    groups: u32,
    role: SocketRole,
}

impl NetlinkSocket {
    /// Open a NETLINK_ROUTE socket bound to `groups` (a RTMGRP_* mask).
    ///
    /// The kernel picks the port id; it is read back and kept for
    /// self-traffic filtering.
    pub fn open(role: SocketRole, groups: u32) -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_ROUTE)?;
        socket.set_non_blocking(true)?;

        let mut addr = SocketAddr::new(0, groups);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        let fd = AsyncFd::new(socket)?;

        tracing::debug!(socket = role.label(), pid, groups, "netlink socket open");

        Ok(Self {
            fd,
            seq: AtomicU32::new(1),
            pid,
            groups,
            role,
        })
    }

    /// Multicast group mask this socket was bound with.
    pub fn groups(&self) -> u32 {
        self.groups
    }

    /// Apply a receive buffer size.
    ///
    /// Logs the size before and after. Failures are logged and otherwise
    /// ignored; the kernel default stays in effect.
    pub fn set_recv_buffer_size(&self, size: u32) {
        let label = self.role.label();
        let fd = self.as_raw_fd();

        let old = match sockopt_rcvbuf(fd) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(socket = label, error = %e, "can't get receive buffer size");
                return;
            }
        };

        let value = size as libc::c_int;
        // SAFETY: fd is an open socket owned by self, and `value` outlives
        // the call with the size passed alongside it.
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                (&value as *const libc::c_int).cast(),
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            tracing::error!(
                socket = label,
                size,
                error = %io::Error::last_os_error(),
                "can't set receive buffer size"
            );
            return;
        }

        match sockopt_rcvbuf(fd) {
            Ok(new) => tracing::info!(
                socket = label,
                "setting netlink socket receive buffer size: {} -> {}",
                old,
                new
            ),
            Err(e) => {
                tracing::error!(socket = label, error = %e, "can't get receive buffer size")
            }
        }
    }

    fn read_one(&self, inner: &AsyncFd<Socket>) -> io::Result<Datagram> {
        let mut buf = BytesMut::zeroed(RECV_BUFFER_SIZE);
        let raw = recv_datagram(inner.as_raw_fd(), &mut buf)?;
        buf.truncate(raw.len);
        Ok(Datagram {
            data: buf.freeze(),
            sender_pid: raw.sender_pid,
            addr_len: raw.addr_len,
            truncated: raw.truncated,
        })
    }
}

impl Transport for NetlinkSocket {
    fn role(&self) -> SocketRole {
        self.role
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn send(&self, msg: &[u8]) -> Result<()> {
        loop {
            let mut guard = self.fd.ready(Interest::WRITABLE).await?;

            match guard.try_io(|inner| inner.get_ref().send(msg, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    fn try_recv(&self) -> Result<Option<Datagram>> {
        // Polling with a no-op waker only inspects readiness; tasks that want
        // to be woken go through `readable()`.
        let mut cx = Context::from_waker(Waker::noop());
        let mut guard = match self.fd.poll_read_ready(&mut cx) {
            Poll::Ready(Ok(guard)) => guard,
            Poll::Ready(Err(e)) => return Err(e.into()),
            Poll::Pending => return Ok(None),
        };

        match guard.try_io(|inner| self.read_one(inner)) {
            Ok(result) => Ok(Some(result?)),
            Err(_would_block) => Ok(None),
        }
    }

    async fn recv(&self) -> Result<Datagram> {
        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;

            match guard.try_io(|inner| self.read_one(inner)) {
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }

    async fn readable(&self) -> Result<()> {
        // Readiness stays set until a read hits EAGAIN.
        let _guard = self.fd.readable().await?;
        Ok(())
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }
}

struct RawDatagram {
    len: usize,
    sender_pid: u32,
    addr_len: usize,
    truncated: bool,
}

/// `recvmsg` into `buf`, keeping the sender address and truncation flag
/// that `recv` would discard. Retries on EINTR.
fn recv_datagram(fd: RawFd, buf: &mut [u8]) -> io::Result<RawDatagram> {
    loop {
        // SAFETY: sockaddr_nl and msghdr are plain C structs for which
        // all-zero is a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_name = (&mut addr as *mut libc::sockaddr_nl).cast();
        msg.msg_namelen = SOCKADDR_NL_LEN as libc::socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;

        // SAFETY: msg points at `addr` and `iov`, both live for the call, and
        // iov covers exactly `buf`.
        let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        return Ok(RawDatagram {
            len: (n as usize).min(buf.len()),
            sender_pid: addr.nl_pid,
            addr_len: msg.msg_namelen as usize,
            truncated: msg.msg_flags & libc::MSG_TRUNC != 0,
        });
    }
}

fn sockopt_rcvbuf(fd: RawFd) -> io::Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: value and len are valid for writes and len matches value's size.
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&mut value as *mut libc::c_int).cast(),
            &mut len,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(value)
}

/// Multicast group masks for binding NETLINK_ROUTE sockets (RTMGRP_*).
pub mod groups {
    pub const RTMGRP_LINK: u32 = 0x1;
    pub const RTMGRP_NOTIFY: u32 = 0x2;
    pub const RTMGRP_IPV4_IFADDR: u32 = 0x10;
    pub const RTMGRP_IPV4_ROUTE: u32 = 0x40;
    pub const RTMGRP_IPV6_IFADDR: u32 = 0x100;
    pub const RTMGRP_IPV6_ROUTE: u32 = 0x400;

    /// Groups the event socket listens on.
    pub fn event_groups(ipv6: bool) -> u32 {
        let mut mask = RTMGRP_LINK | RTMGRP_IPV4_ROUTE | RTMGRP_IPV4_IFADDR;
        if ipv6 {
            mask |= RTMGRP_IPV6_ROUTE | RTMGRP_IPV6_IFADDR;
        }
        mask
    }
}

/// Raise an error for a socket that returned no data.
pub(crate) fn closed(role: SocketRole) -> Error {
    Error::ConnectionClosed {
        socket: role.label(),
    }
}
