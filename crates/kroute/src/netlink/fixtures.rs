//! Kernel-shaped wire frames and a scripted transport for tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use super::builder::NestedAttrs;
use super::error::{Error, Result};
use super::message::{NLMSG_HDRLEN, NlMsgError, NlMsgHdr, NlMsgType, nlmsg_align};
use super::messages::{AddressMessage, DecodedMessage, LinkMessage};
use super::pump::{Change, RtHandler};
use super::socket::{Datagram, SocketRole, Transport};
use super::types::{IfAddrMsg, IfInfoMsg, IfaAttr, IflaAttr};
use zerocopy::IntoBytes;

/// Frame a message body: header, body, padding.
pub fn raw(msg_type: u16, flags: u16, seq: u32, body: &[u8]) -> Vec<u8> {
    let mut hdr = NlMsgHdr::new(msg_type, flags);
    hdr.nlmsg_len = (NLMSG_HDRLEN + body.len()) as u32;
    hdr.nlmsg_seq = seq;
    let mut buf = hdr.as_bytes().to_vec();
    buf.extend_from_slice(body);
    buf.resize(nlmsg_align(buf.len()), 0);
    buf
}

fn encode_attrs(attrs: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut nested = NestedAttrs::with_capacity(4096);
    for (kind, payload) in attrs {
        nested.append_attr(*kind, payload).unwrap();
    }
    nested.into_bytes()
}

/// Builder for RTM_NEWLINK / RTM_DELLINK frames.
#[derive(Debug, Clone)]
pub struct LinkFrame {
    msg_type: u16,
    seq: u32,
    header: IfInfoMsg,
    attrs: Vec<(u16, Vec<u8>)>,
}

impl LinkFrame {
    pub fn new(index: i32, name: &str) -> Self {
        let mut ifname = name.as_bytes().to_vec();
        ifname.push(0);
        Self {
            msg_type: NlMsgType::RTM_NEWLINK,
            seq: 0,
            header: IfInfoMsg::new().with_index(index).with_change(0xffff_ffff),
            attrs: vec![(IflaAttr::Ifname.into(), ifname)],
        }
    }

    /// A link message with no IFLA_IFNAME.
    pub fn unnamed(index: i32) -> Self {
        Self {
            msg_type: NlMsgType::RTM_NEWLINK,
            seq: 0,
            header: IfInfoMsg::new().with_index(index),
            attrs: Vec::new(),
        }
    }

    pub fn delete(mut self) -> Self {
        self.msg_type = NlMsgType::RTM_DELLINK;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.header.ifi_flags = flags;
        self
    }

    pub fn change(mut self, change: u32) -> Self {
        self.header.ifi_change = change;
        self
    }

    pub fn mtu(mut self, mtu: u32) -> Self {
        self.attrs.push((IflaAttr::Mtu.into(), mtu.to_ne_bytes().to_vec()));
        self
    }

    pub fn hwaddr(mut self, addr: &[u8]) -> Self {
        self.attrs.push((IflaAttr::Address.into(), addr.to_vec()));
        self
    }

    pub fn wireless(mut self) -> Self {
        self.attrs.push((IflaAttr::Wireless.into(), vec![0; 8]));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = self.header.as_bytes().to_vec();
        body.extend(encode_attrs(&self.attrs));
        raw(self.msg_type, 0, self.seq, &body)
    }
}

/// Builder for RTM_NEWADDR / RTM_DELADDR frames.
#[derive(Debug, Clone)]
pub struct AddrFrame {
    msg_type: u16,
    seq: u32,
    header: IfAddrMsg,
    attrs: Vec<(u16, Vec<u8>)>,
}

impl AddrFrame {
    pub fn new(index: u32, family: u8, prefix_len: u8) -> Self {
        Self {
            msg_type: NlMsgType::RTM_NEWADDR,
            seq: 0,
            header: IfAddrMsg::new()
                .with_family(family)
                .with_prefixlen(prefix_len)
                .with_index(index),
            attrs: Vec::new(),
        }
    }

    /// IPv4 address on `index`.
    pub fn v4(index: u32, prefix_len: u8) -> Self {
        Self::new(index, libc::AF_INET as u8, prefix_len)
    }

    /// IPv6 address on `index`.
    pub fn v6(index: u32, prefix_len: u8) -> Self {
        Self::new(index, libc::AF_INET6 as u8, prefix_len)
    }

    pub fn delete(mut self) -> Self {
        self.msg_type = NlMsgType::RTM_DELADDR;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.header.ifa_flags = flags;
        self
    }

    pub fn local(mut self, addr: &[u8]) -> Self {
        self.attrs.push((IfaAttr::Local.into(), addr.to_vec()));
        self
    }

    pub fn address(mut self, addr: &[u8]) -> Self {
        self.attrs.push((IfaAttr::Address.into(), addr.to_vec()));
        self
    }

    pub fn broadcast(mut self, addr: &[u8]) -> Self {
        self.attrs.push((IfaAttr::Broadcast.into(), addr.to_vec()));
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        let mut data = label.as_bytes().to_vec();
        data.push(0);
        self.attrs.push((IfaAttr::Label.into(), data));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = self.header.as_bytes().to_vec();
        body.extend(encode_attrs(&self.attrs));
        raw(self.msg_type, 0, self.seq, &body)
    }
}

pub fn new_link(seq: u32, index: i32, name: &str, flags: u32, mtu: u32) -> Vec<u8> {
    LinkFrame::new(index, name)
        .seq(seq)
        .flags(flags)
        .mtu(mtu)
        .build()
}

pub fn del_link(seq: u32, index: i32, name: &str) -> Vec<u8> {
    LinkFrame::new(index, name).delete().seq(seq).build()
}

/// IPv4 or IPv6 NEWADDR with optional IFA_LOCAL / IFA_ADDRESS.
pub fn new_address(
    seq: u32,
    index: u32,
    family: u8,
    prefix_len: u8,
    local: Option<&[u8]>,
    address: Option<&[u8]>,
) -> Vec<u8> {
    let mut frame = AddrFrame::new(index, family, prefix_len).seq(seq);
    if let Some(local) = local {
        frame = frame.local(local);
    }
    if let Some(address) = address {
        frame = frame.address(address);
    }
    frame.build()
}

pub fn done(seq: u32) -> Vec<u8> {
    raw(NlMsgType::DONE, super::message::NLM_F_MULTI, seq, &0i32.to_ne_bytes())
}

/// Error frame for a request of type `request`; `errno` is positive.
pub fn error(seq: u32, request: u16, errno: i32) -> Vec<u8> {
    let mut msg = NlMsgHdr::new(request, super::message::NLM_F_REQUEST);
    msg.nlmsg_seq = seq;
    let err = NlMsgError { error: -errno, msg };
    raw(NlMsgType::ERROR, 0, seq, err.as_bytes())
}

pub fn ack(seq: u32, request: u16) -> Vec<u8> {
    error(seq, request, 0)
}

pub fn set_pid(frame: &mut [u8], pid: u32) {
    frame[12..16].copy_from_slice(&pid.to_ne_bytes());
}

pub fn set_flags(frame: &mut [u8], flags: u16) {
    let current = u16::from_ne_bytes([frame[6], frame[7]]);
    frame[6..8].copy_from_slice(&(current | flags).to_ne_bytes());
}

/// Cut a frame's body to `len` bytes and fix up its length field.
pub fn truncate_body(frame: &mut Vec<u8>, len: usize) {
    frame.truncate(NLMSG_HDRLEN + len);
    frame[0..4].copy_from_slice(&((NLMSG_HDRLEN + len) as u32).to_ne_bytes());
    frame.resize(nlmsg_align(frame.len()), 0);
}

/// Rewrite the sequence number of every frame in `buf`, including the
/// request header echoed inside error frames.
pub fn stamp_seq(buf: &mut [u8], seq: u32) {
    let mut offset = 0;
    while offset + NLMSG_HDRLEN <= buf.len() {
        let len = u32::from_ne_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ]) as usize;
        let msg_type = u16::from_ne_bytes([buf[offset + 4], buf[offset + 5]]);
        buf[offset + 8..offset + 12].copy_from_slice(&seq.to_ne_bytes());
        if msg_type == NlMsgType::ERROR && len >= NLMSG_HDRLEN + 20 {
            let inner = offset + NLMSG_HDRLEN + 4 + 8;
            buf[inner..inner + 4].copy_from_slice(&seq.to_ne_bytes());
        }
        if len < NLMSG_HDRLEN {
            break;
        }
        offset += nlmsg_align(len);
    }
}

/// One kernel datagram holding `frames`.
pub fn datagram(frames: &[Vec<u8>]) -> Datagram {
    Datagram::from_kernel(frames.concat())
}

/// In-memory transport fed from a script.
///
/// Datagrams pushed with [`push`](Self::push) are delivered in order.
/// Replies queued with [`reply`](Self::reply) are released one per `send`,
/// stamped with the sequence number of the request that triggered them.
pub struct ScriptedTransport {
    role: SocketRole,
    pid: u32,
    seq: Cell<u32>,
    inbox: RefCell<VecDeque<Datagram>>,
    replies: RefCell<VecDeque<Vec<Vec<u8>>>>,
    sent: RefCell<Vec<Vec<u8>>>,
}

impl ScriptedTransport {
    pub fn new(role: SocketRole, pid: u32) -> Self {
        Self {
            role,
            pid,
            seq: Cell::new(1),
            inbox: RefCell::new(VecDeque::new()),
            replies: RefCell::new(VecDeque::new()),
            sent: RefCell::new(Vec::new()),
        }
    }

    pub fn event(pid: u32) -> Self {
        Self::new(SocketRole::Event, pid)
    }

    pub fn command(pid: u32) -> Self {
        Self::new(SocketRole::Command, pid)
    }

    pub fn push(&self, datagram: Datagram) {
        self.inbox.borrow_mut().push_back(datagram);
    }

    /// Queue the frames the kernel sends back for the next request.
    pub fn reply(&self, frames: Vec<Vec<u8>>) {
        self.replies.borrow_mut().push_back(frames);
    }

    pub fn is_drained(&self) -> bool {
        self.inbox.borrow().is_empty()
    }

    /// Every message sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn role(&self) -> SocketRole {
        self.role
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn next_seq(&self) -> u32 {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        seq
    }

    async fn send(&self, msg: &[u8]) -> Result<()> {
        let header = NlMsgHdr::from_bytes(msg)?;
        let seq = header.nlmsg_seq;
        self.sent.borrow_mut().push(msg.to_vec());

        if let Some(frames) = self.replies.borrow_mut().pop_front() {
            let mut data = frames.concat();
            stamp_seq(&mut data, seq);
            self.push(Datagram::from_kernel(data));
        }
        Ok(())
    }

    fn try_recv(&self) -> Result<Option<Datagram>> {
        Ok(self.inbox.borrow_mut().pop_front())
    }

    async fn recv(&self) -> Result<Datagram> {
        let next = self.inbox.borrow_mut().pop_front();
        match next {
            Some(dg) => Ok(dg),
            None => std::future::pending().await,
        }
    }

    async fn readable(&self) -> Result<()> {
        if self.is_drained() {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Handler that records what it was given.
#[derive(Debug, Default)]
pub struct Recorder {
    pub links: Vec<(Change, u32)>,
    pub addresses: Vec<(Change, u32)>,
    pub other: Vec<u16>,
    /// Fail any message for this interface index.
    pub fail_on: Option<u32>,
}

impl RtHandler for Recorder {
    fn handle_link(&mut self, change: Change, link: &LinkMessage<'_>) -> Result<()> {
        let index = link.index()?;
        if self.fail_on == Some(index) {
            return Err(Error::UnknownInterface { index });
        }
        self.links.push((change, index));
        Ok(())
    }

    fn handle_address(&mut self, change: Change, addr: &AddressMessage<'_>) -> Result<()> {
        if self.fail_on == Some(addr.index()) {
            return Err(Error::UnknownInterface {
                index: addr.index(),
            });
        }
        self.addresses.push((change, addr.index()));
        Ok(())
    }

    fn handle_other(&mut self, msg: &DecodedMessage<'_>) -> Result<()> {
        self.other.push(msg.msg_type());
        Ok(())
    }
}
