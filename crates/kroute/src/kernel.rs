//! The kernel synchronization context: both sockets, the interface table and
//! the notification sink in one owned value.

use std::net::IpAddr;
use std::os::fd::AsRawFd;

use crate::config::KernelConfig;
use crate::interface::{ConnectedAddress, Interface, InterfaceTable, NotificationSink, Reconciler};
use crate::netlink::message::{NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST};
use crate::netlink::types::{IfAddrMsg, IfaAttr, family, ifa_flags};
use crate::netlink::{
    Connection, MessageBuilder, NetlinkSocket, NlMsgType, Pump, PumpReport, Result, SocketRole,
    Transport, filter, message_type_name,
};

/// Keeps a [`Reconciler`] in step with the kernel and pushes address
/// changes back to it.
///
/// Events arrive on one socket, commands and dumps go over another. Both are
/// [`NetlinkSocket`]s in the daemon; tests substitute scripted transports.
pub struct KernelSync<S, T = NetlinkSocket> {
    events: T,
    commands: Connection<T>,
    reconciler: Reconciler<S>,
    ipv6: bool,
}

impl<S: NotificationSink> KernelSync<S, NetlinkSocket> {
    /// Open the event and command sockets.
    ///
    /// Must be called from within a tokio runtime. A receive buffer size of
    /// 0 leaves the kernel default alone. Failing to install the
    /// self-traffic filter is logged and tolerated.
    pub fn open(config: &KernelConfig, sink: S) -> Result<Self> {
        let events = NetlinkSocket::open(SocketRole::Event, config.event_groups())?;
        let commands = NetlinkSocket::open(SocketRole::Command, 0)?;

        if config.recv_buffer_size > 0 {
            events.set_recv_buffer_size(config.recv_buffer_size);
        }

        if let Err(e) = filter::install(events.as_raw_fd(), commands.pid()) {
            tracing::warn!(
                socket = events.role().label(),
                error = %e,
                "can't install socket filter"
            );
        }

        Ok(Self::from_parts(events, commands, config, sink))
    }
}

impl<S: NotificationSink, T: Transport> KernelSync<S, T> {
    /// Assemble a context from already-open transports.
    pub fn from_parts(events: T, commands: T, config: &KernelConfig, sink: S) -> Self {
        Self {
            events,
            commands: Connection::new(commands).with_timeout(config.command_timeout),
            reconciler: Reconciler::new(sink).with_link_detect(config.link_detect),
            ipv6: config.ipv6,
        }
    }

    pub fn table(&self) -> &InterfaceTable {
        self.reconciler.table()
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.reconciler.sink_mut()
    }

    /// The event socket.
    pub fn events(&self) -> &T {
        &self.events
    }

    /// The command channel.
    pub fn commands(&self) -> &Connection<T> {
        &self.commands
    }

    /// Load the initial snapshot: links, then IPv4 addresses, then IPv6
    /// addresses if enabled. Any failure is returned; the caller cannot run
    /// without the snapshot.
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.dump(NlMsgType::RTM_GETLINK, family::AF_PACKET).await?;
        self.dump(NlMsgType::RTM_GETADDR, family::AF_INET).await?;
        if self.ipv6 {
            self.dump(NlMsgType::RTM_GETADDR, family::AF_INET6).await?;
        }
        tracing::info!(
            interfaces = self.table().active().count(),
            "interface snapshot loaded"
        );
        Ok(())
    }

    async fn dump(&mut self, msg_type: u16, family: u8) -> Result<()> {
        let report = self
            .commands
            .request_and_await(msg_type, family, &mut self.reconciler)
            .await?;
        tracing::debug!(
            msg_type = message_type_name(msg_type),
            family,
            dispatched = report.dispatched,
            "dump complete"
        );
        Ok(())
    }

    /// Process every event datagram that is ready now.
    pub async fn read_events(&mut self) -> Result<PumpReport> {
        Pump::new(&self.events, self.commands.socket().pid())
            .run(&mut self.reconciler)
            .await
    }

    /// Service the event socket until it fails for good.
    ///
    /// Each readiness wakeup is followed by exactly one pump pass. Only
    /// faults that leave the socket unusable end the loop.
    pub async fn run(&mut self) -> Result<()> {
        let label = self.events.role().label();
        loop {
            self.events.readable().await?;
            match self.read_events().await {
                Ok(report) => {
                    if let Some(e) = report.last_error {
                        tracing::debug!(socket = label, error = %e, "event pass had faults");
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::error!(socket = label, error = %e, "event pass failed"),
            }
        }
    }

    /// Ask the kernel to configure `addr` on `iface`.
    ///
    /// The address already being present counts as success.
    pub async fn add_address(&self, iface: &Interface, addr: &ConnectedAddress) -> Result<()> {
        let builder = address_request(NlMsgType::RTM_NEWADDR, iface, addr)?;
        self.commands.talk(builder).await
    }

    /// Ask the kernel to remove `addr` from `iface`.
    ///
    /// The address or interface already being gone counts as success.
    pub async fn delete_address(&self, iface: &Interface, addr: &ConnectedAddress) -> Result<()> {
        let builder = address_request(NlMsgType::RTM_DELADDR, iface, addr)?;
        self.commands.talk(builder).await
    }
}

/// Build an RTM_NEWADDR or RTM_DELADDR request for `addr` on `iface`.
pub fn address_request(
    msg_type: u16,
    iface: &Interface,
    addr: &ConnectedAddress,
) -> Result<MessageBuilder> {
    let adding = msg_type == NlMsgType::RTM_NEWADDR;
    let mut flags = NLM_F_REQUEST;
    if adding {
        flags |= NLM_F_CREATE | NLM_F_EXCL;
    }

    let mut builder = MessageBuilder::new(msg_type, flags);
    let mut ifaddr = IfAddrMsg::new()
        .with_family(addr.family())
        .with_prefixlen(addr.prefix_len)
        .with_index(iface.index);
    if addr.secondary {
        ifaddr = ifaddr.with_flags(ifa_flags::SECONDARY);
    }
    builder.append(&ifaddr)?;

    builder.append_attr(IfaAttr::Local.into(), &octets(addr.local))?;

    if let Some(dst) = addr.destination {
        if addr.peer {
            builder.append_attr(IfaAttr::Address.into(), &octets(dst))?;
        } else if adding && dst.is_ipv4() {
            builder.append_attr(IfaAttr::Broadcast.into(), &octets(dst))?;
        }
    }

    if let Some(label) = &addr.label {
        builder.append_attr_str(IfaAttr::Label.into(), label)?;
    }

    Ok(builder)
}

fn octets(addr: IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}
