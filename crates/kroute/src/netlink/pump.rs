//! Message pump: reads datagrams, handles ACK/error/done frames and hands
//! data messages to a handler.

use super::connection::is_benign_race;
use super::error::{Error, Result};
use super::message::{MessageIter, MessageKind, NLMSG_HDRLEN, NlMsgError, message_type_name};
use super::messages::{AddressMessage, DecodedMessage, LinkMessage, RtMessage};
use super::socket::{Datagram, SOCKADDR_NL_LEN, SocketRole, Transport, closed};

/// Whether a message announces or withdraws an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    New,
    Del,
}

/// Consumer of decoded link and address messages.
pub trait RtHandler {
    fn handle_link(&mut self, change: Change, link: &LinkMessage<'_>) -> Result<()>;

    fn handle_address(&mut self, change: Change, addr: &AddressMessage<'_>) -> Result<()>;

    /// Any other data message (route notifications and the like).
    fn handle_other(&mut self, msg: &DecodedMessage<'_>) -> Result<()> {
        tracing::warn!(
            msg_type = msg.type_name(),
            seq = msg.seq(),
            pid = msg.pid(),
            "unknown netlink message type {}",
            msg.msg_type()
        );
        Ok(())
    }
}

/// Decode `msg` and route it to the matching handler method.
pub fn dispatch<H: RtHandler + ?Sized>(handler: &mut H, msg: &DecodedMessage<'_>) -> Result<()> {
    match msg.decode()? {
        RtMessage::NewLink(link) => handler.handle_link(Change::New, &link),
        RtMessage::DelLink(link) => handler.handle_link(Change::Del, &link),
        RtMessage::NewAddress(addr) => handler.handle_address(Change::New, &addr),
        RtMessage::DelAddress(addr) => handler.handle_address(Change::Del, &addr),
        RtMessage::Other(other) => handler.handle_other(&other),
    }
}

/// What a successful pump pass saw.
#[derive(Debug, Default)]
pub struct PumpReport {
    /// Data messages handed to the handler.
    pub dispatched: usize,
    /// Last error recorded for a single message; never stops the pass.
    pub last_error: Option<Error>,
}

impl PumpReport {
    fn record(&mut self, err: Error) {
        self.last_error = Some(err);
    }
}

/// One pass of the message pump over a transport.
///
/// On the event socket the pass drains every ready datagram and returns when
/// the socket would block. On the command socket it waits for replies until
/// an ACK, an error or the end of a multipart dump.
pub struct Pump<'a, T> {
    socket: &'a T,
    command_pid: u32,
    expect_seq: Option<u32>,
}

impl<'a, T: Transport> Pump<'a, T> {
    /// Pump `socket`. `command_pid` is the command socket's port id; event
    /// messages stamped with it are our own echoes and are skipped.
    pub fn new(socket: &'a T, command_pid: u32) -> Self {
        Self {
            socket,
            command_pid,
            expect_seq: None,
        }
    }

    /// Only accept replies to the request with this sequence number.
    pub fn expect_seq(mut self, seq: u32) -> Self {
        self.expect_seq = Some(seq);
        self
    }

    /// Run the pass.
    pub async fn run<H: RtHandler + ?Sized>(self, handler: &mut H) -> Result<PumpReport> {
        let role = self.socket.role();
        let label = role.label();
        let mut report = PumpReport::default();

        loop {
            let datagram = match role {
                SocketRole::Event => match self.socket.try_recv()? {
                    Some(dg) => dg,
                    None => return Ok(report),
                },
                SocketRole::Command => self.socket.recv().await?,
            };

            if datagram.data.is_empty() {
                tracing::error!(socket = label, "EOF");
                return Err(closed(role));
            }

            if datagram.addr_len != SOCKADDR_NL_LEN {
                tracing::error!(
                    socket = label,
                    len = datagram.addr_len,
                    "sender address length error"
                );
                return Err(Error::AddressLength {
                    socket: label,
                    len: datagram.addr_len,
                });
            }

            if datagram.truncated {
                tracing::warn!(socket = label, "message truncated");
                continue;
            }

            if role == SocketRole::Event && datagram.sender_pid != 0 {
                tracing::error!(
                    socket = label,
                    pid = datagram.sender_pid,
                    "ignoring non kernel message"
                );
                continue;
            }

            if self.process(&datagram, handler, &mut report)? {
                return Ok(report);
            }
        }
    }

    /// Handle every frame of one datagram. Returns true when the pass is over.
    fn process<H: RtHandler + ?Sized>(
        &self,
        datagram: &Datagram,
        handler: &mut H,
        report: &mut PumpReport,
    ) -> Result<bool> {
        let role = self.socket.role();
        let label = role.label();
        let mut frames = MessageIter::new(&datagram.data);

        for frame in frames.by_ref() {
            let (header, payload) = match frame {
                Ok(f) => f,
                Err(e) => {
                    tracing::error!(socket = label, error = %e, "bad message framing");
                    report.record(e);
                    return Ok(false);
                }
            };
            let msg = DecodedMessage::new(header, payload);

            if let Some(seq) = self.expect_seq
                && role == SocketRole::Command
                && msg.seq() != seq
            {
                tracing::debug!(
                    socket = label,
                    msg_type = msg.type_name(),
                    seq = msg.seq(),
                    expected = seq,
                    "skipping reply to an earlier request"
                );
                continue;
            }

            match msg.kind() {
                MessageKind::Done => return Ok(true),
                MessageKind::Error => {
                    self.error_frame(&msg)?;
                    if msg.header().is_multi() {
                        continue;
                    }
                    return Ok(true);
                }
                _ => {}
            }

            if role == SocketRole::Event && msg.pid() == self.command_pid {
                tracing::debug!(
                    socket = label,
                    msg_type = msg.type_name(),
                    "ignoring message from our command socket"
                );
                continue;
            }

            tracing::debug!(
                socket = label,
                msg_type = msg.type_name(),
                len = header.nlmsg_len,
                seq = msg.seq(),
                pid = msg.pid(),
                "parsing message"
            );

            report.dispatched += 1;
            if let Err(e) = dispatch(handler, &msg) {
                tracing::error!(
                    socket = label,
                    msg_type = msg.type_name(),
                    error = %e,
                    "message dropped"
                );
                report.record(e);
            }
        }

        if frames.remainder() != 0 {
            tracing::error!(socket = label, size = frames.remainder(), "remnant of size");
            report.record(Error::Truncated {
                expected: NLMSG_HDRLEN,
                actual: frames.remainder(),
            });
        }

        Ok(false)
    }

    /// Classify an error frame. `Ok` means ACK or tolerated race.
    fn error_frame(&self, msg: &DecodedMessage<'_>) -> Result<()> {
        let role = self.socket.role();
        let label = role.label();

        let err = match NlMsgError::from_bytes(msg.payload()) {
            Ok(err) => err,
            Err(e) => {
                tracing::error!(socket = label, "error message truncated");
                return Err(e);
            }
        };

        if err.is_ack() {
            tracing::debug!(
                socket = label,
                msg_type = message_type_name(err.msg.nlmsg_type),
                seq = err.msg.nlmsg_seq,
                pid = err.msg.nlmsg_pid,
                "ACK"
            );
            return Ok(());
        }

        let request = err.msg.nlmsg_type;
        let Some(errno) = err.error.checked_neg() else {
            tracing::error!(socket = label, error = err.error, "error code out of range");
            return Err(Error::InvalidMessage(format!(
                "error code {} out of range",
                err.error
            )));
        };
        if role == SocketRole::Command && is_benign_race(request, errno) {
            tracing::debug!(
                socket = label,
                msg_type = message_type_name(request),
                errno,
                seq = err.msg.nlmsg_seq,
                "tolerating race: {}",
                std::io::Error::from_raw_os_error(errno)
            );
            return Ok(());
        }

        let failure = match role {
            SocketRole::Command => Error::from_command_errno(err.error, request),
            SocketRole::Event => Error::from_errno(err.error),
        };
        tracing::error!(
            socket = label,
            msg_type = message_type_name(request),
            errno,
            seq = err.msg.nlmsg_seq,
            pid = err.msg.nlmsg_pid,
            "{}",
            failure
        );
        Err(failure)
    }
}
