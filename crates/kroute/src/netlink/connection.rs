//! Request/reply driver for the command socket.

use std::time::Duration;

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NlMsgType, message_type_name};
use super::messages::{AddressMessage, DecodedMessage, LinkMessage};
use super::pump::{Change, Pump, PumpReport, RtHandler};
use super::socket::{NetlinkSocket, Transport};
use super::types::RtGenMsg;

/// How long a command waits for its reply unless configured otherwise.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether a kernel error for `request` is a harmless ordering overlap.
///
/// Deleting something that is already gone (ENODEV, ESRCH) and adding
/// something that already exists (EEXIST) leave the kernel in the state the
/// request asked for.
pub fn is_benign_race(request: u16, errno: i32) -> bool {
    match request {
        NlMsgType::RTM_DELROUTE | NlMsgType::RTM_DELADDR | NlMsgType::RTM_DELLINK => {
            matches!(errno, libc::ENODEV | libc::ESRCH)
        }
        NlMsgType::RTM_NEWROUTE | NlMsgType::RTM_NEWADDR | NlMsgType::RTM_NEWLINK => {
            errno == libc::EEXIST
        }
        _ => false,
    }
}

/// Build a "give me everything" request for `msg_type` and `family`.
pub fn dump_request(msg_type: u16, family: u8) -> Result<MessageBuilder> {
    let mut builder = MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP);
    builder.append(&RtGenMsg::new(family))?;
    Ok(builder)
}

/// Handler for replies to commands: data messages are not expected there.
struct TalkFilter {
    socket: &'static str,
}

impl TalkFilter {
    fn ignore(&self, msg_type: u16) -> Result<()> {
        tracing::warn!(
            socket = self.socket,
            msg_type = message_type_name(msg_type),
            "ignoring message type {}",
            msg_type
        );
        Ok(())
    }
}

impl RtHandler for TalkFilter {
    fn handle_link(&mut self, change: Change, _link: &LinkMessage<'_>) -> Result<()> {
        self.ignore(match change {
            Change::New => NlMsgType::RTM_NEWLINK,
            Change::Del => NlMsgType::RTM_DELLINK,
        })
    }

    fn handle_address(&mut self, change: Change, _addr: &AddressMessage<'_>) -> Result<()> {
        self.ignore(match change {
            Change::New => NlMsgType::RTM_NEWADDR,
            Change::Del => NlMsgType::RTM_DELADDR,
        })
    }

    fn handle_other(&mut self, msg: &DecodedMessage<'_>) -> Result<()> {
        self.ignore(msg.msg_type())
    }
}

/// Command channel: sends one request at a time and pumps until it is
/// answered.
pub struct Connection<T = NetlinkSocket> {
    socket: T,
    timeout: Option<Duration>,
}

impl<T: Transport> Connection<T> {
    /// Wrap a command-role transport, with the default reply timeout.
    pub fn new(socket: T) -> Self {
        Self {
            socket,
            timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        }
    }

    /// Bound the wait for each reply; `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &T {
        &self.socket
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Send a dump request and feed every reply to `handler`.
    pub async fn request_and_await<H: RtHandler + ?Sized>(
        &self,
        msg_type: u16,
        family: u8,
        handler: &mut H,
    ) -> Result<PumpReport> {
        let builder = dump_request(msg_type, family)?;
        self.exchange(builder, handler).await
    }

    /// Send a command with an acknowledgement request and wait for the ACK.
    ///
    /// Kernel errors come back as [`Error::KernelCommand`], except benign
    /// races which count as success.
    pub async fn talk(&self, mut builder: MessageBuilder) -> Result<()> {
        builder.add_flags(NLM_F_ACK);
        let mut filter = TalkFilter {
            socket: self.socket.role().label(),
        };
        self.exchange(builder, &mut filter).await?;
        Ok(())
    }

    async fn exchange<H: RtHandler + ?Sized>(
        &self,
        mut builder: MessageBuilder,
        handler: &mut H,
    ) -> Result<PumpReport> {
        let label = self.socket.role().label();
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());
        let msg_type = builder.msg_type();

        tracing::debug!(
            socket = label,
            msg_type = message_type_name(msg_type),
            seq,
            "netlink_talk"
        );

        let msg = builder.finish();
        let round_trip = async {
            self.socket.send(&msg).await.inspect_err(|e| {
                tracing::error!(socket = label, error = %e, "send failed");
            })?;
            Pump::new(&self.socket, self.socket.pid())
                .expect_seq(seq)
                .run(handler)
                .await
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, round_trip)
                .await
                .map_err(|_| {
                    tracing::error!(
                        socket = label,
                        msg_type = message_type_name(msg_type),
                        seq,
                        "no reply within {:?}",
                        limit
                    );
                    Error::Timeout { socket: label }
                })?,
            None => round_trip.await,
        }
    }
}
