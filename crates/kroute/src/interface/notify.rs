//! Lifecycle notifications for the routing protocol.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::{ConnectedAddress, Interface};

/// Something the routing protocol needs to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Notification {
    InterfaceAdded(Interface),
    InterfaceUp(Interface),
    InterfaceDown(Interface),
    InterfaceDeleted(Interface),
    AddressAdded(ConnectedAddress),
    AddressDeleted(ConnectedAddress),
}

impl Notification {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::InterfaceAdded(_) => "interface_added",
            Notification::InterfaceUp(_) => "interface_up",
            Notification::InterfaceDown(_) => "interface_down",
            Notification::InterfaceDeleted(_) => "interface_deleted",
            Notification::AddressAdded(_) => "address_added",
            Notification::AddressDeleted(_) => "address_deleted",
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::InterfaceAdded(i)
            | Notification::InterfaceUp(i)
            | Notification::InterfaceDown(i)
            | Notification::InterfaceDeleted(i) => write!(f, "{} {}", self.name(), i),
            Notification::AddressAdded(a) | Notification::AddressDeleted(a) => {
                write!(f, "{} {}", self.name(), a)
            }
        }
    }
}

/// Receiver of notifications. Must not block.
pub trait NotificationSink {
    fn notify(&mut self, notification: Notification);
}

impl NotificationSink for Vec<Notification> {
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}

impl NotificationSink for UnboundedSender<Notification> {
    fn notify(&mut self, notification: Notification) {
        if let Err(e) = self.send(notification) {
            tracing::debug!(event = e.0.name(), "notification receiver is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink() {
        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.notify(Notification::InterfaceUp(Interface::new("eth0")));
        let got = rx.try_recv().unwrap();
        assert_eq!(got.name(), "interface_up");

        drop(rx);
        // A closed channel is not an error for the sender.
        tx.notify(Notification::InterfaceDown(Interface::new("eth0")));
    }
}
