//! Kernel synchronization engine for a routing daemon.
//!
//! Keeps an in-memory view of network interfaces and their addresses in step
//! with the Linux kernel over rtnetlink, and pushes address changes back.
//! Two sockets are used: one listens for kernel events, the other carries
//! dumps and commands.
//!
//! # Example
//!
//! ```ignore
//! use kroute::{KernelConfig, KernelSync};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> kroute::Result<()> {
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     let mut sync = KernelSync::open(&KernelConfig::default(), tx)?;
//!
//!     // Initial snapshot of links and addresses
//!     sync.bootstrap().await?;
//!     for iface in sync.table().active() {
//!         println!("{}", iface);
//!     }
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             println!("{}", event);
//!         }
//!     });
//!     sync.run().await
//! }
//! ```

pub mod config;
pub mod interface;
pub mod kernel;
pub mod netlink;

pub use config::KernelConfig;
pub use interface::{ConnectedAddress, Interface, InterfaceTable, Notification, NotificationSink};
pub use kernel::KernelSync;
pub use netlink::{Error, Result};
