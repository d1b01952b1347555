//! Real NETLINK_ROUTE sockets in the current network namespace.
//!
//! Opening route sockets, dumping state and attaching a socket filter need
//! no privileges, so these run everywhere Linux does.

use std::net::{IpAddr, Ipv4Addr};
use std::os::fd::AsRawFd;

use kroute::netlink::{NetlinkSocket, SocketRole, Transport, filter, groups};
use kroute::{KernelConfig, KernelSync, Notification};

fn config() -> KernelConfig {
    KernelConfig {
        recv_buffer_size: 256 * 1024,
        ..KernelConfig::default()
    }
}

#[tokio::test]
async fn test_bootstrap_finds_loopback() {
    let mut sync = KernelSync::open(&config(), Vec::<Notification>::new()).unwrap();
    sync.bootstrap().await.unwrap();

    let lo = sync.table().get("lo").expect("lo missing after link dump");
    assert!(lo.active);
    assert_eq!(lo.index, 1);
    assert!(lo.is_loopback());
    assert_eq!(sync.table().by_index(1).unwrap().name, "lo");

    // A fresh namespace keeps lo down and unaddressed.
    if lo.is_up() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(
            sync.table()
                .addresses("lo")
                .iter()
                .any(|a| a.local == loopback && a.prefix_len == 8),
            "127.0.0.1/8 missing on lo: {:?}",
            sync.table().addresses("lo")
        );
    }
}

#[tokio::test]
async fn test_sockets_get_distinct_port_ids() {
    let sync = KernelSync::open(&config(), Vec::<Notification>::new()).unwrap();
    let events = sync.events();
    let commands = sync.commands().socket();

    assert_ne!(events.pid(), 0);
    assert_ne!(commands.pid(), 0);
    assert_ne!(events.pid(), commands.pid());
    assert_eq!(events.role(), SocketRole::Event);
    assert_eq!(events.groups(), groups::event_groups(true));
    assert_eq!(commands.groups(), 0);
}

#[tokio::test]
async fn test_filter_attaches_to_event_socket() {
    let events = NetlinkSocket::open(SocketRole::Event, groups::event_groups(false)).unwrap();
    let commands = NetlinkSocket::open(SocketRole::Command, 0).unwrap();
    filter::install(events.as_raw_fd(), commands.pid()).unwrap();
}

#[tokio::test]
async fn test_idle_event_socket_yields_empty_pass() {
    let mut sync = KernelSync::open(&config(), Vec::<Notification>::new()).unwrap();
    let report = sync.read_events().await.unwrap();
    assert!(report.last_error.is_none());
}
