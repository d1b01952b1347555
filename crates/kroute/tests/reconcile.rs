//! Reconciler behaviour driven through the public codec API.
//!
//! Frames are built with `MessageBuilder`, framed with `MessageIter` and fed
//! through `dispatch`, the same path the message pump takes.

use kroute::interface::Reconciler;
use kroute::netlink::types::{IfAddrMsg, IfInfoMsg, IfaAttr, IflaAttr, family, iff};
use kroute::netlink::{DecodedMessage, MessageBuilder, MessageIter, NlMsgType, dispatch};
use kroute::{Error, Notification};

type Rec = Reconciler<Vec<Notification>>;

fn link(msg_type: u16, index: i32, name: &str, flags: u32) -> Vec<u8> {
    let mut b = MessageBuilder::new(msg_type, 0);
    b.append(
        &IfInfoMsg::new()
            .with_index(index)
            .with_flags(flags)
            .with_change(0xffff_ffff),
    )
    .unwrap();
    b.append_attr_str(IflaAttr::Ifname.into(), name).unwrap();
    b.append_attr_u32(IflaAttr::Mtu.into(), 1500).unwrap();
    b.append_attr(IflaAttr::Address.into(), &[0x02, 0, 0, 0, 0, index as u8])
        .unwrap();
    b.finish()
}

fn addr(msg_type: u16, index: u32, local: [u8; 4], prefix: u8) -> Vec<u8> {
    let mut b = MessageBuilder::new(msg_type, 0);
    b.append(
        &IfAddrMsg::new()
            .with_family(family::AF_INET)
            .with_prefixlen(prefix)
            .with_index(index),
    )
    .unwrap();
    b.append_attr(IfaAttr::Local.into(), &local).unwrap();
    b.finish()
}

/// Feed every frame in `buf`, collecting per-message results.
fn feed(rec: &mut Rec, buf: &[u8]) -> Vec<Result<(), Error>> {
    MessageIter::new(buf)
        .map(|frame| {
            let (header, payload) = frame?;
            dispatch(rec, &DecodedMessage::new(header, payload))
        })
        .collect()
}

fn events(rec: &mut Rec) -> Vec<&'static str> {
    rec.sink_mut().drain(..).map(|n| n.name()).collect()
}

#[test]
fn test_snapshot_from_one_datagram() {
    let mut rec = Reconciler::new(Vec::new());
    let datagram = [
        link(NlMsgType::RTM_NEWLINK, 1, "lo", iff::UP | iff::LOOPBACK | iff::RUNNING),
        link(NlMsgType::RTM_NEWLINK, 2, "eth0", iff::UP | iff::RUNNING),
        addr(NlMsgType::RTM_NEWADDR, 1, [127, 0, 0, 1], 8),
        addr(NlMsgType::RTM_NEWADDR, 2, [192, 168, 1, 10], 24),
    ]
    .concat();

    assert!(feed(&mut rec, &datagram).iter().all(Result::is_ok));
    assert_eq!(
        events(&mut rec),
        vec![
            "interface_added",
            "interface_up",
            "interface_added",
            "interface_up",
            "address_added",
            "address_added",
        ]
    );

    let table = rec.table();
    assert_eq!(table.active().count(), 2);
    assert!(table.get("lo").unwrap().is_loopback());
    assert_eq!(table.by_index(2).unwrap().name, "eth0");
    assert_eq!(
        table.get("eth0").unwrap().hardware_address.as_deref(),
        Some(&[0x02, 0, 0, 0, 0, 2][..])
    );
    assert_eq!(table.addresses("eth0")[0].to_string(), "192.168.1.10/24 on eth0");
}

#[test]
fn test_bad_message_does_not_stop_the_rest() {
    let mut rec = Reconciler::new(Vec::new());
    let datagram = [
        addr(NlMsgType::RTM_NEWADDR, 5, [10, 0, 0, 1], 24),
        link(NlMsgType::RTM_NEWLINK, 5, "eth1", iff::UP),
        addr(NlMsgType::RTM_NEWADDR, 5, [10, 0, 0, 1], 24),
    ]
    .concat();

    let results = feed(&mut rec, &datagram);
    assert!(matches!(results[0], Err(Error::UnknownInterface { index: 5 })));
    assert!(results[1].is_ok());
    assert!(results[2].is_ok());
    assert_eq!(rec.table().addresses("eth1").len(), 1);
}

#[test]
fn test_interface_lifecycle() {
    let mut rec = Reconciler::new(Vec::new());
    feed(&mut rec, &link(NlMsgType::RTM_NEWLINK, 3, "eth1", iff::UP));
    feed(&mut rec, &addr(NlMsgType::RTM_NEWADDR, 3, [10, 1, 0, 1], 16));
    feed(&mut rec, &link(NlMsgType::RTM_NEWLINK, 3, "eth1", 0));
    feed(&mut rec, &addr(NlMsgType::RTM_DELADDR, 3, [10, 1, 0, 1], 16));
    feed(&mut rec, &link(NlMsgType::RTM_DELLINK, 3, "eth1", 0));
    feed(&mut rec, &link(NlMsgType::RTM_NEWLINK, 8, "eth1", iff::UP));

    assert_eq!(
        events(&mut rec),
        vec![
            "interface_added",
            "interface_up",
            "address_added",
            "interface_down",
            "address_deleted",
            "interface_deleted",
            "interface_added",
            "interface_up",
        ]
    );
    assert_eq!(rec.table().len(), 1);
    assert!(rec.table().by_index(3).is_none());
    assert_eq!(rec.table().get("eth1").unwrap().index, 8);
}

#[test]
fn test_table_serializes() {
    let mut rec = Reconciler::new(Vec::new());
    feed(&mut rec, &link(NlMsgType::RTM_NEWLINK, 2, "eth0", iff::UP | iff::RUNNING));
    feed(&mut rec, &addr(NlMsgType::RTM_NEWADDR, 2, [10, 0, 0, 1], 24));

    let json = serde_json::to_value(rec.table()).unwrap();
    let eth0 = &json[0];
    assert_eq!(eth0["name"], "eth0");
    assert_eq!(eth0["index"], 2);
    assert_eq!(eth0["hardware_address"], "02:00:00:00:00:02");
    assert_eq!(eth0["flags"], "<UP,RUNNING>");
    assert_eq!(eth0["addresses"][0]["local"], "10.0.0.1");

    let event = serde_json::to_value(&rec.sink()[0]).unwrap();
    assert_eq!(event["event"], "interface_added");
    assert_eq!(event["data"]["name"], "eth0");
}
