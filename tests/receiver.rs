//! Trap receiver over real UDP sockets on loopback.

mod common;

use std::time::Duration;

use bytes::Bytes;
use common::*;
use snmp_trapd::v3::{AuthProtocol, PrivProtocol, report_oids};
use snmp_trapd::{Error, SnmpV3Message, TrapKind, TrapReceiver, Value};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start(receiver: &TrapReceiver) -> JoinHandle<snmp_trapd::Result<()>> {
    let receiver = receiver.clone();
    tokio::spawn(async move { receiver.run().await })
}

async fn device_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn recv_reply(socket: &UdpSocket) -> Bytes {
    let mut buf = vec![0u8; 65535];
    let (len, _) = tokio::time::timeout(TIMEOUT, socket.recv_from(&mut buf))
        .await
        .expect("reply within timeout")
        .unwrap();
    Bytes::copy_from_slice(&buf[..len])
}

async fn wait_for_entries(receiver: &TrapReceiver, count: usize) {
    tokio::time::timeout(TIMEOUT, async {
        while receiver.store().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("store populated within timeout");
}

fn builder() -> snmp_trapd::TrapReceiverBuilder {
    TrapReceiver::builder()
        .bind("127.0.0.1:0".parse().unwrap())
        .engine_id(Bytes::from_static(LOCAL_ENGINE_ID))
        .workers(2)
        .queue_capacity(64)
        .usm_user(users::PRIVAES128_USER, |u| {
            u.auth(AuthProtocol::Sha1, AUTH_PASSWORD)
                .privacy(PrivProtocol::Aes128, PRIV_PASSWORD)
        })
        .usm_user(users::AUTHMD5_USER, |u| u.auth(AuthProtocol::Md5, AUTH_PASSWORD))
}

#[tokio::test]
async fn trap_published_over_udp() {
    let engine = device_engine_id(1);
    let receiver = builder().known_engine(engine.clone()).build().await.unwrap();
    let run = start(&receiver).await;

    let device = Device::new(engine.clone(), priv_user(PrivProtocol::Aes128));
    let socket = device_socket().await;
    socket
        .send_to(&device.trap(9, link_down_varbinds(2)), receiver.local_addr())
        .await
        .unwrap();

    wait_for_entries(&receiver, 1).await;
    let snapshot = receiver.store().snapshot();
    let trap = snapshot.values().next().unwrap();
    assert_eq!(trap.source, socket.local_addr().unwrap());
    assert_eq!(trap.engine_id, engine);
    assert_eq!(trap.varbinds, link_down_varbinds(2));

    receiver.cancel().cancel();
    tokio::time::timeout(TIMEOUT, run).await.unwrap().unwrap().unwrap();
    assert_eq!(receiver.metrics().decoded, 1);
}

#[tokio::test]
async fn inform_gets_response() {
    let engine = device_engine_id(2);
    let receiver = builder().known_engine(engine.clone()).build().await.unwrap();
    let run = start(&receiver).await;

    let device = Device::new(engine, auth_user(AuthProtocol::Md5));
    let socket = device_socket().await;
    socket
        .send_to(&device.inform(77, link_down_varbinds(1)), receiver.local_addr())
        .await
        .unwrap();

    let response = SnmpV3Message::decode(recv_reply(&socket).await).unwrap();
    let pdu = &response.scoped_pdu().unwrap().pdu;
    assert_eq!(pdu.name(), "Response");
    assert_eq!(pdu.request_id, 77);

    wait_for_entries(&receiver, 1).await;
    let snapshot = receiver.store().snapshot();
    assert_eq!(snapshot.values().next().unwrap().kind, TrapKind::Inform);

    receiver.cancel().cancel();
    tokio::time::timeout(TIMEOUT, run).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn discovery_over_udp() {
    let receiver = builder().build().await.unwrap();
    let run = start(&receiver).await;

    let socket = device_socket().await;
    socket
        .send_to(&discovery_probe(4242), receiver.local_addr())
        .await
        .unwrap();

    let report = SnmpV3Message::decode(recv_reply(&socket).await).unwrap();
    assert_eq!(report.msg_id(), 4242);
    assert_eq!(report.security_params.engine_id.as_ref(), LOCAL_ENGINE_ID);
    let vb = &report.scoped_pdu().unwrap().pdu.varbinds[0];
    assert_eq!(vb.oid, report_oids::unknown_engine_ids());
    assert!(matches!(vb.value, Value::Counter32(1)));
    assert_eq!(receiver.engines().len(), 1);

    receiver.cancel().cancel();
    tokio::time::timeout(TIMEOUT, run).await.unwrap().unwrap().unwrap();
    assert_eq!(receiver.metrics().discovery_reports, 1);
}

#[tokio::test]
async fn rejected_traffic_is_counted_not_fatal() {
    let engine = device_engine_id(3);
    let receiver = builder().known_engine(engine.clone()).build().await.unwrap();
    let run = start(&receiver).await;
    let socket = device_socket().await;
    let target = receiver.local_addr();

    // Garbage, a v2c trap-shaped datagram, and a trap from an unknown engine
    socket.send_to(&[0x30, 0x80, 0x00], target).await.unwrap();
    socket
        .send_to(&[0x30, 0x05, 0x02, 0x01, 0x01, 0x04, 0x00], target)
        .await
        .unwrap();
    let stranger = Device::new(device_engine_id(99), auth_user(AuthProtocol::Md5));
    socket
        .send_to(&stranger.trap(1, link_down_varbinds(1)), target)
        .await
        .unwrap();

    // Then a good one, which proves the receiver is still running
    let device = Device::new(engine, auth_user(AuthProtocol::Md5));
    socket
        .send_to(&device.trap(2, link_down_varbinds(1)), target)
        .await
        .unwrap();
    wait_for_entries(&receiver, 1).await;

    receiver.cancel().cancel();
    tokio::time::timeout(TIMEOUT, run).await.unwrap().unwrap().unwrap();

    let m = receiver.metrics();
    assert_eq!(m.decoded, 1);
    assert_eq!(m.malformed, 1);
    assert_eq!(m.legacy_dropped, 1);
    assert_eq!(m.unknown_engine, 1);
}

#[tokio::test]
async fn build_rejects_bad_config() {
    let err = builder().workers(0).build().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    let err = builder()
        .usm_user("bad", |u| u.privacy(PrivProtocol::Des, PRIV_PASSWORD))
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn generated_engine_id_when_unset() {
    let receiver = TrapReceiver::builder()
        .bind("127.0.0.1:0".parse().unwrap())
        .build()
        .await
        .unwrap();
    assert!(receiver.engine_id().len() >= 5);
    assert_eq!(receiver.engine_id()[0], 0x80);
    assert_ne!(receiver.local_addr().port(), 0);
}
