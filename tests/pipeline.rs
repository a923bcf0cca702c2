//! End-to-end pipeline tests without sockets: encoded device traffic in,
//! store entries and counters out.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use common::*;
use snmp_trapd::v3::auth::verify_message;
use snmp_trapd::v3::{
    AuthProtocol, EngineCache, EngineOrigin, PrivProtocol, SecurityEngine, find_auth_params,
    report_oids,
};
use snmp_trapd::{
    AuthErrorKind, Disposition, Error, Metrics, RawDatagram, ReplayErrorKind, SnmpV3Message,
    TrapKind, TrapPipeline, TrapStateStore, Value, VarBind,
};

fn pipeline_with(learn: bool, known: &[Bytes]) -> TrapPipeline {
    let started = Instant::now();
    let security = all_users().into_iter().fold(
        SecurityEngine::new(Bytes::from_static(LOCAL_ENGINE_ID), 1, started)
            .with_engine_learning(learn),
        SecurityEngine::with_user,
    );
    let engines = Arc::new(EngineCache::default());
    for id in known {
        engines.pin(id.clone(), started);
    }
    TrapPipeline::new(
        security,
        engines,
        Arc::new(TrapStateStore::new()),
        Arc::new(Metrics::new()),
    )
}

fn from(data: Bytes) -> RawDatagram {
    RawDatagram::new(data, "192.0.2.44:51000".parse().unwrap())
}

fn published(disposition: Disposition) -> snmp_trapd::TrapKey {
    match disposition {
        Disposition::Published { key, .. } => key,
        other => panic!("expected published trap, got {:?}", other),
    }
}

#[test]
fn trap_roundtrip_every_security_level() {
    let users = all_users();
    let known: Vec<Bytes> = (0..users.len() as u32).map(device_engine_id).collect();
    let pipeline = pipeline_with(false, &known);
    let now = Instant::now();

    for (n, user) in users.into_iter().enumerate() {
        let level = user.security_level();
        let device = Device::new(known[n].clone(), user);
        let varbinds = link_down_varbinds(n as u32 + 1);

        let key = published(
            pipeline
                .process(&from(device.trap(100 + n as i32, varbinds.clone())), now)
                .unwrap_or_else(|e| panic!("{level}: {e}")),
        );
        let trap = pipeline.store().get(&key).unwrap();
        assert_eq!(trap.varbinds, varbinds, "{level}");
        assert_eq!(trap.request_id, 100 + n as i32);
        assert_eq!(trap.engine_id, known[n]);
        assert_eq!(&trap.user_name, device.user.name());
        assert_eq!(trap.kind, TrapKind::Trap);
    }

    assert_eq!(pipeline.store().len(), 5);
    assert_eq!(pipeline.metrics().snapshot().decoded, 5);
}

#[test]
fn tampered_varbind_fails_authentication() {
    let engine = device_engine_id(1);
    let pipeline = pipeline_with(false, std::slice::from_ref(&engine));
    let device = Device::new(engine, auth_user(AuthProtocol::Md5));

    let marker = b"interface ge-0/0/3 down";
    let mut varbinds = link_down_varbinds(3);
    varbinds.push(VarBind::new(
        snmp_trapd::oid!(1, 3, 6, 1, 4, 1, 9999, 1),
        Value::OctetString(Bytes::from_static(marker)),
    ));
    let message = device.trap(7, varbinds);
    let start = message
        .windows(marker.len())
        .position(|w| w == marker)
        .expect("marker in plaintext scoped PDU");

    let now = Instant::now();
    for byte in start..start + marker.len() {
        for bit in 0..8 {
            let mut tampered = message.to_vec();
            tampered[byte] ^= 1 << bit;
            let err = pipeline.process(&from(tampered.into()), now).unwrap_err();
            assert!(
                matches!(
                    err,
                    Error::AuthenticationFailed {
                        kind: AuthErrorKind::HmacMismatch
                    }
                ),
                "byte {byte} bit {bit}: {err}"
            );
        }
    }
    assert!(pipeline.store().is_empty());
    assert_eq!(
        pipeline.metrics().snapshot().auth_failed,
        marker.len() as u64 * 8
    );

    // Untouched message still verifies
    pipeline.process(&from(message), now).unwrap();
}

#[test]
fn anti_replay_window() {
    let engine = device_engine_id(9);
    let pipeline = pipeline_with(false, std::slice::from_ref(&engine));
    let device = Device::new(engine.clone(), priv_user(PrivProtocol::Aes128));
    let now = Instant::now();
    let send = |boots, time| {
        device.set_clock(boots, time);
        pipeline.process(&from(device.trap(1, link_down_varbinds(1))), now)
    };

    // First verified message sets the baseline of a configured engine
    send(5, 1000).unwrap();
    send(5, 850).unwrap();
    assert!(matches!(
        send(5, 849).unwrap_err(),
        Error::ClockSkewRejected {
            kind: ReplayErrorKind::OutsideWindow { .. }
        }
    ));
    send(5, 1150).unwrap();
    send(5, 1000).unwrap();

    // Reboot resets the baseline
    send(6, 3).unwrap();
    let record = pipeline.engines().lookup(&engine, now).unwrap();
    assert_eq!(record.engine_boots, 6);
    assert_eq!(record.engine_time, 3);
    assert!(matches!(
        send(5, 1000).unwrap_err(),
        Error::ClockSkewRejected {
            kind: ReplayErrorKind::BootsRegressed {
                recorded: 6,
                received: 5
            }
        }
    ));

    let m = pipeline.metrics().snapshot();
    assert_eq!(m.replay_rejected, 2);
    assert_eq!(m.decoded, 5);
}

#[test]
fn window_tracks_elapsed_time() {
    let engine = device_engine_id(10);
    let pipeline = pipeline_with(false, std::slice::from_ref(&engine));
    let device = Device::new(engine, auth_user(AuthProtocol::Sha1));
    let start = Instant::now();

    device.set_clock(2, 500);
    pipeline
        .process(&from(device.trap(1, link_down_varbinds(1))), start)
        .unwrap();

    // Ten minutes later the device clock has moved on by the same amount
    let later = start + Duration::from_secs(600);
    device.set_clock(2, 1100);
    pipeline
        .process(&from(device.trap(2, link_down_varbinds(1))), later)
        .unwrap();

    // A replay of the original time is now far outside the window
    device.set_clock(2, 500);
    assert!(
        pipeline
            .process(&from(device.trap(3, link_down_varbinds(1))), later)
            .is_err()
    );
}

#[test]
fn unknown_engine_rejected_unless_learning() {
    let engine = device_engine_id(20);
    let device = Device::new(engine.clone(), auth_user(AuthProtocol::Sha1));
    let message = device.trap(1, link_down_varbinds(1));
    let now = Instant::now();

    let strict = pipeline_with(false, &[]);
    assert!(matches!(
        strict.process(&from(message.clone()), now).unwrap_err(),
        Error::UnknownEngine { .. }
    ));
    assert_eq!(strict.metrics().snapshot().unknown_engine, 1);
    assert!(strict.engines().is_empty());

    let learning = pipeline_with(true, &[]);
    learning.process(&from(message), now).unwrap();
    let record = learning.engines().lookup(&engine, now).unwrap();
    assert_eq!(record.origin, EngineOrigin::Learned);
    assert_eq!(record.engine_time, 1000);
}

#[test]
fn learning_ignores_unverified_messages() {
    let engine = device_engine_id(21);
    let pipeline = pipeline_with(true, &[]);
    let wrong_password = snmp_trapd::UsmUser::builder(users::AUTHSHA1_USER)
        .auth(AuthProtocol::Sha1, "not-the-password")
        .build()
        .unwrap();
    let device = Device::new(engine.clone(), wrong_password);

    let err = pipeline
        .process(&from(device.trap(1, link_down_varbinds(1))), Instant::now())
        .unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed { .. }));
    assert!(pipeline.engines().is_empty());
}

#[test]
fn wrong_privacy_password_is_a_privacy_failure() {
    let engine = device_engine_id(22);
    let pipeline = pipeline_with(false, std::slice::from_ref(&engine));
    let impostor = snmp_trapd::UsmUser::builder(users::PRIVDES_USER)
        .auth(AuthProtocol::Sha1, AUTH_PASSWORD)
        .privacy(PrivProtocol::Des, "wrong-privpass")
        .build()
        .unwrap();
    let device = Device::new(engine, impostor);

    let err = pipeline
        .process(&from(device.trap(1, link_down_varbinds(1))), Instant::now())
        .unwrap_err();
    assert!(matches!(err, Error::PrivacyDecryptFailed { .. }), "{err}");
    assert_eq!(pipeline.metrics().snapshot().priv_failed, 1);
}

#[test]
fn discovery_probe_gets_report() {
    let pipeline = pipeline_with(false, &[]);
    let disposition = pipeline
        .process(&from(discovery_probe(31337)), Instant::now())
        .unwrap();
    let Disposition::Discovery { reply: report } = disposition else {
        panic!("expected a report, got {:?}", disposition);
    };

    let report = SnmpV3Message::decode(report).unwrap();
    assert_eq!(report.msg_id(), 31337);
    assert!(!report.security_params.engine_id.is_empty());
    assert_eq!(report.security_params.engine_id.as_ref(), LOCAL_ENGINE_ID);
    assert_eq!(report.security_params.engine_boots, 1);

    let scoped = report.scoped_pdu().unwrap();
    assert_eq!(scoped.pdu.name(), "Report");
    assert_eq!(scoped.pdu.request_id, 31337);
    assert_eq!(scoped.pdu.varbinds[0].oid, report_oids::unknown_engine_ids());
    assert_eq!(scoped.pdu.varbinds[0].value, Value::Counter32(1));

    assert_eq!(pipeline.engines().len(), 1);
    assert_eq!(pipeline.metrics().snapshot().discovery_reports, 1);
}

#[test]
fn inform_after_discovery_uses_receiver_engine() {
    let pipeline = pipeline_with(false, &[]);
    let now = Instant::now();

    let Disposition::Discovery { reply } = pipeline
        .process(&from(discovery_probe(8)), now)
        .unwrap()
    else {
        panic!("expected a report");
    };
    let report = SnmpV3Message::decode(reply).unwrap();
    let params = &report.security_params;

    // Second pass: the device sends under our engine ID and clock
    let device = Device::new(params.engine_id.clone(), priv_user(PrivProtocol::Aes128));
    device.set_clock(params.engine_boots, params.engine_time);
    let disposition = pipeline
        .process(&from(device.inform(21, link_down_varbinds(6))), now)
        .unwrap();
    let Disposition::Published { key, reply: Some(reply) } = disposition else {
        panic!("expected an acknowledged inform, got {:?}", disposition);
    };
    assert_eq!(key.engine_id.as_ref(), LOCAL_ENGINE_ID);
    assert_eq!(pipeline.store().get(&key).unwrap().kind, TrapKind::Inform);

    let keys = device.user.localize(LOCAL_ENGINE_ID).unwrap();
    let (offset, len) = find_auth_params(&reply).unwrap();
    verify_message(keys.auth().unwrap(), &reply, offset, len).unwrap();
    let response = SnmpV3Message::decode(reply).unwrap();
    assert_eq!(response.security_params.engine_id.as_ref(), LOCAL_ENGINE_ID);

    // Our own record never takes the sender's clock
    device.set_clock(params.engine_boots, params.engine_time + 100);
    pipeline
        .process(&from(device.inform(22, link_down_varbinds(6))), now)
        .unwrap();
    let record = pipeline.engines().lookup(LOCAL_ENGINE_ID, now).unwrap();
    assert_eq!(record.origin, EngineOrigin::Local);
    assert_eq!(record.engine_boots, params.engine_boots);
    assert!(record.engine_time < params.engine_time + 100);

    device.set_clock(params.engine_boots - 1, params.engine_time);
    assert!(matches!(
        pipeline
            .process(&from(device.inform(23, link_down_varbinds(6))), now)
            .unwrap_err(),
        Error::ClockSkewRejected {
            kind: ReplayErrorKind::BootsRegressed { .. }
        }
    ));
}

#[test]
fn inform_is_acknowledged_under_device_keys() {
    let engine = device_engine_id(40);
    let pipeline = pipeline_with(false, std::slice::from_ref(&engine));
    let device = Device::new(engine.clone(), auth_user(AuthProtocol::Md5));

    let disposition = pipeline
        .process(&from(device.inform(55, link_down_varbinds(4))), Instant::now())
        .unwrap();
    let Disposition::Published { key, reply: Some(reply) } = disposition else {
        panic!("expected an acknowledged inform, got {:?}", disposition);
    };
    assert_eq!(pipeline.store().get(&key).unwrap().kind, TrapKind::Inform);

    let keys = device.user.localize(&engine).unwrap();
    let (offset, len) = find_auth_params(&reply).unwrap();
    verify_message(keys.auth().unwrap(), &reply, offset, len).unwrap();

    let response = SnmpV3Message::decode(reply).unwrap();
    let pdu = &response.scoped_pdu().unwrap().pdu;
    assert_eq!(pdu.name(), "Response");
    assert_eq!(pdu.request_id, 55);
    assert_eq!(pdu.varbinds, link_down_varbinds(4));
}

#[test]
fn noauth_message_for_auth_user_rejected() {
    let pipeline = pipeline_with(false, &[]);
    // Claims to be the SHA user but sends without authentication
    let spoofed = snmp_trapd::UsmUser::builder(users::AUTHSHA1_USER)
        .build()
        .unwrap();
    let device = Device::new(device_engine_id(50), spoofed);

    let err = pipeline
        .process(&from(device.trap(1, link_down_varbinds(1))), Instant::now())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::AuthenticationFailed {
            kind: AuthErrorKind::MissingAuthentication
        }
    ));
}

#[test]
fn last_write_wins_per_device() {
    let engine = device_engine_id(60);
    let pipeline = pipeline_with(false, std::slice::from_ref(&engine));
    let device = Device::new(engine, priv_user(PrivProtocol::Des));
    let now = Instant::now();

    for id in 1..=3 {
        pipeline
            .process(&from(device.trap(id, link_down_varbinds(id as u32))), now)
            .unwrap();
    }
    let snapshot = pipeline.store().snapshot();
    assert_eq!(snapshot.len(), 1);
    let trap = snapshot.values().next().unwrap();
    assert_eq!(trap.request_id, 3);
    assert_eq!(trap.varbinds, link_down_varbinds(3));
}
