//! Property-based tests for the decoder and the security pipeline.
//!
//! Decoder properties run on arbitrary and mutated input and only require
//! that nothing panics and that every failure is a typed error. Pipeline
//! properties encode traffic as a device would and check what survives.

mod common;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use common::*;
use proptest::prelude::*;
use snmp_trapd::ber::{Decoder, decode};
use snmp_trapd::oid::Oid;
use snmp_trapd::v3::{AuthProtocol, EngineCache, PrivProtocol, SecurityEngine};
use snmp_trapd::{
    Disposition, Error, Metrics, RawDatagram, SnmpV3Message, TrapPipeline, TrapStateStore, Value,
    VarBind,
};

// =============================================================================
// Strategies
// =============================================================================

/// OIDs under 1.3.6.1, which always round-trip through BER.
fn arb_oid() -> impl Strategy<Value = Oid> {
    prop::collection::vec(any::<u32>(), 0..=16).prop_map(|rest| {
        let mut arcs = vec![1, 3, 6, 1];
        arcs.extend(rest);
        Oid::from_slice(&arcs)
    })
}

fn arb_bytes() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=128).prop_map(Bytes::from)
}

/// Values a device may put in a notification.
fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(|v| Value::Integer(v.into())),
        arb_bytes().prop_map(Value::OctetString),
        Just(Value::Null),
        arb_oid().prop_map(Value::ObjectIdentifier),
        any::<[u8; 4]>().prop_map(Value::IpAddress),
        any::<u32>().prop_map(Value::Counter32),
        any::<u32>().prop_map(Value::Gauge32),
        any::<u32>().prop_map(Value::TimeTicks),
        arb_bytes().prop_map(Value::Opaque),
        any::<u64>().prop_map(Value::Counter64),
    ]
}

fn arb_varbinds() -> impl Strategy<Value = Vec<VarBind>> {
    prop::collection::vec(
        (arb_oid(), arb_value()).prop_map(|(oid, value)| VarBind::new(oid, value)),
        0..=12,
    )
}

fn pipeline(engine: &Bytes) -> TrapPipeline {
    let now = Instant::now();
    let security = all_users().into_iter().fold(
        SecurityEngine::new(Bytes::from_static(LOCAL_ENGINE_ID), 1, now),
        SecurityEngine::with_user,
    );
    let engines = Arc::new(EngineCache::default());
    engines.pin(engine.clone(), now);
    TrapPipeline::new(
        security,
        engines,
        Arc::new(TrapStateStore::new()),
        Arc::new(Metrics::new()),
    )
}

fn from(data: Bytes) -> RawDatagram {
    RawDatagram::new(data, "198.51.100.20:161".parse().unwrap())
}

fn is_typed_decode_failure(err: &Error) -> bool {
    matches!(
        err,
        Error::MalformedEncoding { .. } | Error::ProtocolViolation { .. }
    )
}

// =============================================================================
// Decoder robustness
// =============================================================================

proptest! {
    #[test]
    fn decode_arbitrary_bytes_never_panics(data in prop::collection::vec(any::<u8>(), 0..=512)) {
        let _ = decode(Bytes::from(data));
    }

    #[test]
    fn message_decode_arbitrary_bytes_is_typed(data in prop::collection::vec(any::<u8>(), 0..=512)) {
        if let Err(e) = SnmpV3Message::decode(Bytes::from(data)) {
            prop_assert!(is_typed_decode_failure(&e), "{}", e);
        }
    }

    #[test]
    fn sequence_prefixed_garbage_never_panics(body in prop::collection::vec(any::<u8>(), 0..=256)) {
        // A plausible outer header makes the decoder walk into the garbage
        let mut data = vec![0x30, 0x82, (body.len() >> 8) as u8, body.len() as u8];
        data.extend_from_slice(&body);
        let _ = SnmpV3Message::decode(Bytes::from(data));
    }

    #[test]
    fn decoder_cursor_stays_in_bounds(data in prop::collection::vec(any::<u8>(), 0..=256)) {
        let total = data.len();
        let mut decoder = Decoder::new(Bytes::from(data));
        while !decoder.is_empty() {
            if decoder.skip_tlv().is_err() {
                break;
            }
            prop_assert!(decoder.position() <= total);
        }
    }

    #[test]
    fn oid_ber_roundtrip(oid in arb_oid()) {
        let encoded = oid.to_ber();
        prop_assert_eq!(Oid::from_ber(&encoded).unwrap(), oid);
    }
}

// =============================================================================
// Pipeline properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn encrypted_trap_roundtrip(
        varbinds in arb_varbinds(),
        request_id in any::<i32>(),
        des in any::<bool>(),
    ) {
        let engine = device_engine_id(1);
        let protocol = if des { PrivProtocol::Des } else { PrivProtocol::Aes128 };
        let device = Device::new(engine.clone(), priv_user(protocol));
        let pipeline = pipeline(&engine);

        let disposition = pipeline
            .process(&from(device.trap(request_id, varbinds.clone())), Instant::now())
            .unwrap();
        let Disposition::Published { key, .. } = disposition else {
            return Err(TestCaseError::fail("trap not published"));
        };
        let trap = pipeline.store().get(&key).unwrap();
        prop_assert_eq!(trap.request_id, request_id);
        prop_assert_eq!(&trap.varbinds, &varbinds);
    }

    #[test]
    fn truncated_message_is_malformed(varbinds in arb_varbinds(), cut in any::<prop::sample::Index>()) {
        let engine = device_engine_id(2);
        let device = Device::new(engine.clone(), auth_user(AuthProtocol::Sha1));
        let message = device.trap(1, varbinds);
        let len = cut.index(message.len());

        let err = pipeline(&engine).process(&from(message.slice(..len)), Instant::now()).unwrap_err();
        prop_assert!(matches!(err, Error::MalformedEncoding { .. }), "{}", err);
    }

    #[test]
    fn any_bit_flip_is_rejected(varbinds in arb_varbinds(), at in any::<prop::sample::Index>(), bit in 0u8..8) {
        let engine = device_engine_id(3);
        let device = Device::new(engine.clone(), priv_user(PrivProtocol::Aes128));
        let mut message = device.trap(1, varbinds).to_vec();
        let byte = at.index(message.len());
        message[byte] ^= 1 << bit;

        let pipeline = pipeline(&engine);
        prop_assert!(pipeline.process(&from(message.into()), Instant::now()).is_err());
        prop_assert!(pipeline.store().is_empty());
    }
}
