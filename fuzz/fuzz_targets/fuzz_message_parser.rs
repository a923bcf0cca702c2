#![no_main]

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use snmp_trapd::message::SnmpV3Message;
use snmp_trapd::v3::{AuthProtocol, EngineCache, PrivProtocol, SecurityEngine, UsmUser, find_auth_params};
use snmp_trapd::{Metrics, RawDatagram, TrapPipeline, TrapStateStore};

fn pipeline() -> &'static TrapPipeline {
    static PIPELINE: OnceLock<TrapPipeline> = OnceLock::new();
    PIPELINE.get_or_init(|| {
        let user = UsmUser::builder("fuzz")
            .auth(AuthProtocol::Sha1, "authpass123")
            .privacy(PrivProtocol::Aes128, "privpass123")
            .build()
            .unwrap();
        let security = SecurityEngine::new(Bytes::from_static(b"\x80\x00\x00\x00\x05fuzz"), 1, Instant::now())
            .with_user(user)
            .with_engine_learning(true);
        TrapPipeline::new(
            security,
            Arc::new(EngineCache::default()),
            Arc::new(TrapStateStore::new()),
            Arc::new(Metrics::new()),
        )
    })
}

fuzz_target!(|data: &[u8]| {
    let bytes = Bytes::copy_from_slice(data);

    let _ = SnmpV3Message::decode(bytes.clone());
    let _ = find_auth_params(&bytes);

    // Full pipeline: decode, engine lookup, authentication, decryption
    let datagram = RawDatagram::new(bytes, "192.0.2.1:162".parse().unwrap());
    let _ = pipeline().process(&datagram, Instant::now());
});
