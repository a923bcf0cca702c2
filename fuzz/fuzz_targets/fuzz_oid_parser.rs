#![no_main]

use libfuzzer_sys::fuzz_target;

use snmp_trapd::oid::Oid;

fuzz_target!(|data: &[u8]| {
    if let Ok(oid) = Oid::from_ber(data) {
        // Anything we accept must re-encode to something we accept
        let _ = Oid::from_ber(&oid.to_ber()).unwrap();
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = Oid::parse(s);
    }
});
