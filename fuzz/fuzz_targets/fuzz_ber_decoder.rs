#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use snmp_trapd::ber::{Decoder, decode, decode_prefix};
use snmp_trapd::value::Value;
use snmp_trapd::varbind::VarBind;

fuzz_target!(|data: &[u8]| {
    let bytes = Bytes::copy_from_slice(data);

    // Whole-buffer and prefix decoding
    if let Ok(tree) = decode(bytes.clone()) {
        let _ = Value::from_ber(&tree);
        let _ = VarBind::from_ber(&tree);
    }
    if let Ok((_, consumed)) = decode_prefix(bytes.clone()) {
        assert!(consumed <= data.len());
    }

    // Cursor primitives
    let mut decoder = Decoder::new(bytes);
    while !decoder.is_empty() {
        if decoder.read_value().is_err() {
            break;
        }
        assert!(decoder.position() <= data.len());
    }
});
