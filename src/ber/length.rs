//! BER length encoding and decoding.
//!
//! Length encoding follows X.690 Section 8.1.3:
//! - Short form: one octet, bit 8 clear, value 0-127
//! - Long form: initial octet `0x80 | n` followed by n big-endian length octets
//! - Indefinite form (0x80): rejected, SNMP requires definite lengths

use crate::error::{DecodeErrorKind, Error, Result};

/// Largest length the decoder accepts.
///
/// No UDP datagram comes close; anything larger is corrupt or hostile.
pub const MAX_LENGTH: usize = 0x200000; // 2MB

/// Most length octets accepted in the long form.
const MAX_LENGTH_OCTETS: usize = 4;

/// Encode a length, returning octets in reverse order for the reverse encode buffer.
pub fn encode_length(len: usize) -> ([u8; 5], usize) {
    let mut buf = [0u8; 5];

    if len <= 127 {
        buf[0] = len as u8;
        return (buf, 1);
    }

    let mut n = 0;
    let mut rest = len;
    while rest > 0 && n < MAX_LENGTH_OCTETS {
        buf[n] = rest as u8;
        rest >>= 8;
        n += 1;
    }
    buf[n] = 0x80 | n as u8;
    (buf, n + 1)
}

/// Decode a length from the start of `data`, returning (length, octets consumed).
///
/// `base_offset` is the absolute position of `data[0]`, used for error reporting.
pub fn decode_length(data: &[u8], base_offset: usize) -> Result<(usize, usize)> {
    let Some(&first) = data.first() else {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    };

    if first == 0x80 {
        return Err(Error::decode(base_offset, DecodeErrorKind::IndefiniteLength));
    }

    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let num_octets = (first & 0x7F) as usize;
    if num_octets > MAX_LENGTH_OCTETS {
        return Err(Error::decode(
            base_offset,
            DecodeErrorKind::LengthTooLong { octets: num_octets },
        ));
    }

    let Some(octets) = data.get(1..=num_octets) else {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    };

    // Non-minimal long forms are permitted by X.690 8.1.3.5
    let len = octets
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);

    if len > MAX_LENGTH {
        return Err(Error::decode(
            base_offset,
            DecodeErrorKind::LengthExceedsMax {
                length: len,
                max: MAX_LENGTH,
            },
        ));
    }

    Ok((len, 1 + num_octets))
}
