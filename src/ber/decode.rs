//! BER decoding.
//!
//! Two layers: a [`Decoder`] cursor that reads TLVs one at a time without
//! copying, and [`decode`], which turns a whole buffer into a [`BerValue`]
//! tree in a single forward pass.

use bytes::Bytes;

use super::length::decode_length;
use super::tag;
use super::value::BerValue;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;

/// Deepest nesting of constructed values accepted by [`decode`].
///
/// A trap is message → scopedPDU → PDU → varbind list → varbind, so real
/// traffic stays well below this.
pub const MAX_DEPTH: usize = 32;

/// Decode exactly one BER value occupying all of `data`.
///
/// Trailing bytes after the top-level TLV are an error.
pub fn decode(data: Bytes) -> Result<BerValue> {
    let mut decoder = Decoder::new(data);
    let value = decoder.read_value()?;
    if !decoder.is_empty() {
        return Err(decoder.fail(
            decoder.position(),
            DecodeErrorKind::TrailingData {
                remaining: decoder.remaining(),
            },
        ));
    }
    Ok(value)
}

/// Decode one BER value from the start of `data`, returning it with the
/// number of bytes consumed.
///
/// Block-cipher plaintext carries padding after the scoped PDU; this is the
/// entry point for that case.
pub fn decode_prefix(data: Bytes) -> Result<(BerValue, usize)> {
    let mut decoder = Decoder::new(data);
    let value = decoder.read_value()?;
    Ok((value, decoder.position()))
}

/// BER cursor that reads from a byte buffer.
///
/// Sub-decoders remember their absolute position in the original buffer so
/// errors always report offsets into the datagram.
pub struct Decoder {
    data: Bytes,
    offset: usize,
    base: usize,
}

impl Decoder {
    /// Create a new decoder from bytes.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            offset: 0,
            base: 0,
        }
    }

    /// Create a decoder from a byte slice (copies the data).
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Offset within this decoder's buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Absolute offset within the outermost buffer.
    pub fn position(&self) -> usize {
        self.base + self.offset
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Check if we've reached the end.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    fn fail(&self, at: usize, kind: DecodeErrorKind) -> Error {
        tracing::debug!(
            target: "snmp_trapd::ber",
            { snmp.offset = at, kind = %kind },
            "BER decode failed"
        );
        Error::decode(at, kind)
    }

    /// Read a tag byte.
    pub fn read_tag(&mut self) -> Result<u8> {
        let Some(tag) = self.peek_tag() else {
            return Err(self.fail(self.position(), DecodeErrorKind::TruncatedData));
        };
        // High-tag-number form never appears in SNMP
        if tag & 0x1F == 0x1F {
            return Err(self.fail(self.position(), DecodeErrorKind::UnknownTag(tag)));
        }
        self.offset += 1;
        Ok(tag)
    }

    /// Read a length.
    pub fn read_length(&mut self) -> Result<usize> {
        let (len, consumed) = decode_length(&self.data[self.offset..], self.position())?;
        self.offset += consumed;
        Ok(len)
    }

    /// Read raw bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        // saturating_add keeps a huge len from wrapping past the bounds check
        if self.offset.saturating_add(len) > self.data.len() {
            return Err(self.fail(self.position(), DecodeErrorKind::TlvOverflow));
        }
        let bytes = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(bytes)
    }

    /// Read and expect a specific tag, returning the content length.
    pub fn expect_tag(&mut self, expected: u8) -> Result<usize> {
        let at = self.position();
        let tag = self.read_tag()?;
        if tag != expected {
            return Err(self.fail(at, DecodeErrorKind::UnexpectedTag { expected, actual: tag }));
        }
        self.read_length()
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let len = self.expect_tag(tag::universal::OCTET_STRING)?;
        self.read_bytes(len)
    }

    /// Read a SEQUENCE, returning a decoder for its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        let len = self.expect_tag(tag::universal::SEQUENCE)?;
        self.sub_decoder(len)
    }

    /// Skip a TLV (tag-length-value) without parsing.
    pub fn skip_tlv(&mut self) -> Result<()> {
        self.read_tag()?;
        let len = self.read_length()?;
        self.read_bytes(len)?;
        Ok(())
    }

    /// Create a sub-decoder for the next `len` bytes.
    pub fn sub_decoder(&mut self, len: usize) -> Result<Decoder> {
        let base = self.position();
        let data = self.read_bytes(len)?;
        Ok(Decoder {
            data,
            offset: 0,
            base,
        })
    }

    /// Read one complete value, recursing into constructed types.
    pub fn read_value(&mut self) -> Result<BerValue> {
        self.read_value_at_depth(0)
    }

    fn read_value_at_depth(&mut self, depth: usize) -> Result<BerValue> {
        if depth > MAX_DEPTH {
            return Err(self.fail(
                self.position(),
                DecodeErrorKind::NestingTooDeep { max: MAX_DEPTH },
            ));
        }

        let tag_at = self.position();
        let tag = self.read_tag()?;
        let len = self.read_length()?;
        let content_at = self.position();

        match tag {
            tag::universal::SEQUENCE => {
                let items = self.sub_decoder(len)?.read_items(depth)?;
                Ok(BerValue::Sequence(items))
            }
            t if t & 0xE0 == 0xA0 => {
                let items = self.sub_decoder(len)?.read_items(depth)?;
                Ok(BerValue::Constructed { tag: t, items })
            }
            tag::universal::INTEGER => {
                let content = self.read_bytes(len)?;
                decode_integer(&content)
                    .map(BerValue::Integer)
                    .map_err(|kind| self.fail(content_at, kind))
            }
            tag::universal::OCTET_STRING => Ok(BerValue::OctetString(self.read_bytes(len)?)),
            tag::universal::NULL => {
                if len != 0 {
                    return Err(self.fail(content_at, DecodeErrorKind::InvalidNull));
                }
                Ok(BerValue::Null)
            }
            tag::universal::OBJECT_IDENTIFIER => {
                let content = self.read_bytes(len)?;
                Oid::from_ber_at(&content, content_at)
                    .map(BerValue::ObjectIdentifier)
                    .inspect_err(|e| {
                        tracing::debug!(target: "snmp_trapd::ber", error = %e, "BER decode failed");
                    })
            }
            tag::application::COUNTER32 | tag::application::GAUGE32 | tag::application::TIMETICKS => {
                let content = self.read_bytes(len)?;
                decode_unsigned(&content, 5, u32::MAX as u64)
                    .map(|value| BerValue::Unsigned { tag, value })
                    .map_err(|kind| self.fail(content_at, kind))
            }
            tag::application::COUNTER64 => {
                let content = self.read_bytes(len)?;
                decode_unsigned(&content, 9, u64::MAX)
                    .map(|value| BerValue::Unsigned { tag, value })
                    .map_err(|kind| self.fail(content_at, kind))
            }
            tag::application::IP_ADDRESS => {
                if len != 4 {
                    return Err(self.fail(
                        content_at,
                        DecodeErrorKind::InvalidIpAddressLength { length: len },
                    ));
                }
                let b = self.read_bytes(4)?;
                Ok(BerValue::IpAddress([b[0], b[1], b[2], b[3]]))
            }
            tag::application::OPAQUE => Ok(BerValue::Opaque(self.read_bytes(len)?)),
            tag::context::NO_SUCH_OBJECT
            | tag::context::NO_SUCH_INSTANCE
            | tag::context::END_OF_MIB_VIEW => {
                if len != 0 {
                    return Err(self.fail(content_at, DecodeErrorKind::InvalidNull));
                }
                Ok(BerValue::Exception(tag))
            }
            tag::universal::OCTET_STRING_CONSTRUCTED => {
                Err(self.fail(tag_at, DecodeErrorKind::ConstructedOctetString))
            }
            other => Err(self.fail(tag_at, DecodeErrorKind::UnknownTag(other))),
        }
    }

    fn read_items(mut self, depth: usize) -> Result<Vec<BerValue>> {
        let mut items = Vec::new();
        while !self.is_empty() {
            items.push(self.read_value_at_depth(depth + 1)?);
        }
        Ok(items)
    }
}

/// Two's-complement INTEGER content, at most 8 octets.
fn decode_integer(content: &[u8]) -> std::result::Result<i64, DecodeErrorKind> {
    if content.is_empty() {
        return Err(DecodeErrorKind::ZeroLengthInteger);
    }
    if content.len() > 8 {
        return Err(DecodeErrorKind::IntegerOverflow);
    }
    let init: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    Ok(content
        .iter()
        .fold(init, |acc, &b| (acc << 8) | i64::from(b)))
}

/// Unsigned content of at most `max_octets` octets (one leading zero allowed).
fn decode_unsigned(
    content: &[u8],
    max_octets: usize,
    max_value: u64,
) -> std::result::Result<u64, DecodeErrorKind> {
    if content.is_empty() {
        return Err(DecodeErrorKind::ZeroLengthInteger);
    }
    if content.len() > max_octets {
        return Err(DecodeErrorKind::IntegerOverflow);
    }
    let digits = match content {
        [0, rest @ ..] => rest,
        all => all,
    };
    if digits.len() > 8 {
        return Err(DecodeErrorKind::IntegerOverflow);
    }
    let value = digits.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    if value > max_value {
        return Err(DecodeErrorKind::IntegerOverflow);
    }
    Ok(value)
}
