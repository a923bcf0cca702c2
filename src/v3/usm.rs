//! USM security parameters (RFC 3414 Section 2.4).
//!
//! ```text
//! UsmSecurityParameters ::= SEQUENCE {
//!     msgAuthoritativeEngineID     OCTET STRING,
//!     msgAuthoritativeEngineBoots  INTEGER (0..2147483647),
//!     msgAuthoritativeEngineTime   INTEGER (0..2147483647),
//!     msgUserName                  OCTET STRING (SIZE(0..32)),
//!     msgAuthenticationParameters  OCTET STRING,
//!     msgPrivacyParameters         OCTET STRING
//! }
//! ```

use bytes::Bytes;

use crate::ber::{BerValue, Decoder, EncodeBuf, tag};
use crate::error::{Error, ProtocolErrorKind, Result};

/// Longest engine ID permitted by RFC 3411 (SnmpEngineID SIZE(5..32)).
pub const MAX_ENGINE_ID_LEN: usize = 32;
/// Longest user name permitted by RFC 3414.
pub const MAX_USER_NAME_LEN: usize = 32;

/// USM security parameters carried in msgSecurityParameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsmSecurityParams {
    pub engine_id: Bytes,
    pub engine_boots: u32,
    pub engine_time: u32,
    pub username: Bytes,
    pub auth_params: Bytes,
    pub priv_params: Bytes,
}

impl UsmSecurityParams {
    pub fn new(
        engine_id: impl Into<Bytes>,
        engine_boots: u32,
        engine_time: u32,
        username: impl Into<Bytes>,
    ) -> Self {
        Self {
            engine_id: engine_id.into(),
            engine_boots,
            engine_time,
            username: username.into(),
            auth_params: Bytes::new(),
            priv_params: Bytes::new(),
        }
    }

    pub fn with_priv_params(mut self, priv_params: impl Into<Bytes>) -> Self {
        self.priv_params = priv_params.into();
        self
    }

    /// Zero-filled authParameters, overwritten with the MAC after encoding.
    pub fn with_auth_placeholder(mut self, mac_len: usize) -> Self {
        self.auth_params = Bytes::from(vec![0u8; mac_len]);
        self
    }

    /// Encode the inner SEQUENCE (the content of msgSecurityParameters).
    pub fn encode_to_buf(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_octet_string(&self.priv_params);
            buf.push_octet_string(&self.auth_params);
            buf.push_octet_string(&self.username);
            buf.push_integer(i64::from(self.engine_time));
            buf.push_integer(i64::from(self.engine_boots));
            buf.push_octet_string(&self.engine_id);
        });
    }

    /// Interpret the decoded content of msgSecurityParameters.
    pub fn from_ber(value: &BerValue) -> Result<Self> {
        let items = value.as_sequence().ok_or(Error::protocol(ProtocolErrorKind::WrongType {
            field: "msgSecurityParameters",
        }))?;
        let [engine_id, boots, time, username, auth, privacy] = items else {
            return Err(Error::protocol(ProtocolErrorKind::WrongElementCount {
                what: "UsmSecurityParameters",
                expected: 6,
                actual: items.len(),
            }));
        };

        let engine_id = bounded_octets(engine_id, "msgAuthoritativeEngineID", MAX_ENGINE_ID_LEN)?;
        let username = bounded_octets(username, "msgUserName", MAX_USER_NAME_LEN)?;

        Ok(Self {
            engine_id,
            engine_boots: non_negative_i32(boots, "msgAuthoritativeEngineBoots")?,
            engine_time: non_negative_i32(time, "msgAuthoritativeEngineTime")?,
            username,
            auth_params: octets(auth, "msgAuthenticationParameters")?,
            priv_params: octets(privacy, "msgPrivacyParameters")?,
        })
    }
}

fn octets(value: &BerValue, field: &'static str) -> Result<Bytes> {
    value
        .as_octet_string()
        .cloned()
        .ok_or(Error::protocol(ProtocolErrorKind::WrongType { field }))
}

fn bounded_octets(value: &BerValue, field: &'static str, max: usize) -> Result<Bytes> {
    let bytes = octets(value, field)?;
    if bytes.len() > max {
        return Err(Error::protocol(ProtocolErrorKind::FieldTooLong {
            field,
            length: bytes.len(),
            max,
        }));
    }
    Ok(bytes)
}

/// INTEGER (0..2147483647) as u32.
pub(crate) fn non_negative_i32(value: &BerValue, field: &'static str) -> Result<u32> {
    let v = value
        .as_integer()
        .ok_or(Error::protocol(ProtocolErrorKind::WrongType { field }))?;
    if !(0..=i64::from(i32::MAX)).contains(&v) {
        return Err(Error::protocol(ProtocolErrorKind::OutOfRange { field, value: v }));
    }
    Ok(v as u32)
}

/// Locate msgAuthenticationParameters content within an encoded message.
///
/// Returns (offset, length) of the content octets, for zeroing before the
/// HMAC is computed. Walks the TLVs with a cursor instead of the decoded
/// tree so the offsets refer to the exact bytes received.
pub fn find_auth_params(message: &Bytes) -> Result<(usize, usize)> {
    let mut outer = Decoder::new(message.clone());
    let mut msg = outer.read_sequence()?;
    msg.skip_tlv()?; // msgVersion
    msg.skip_tlv()?; // msgGlobalData

    let len = msg.expect_tag(tag::universal::OCTET_STRING)?;
    let mut sec = msg.sub_decoder(len)?;
    let mut usm = sec.read_sequence()?;
    usm.skip_tlv()?; // engineID
    usm.skip_tlv()?; // boots
    usm.skip_tlv()?; // time
    usm.skip_tlv()?; // userName

    let len = usm.expect_tag(tag::universal::OCTET_STRING)?;
    let start = usm.position();
    usm.read_bytes(len)?;
    Ok((start, len))
}
