//! SNMPv3 message format (RFC 3412).
//!
//! ```text
//! SEQUENCE {
//!     INTEGER version (3)
//!     SEQUENCE msgGlobalData {
//!         INTEGER msgID
//!         INTEGER msgMaxSize
//!         OCTET STRING msgFlags (1 byte)
//!         INTEGER msgSecurityModel
//!     }
//!     OCTET STRING msgSecurityParameters (USM-encoded)
//!     msgData (ScopedPDU or encrypted OCTET STRING)
//! }
//! ```

use bytes::Bytes;

use super::pdu::Pdu;
use crate::ber::{BerValue, EncodeBuf, decode};
use crate::error::{Error, ProtocolErrorKind, Result};
use crate::v3::UsmSecurityParams;

/// msgVersion value for SNMPv3.
pub const SNMP_V3: i64 = 3;

/// msgSecurityModel value for USM.
pub const USM_SECURITY_MODEL: i64 = 3;

/// Smallest msgMaxSize a conforming engine may advertise.
pub const MIN_MSG_MAX_SIZE: i32 = 484;

/// msgMaxSize advertised in messages this receiver sends.
pub const LOCAL_MSG_MAX_SIZE: i32 = 65507;

/// SNMPv3 security level.
///
/// Ordered from least to most secure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecurityLevel {
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

impl SecurityLevel {
    /// Decode the auth/priv bits; privacy without authentication is invalid.
    pub fn from_flags(flags: u8) -> Option<Self> {
        match (flags & 0x01 != 0, flags & 0x02 != 0) {
            (false, false) => Some(Self::NoAuthNoPriv),
            (true, false) => Some(Self::AuthNoPriv),
            (true, true) => Some(Self::AuthPriv),
            (false, true) => None,
        }
    }

    pub fn to_flags(self) -> u8 {
        match self {
            Self::NoAuthNoPriv => 0x00,
            Self::AuthNoPriv => 0x01,
            Self::AuthPriv => 0x03,
        }
    }

    pub fn requires_auth(self) -> bool {
        self != Self::NoAuthNoPriv
    }

    pub fn requires_priv(self) -> bool {
        self == Self::AuthPriv
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoAuthNoPriv => "noAuthNoPriv",
            Self::AuthNoPriv => "authNoPriv",
            Self::AuthPriv => "authPriv",
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// msgFlags (RFC 3412 Section 6.4). Bits above the reportable flag are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgFlags {
    pub security_level: SecurityLevel,
    pub reportable: bool,
}

impl MsgFlags {
    pub fn new(security_level: SecurityLevel, reportable: bool) -> Self {
        Self {
            security_level,
            reportable,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        let security_level = SecurityLevel::from_flags(byte)
            .ok_or(Error::protocol(ProtocolErrorKind::PrivWithoutAuth))?;
        Ok(Self {
            security_level,
            reportable: byte & 0x04 != 0,
        })
    }

    pub fn to_byte(self) -> u8 {
        let mut flags = self.security_level.to_flags();
        if self.reportable {
            flags |= 0x04;
        }
        flags
    }
}

/// msgGlobalData header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgGlobalData {
    pub msg_id: i32,
    pub msg_max_size: i32,
    pub msg_flags: MsgFlags,
}

impl MsgGlobalData {
    pub fn new(msg_id: i32, msg_max_size: i32, msg_flags: MsgFlags) -> Self {
        Self {
            msg_id,
            msg_max_size,
            msg_flags,
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_integer(USM_SECURITY_MODEL);
            buf.push_octet_string(&[self.msg_flags.to_byte()]);
            buf.push_integer(i64::from(self.msg_max_size));
            buf.push_integer(i64::from(self.msg_id));
        });
    }

    /// Validates msgID (0..2^31-1), msgMaxSize (484..2^31-1), the one-octet
    /// msgFlags and the USM security model.
    pub fn from_ber(value: &BerValue) -> Result<Self> {
        let items = value.as_sequence().ok_or(Error::protocol(ProtocolErrorKind::WrongType {
            field: "msgGlobalData",
        }))?;
        let [msg_id, msg_max_size, flags, model] = items else {
            return Err(Error::protocol(ProtocolErrorKind::WrongElementCount {
                what: "msgGlobalData",
                expected: 4,
                actual: items.len(),
            }));
        };

        let msg_id = bounded_i32(msg_id, "msgID", 0)?;
        let msg_max_size = bounded_i32(msg_max_size, "msgMaxSize", MIN_MSG_MAX_SIZE)?;

        let flags = flags.as_octet_string().ok_or(Error::protocol(ProtocolErrorKind::WrongType {
            field: "msgFlags",
        }))?;
        let [flags] = flags[..] else {
            return Err(Error::protocol(ProtocolErrorKind::InvalidMsgFlagsLength {
                length: flags.len(),
            }));
        };
        let msg_flags = MsgFlags::from_byte(flags)?;

        let model = model.as_integer().ok_or(Error::protocol(ProtocolErrorKind::WrongType {
            field: "msgSecurityModel",
        }))?;
        if model != USM_SECURITY_MODEL {
            return Err(Error::protocol(ProtocolErrorKind::UnknownSecurityModel(model)));
        }

        Ok(Self {
            msg_id,
            msg_max_size,
            msg_flags,
        })
    }
}

fn bounded_i32(value: &BerValue, field: &'static str, min: i32) -> Result<i32> {
    let v = value
        .as_integer()
        .ok_or(Error::protocol(ProtocolErrorKind::WrongType { field }))?;
    if !(i64::from(min)..=i64::from(i32::MAX)).contains(&v) {
        return Err(Error::protocol(ProtocolErrorKind::OutOfRange { field, value: v }));
    }
    Ok(v as i32)
}

/// contextEngineID + contextName + PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedPdu {
    pub context_engine_id: Bytes,
    pub context_name: Bytes,
    pub pdu: Pdu,
}

impl ScopedPdu {
    pub fn new(context_engine_id: impl Into<Bytes>, context_name: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            context_engine_id: context_engine_id.into(),
            context_name: context_name.into(),
            pdu,
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.context_name);
            buf.push_octet_string(&self.context_engine_id);
        });
    }

    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        self.encode(&mut buf);
        buf.finish()
    }

    pub fn parse(value: &BerValue) -> Result<Self> {
        let items = value.as_sequence().ok_or(Error::protocol(ProtocolErrorKind::WrongType {
            field: "ScopedPDU",
        }))?;
        let [engine_id, name, pdu] = items else {
            return Err(Error::protocol(ProtocolErrorKind::WrongElementCount {
                what: "ScopedPDU",
                expected: 3,
                actual: items.len(),
            }));
        };
        let context_engine_id = engine_id.as_octet_string().cloned().ok_or(Error::protocol(
            ProtocolErrorKind::WrongType {
                field: "contextEngineID",
            },
        ))?;
        let context_name = name.as_octet_string().cloned().ok_or(Error::protocol(
            ProtocolErrorKind::WrongType {
                field: "contextName",
            },
        ))?;
        Ok(Self {
            context_engine_id,
            context_name,
            pdu: Pdu::from_ber(pdu)?,
        })
    }
}

/// msgData: plaintext scoped PDU or encryptedPDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopedPduData {
    Plaintext(ScopedPdu),
    Encrypted(Bytes),
}

/// A structurally valid SNMPv3 message, not yet authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpV3Message {
    pub global: MsgGlobalData,
    pub security_params: UsmSecurityParams,
    pub data: ScopedPduData,
}

impl SnmpV3Message {
    pub fn msg_id(&self) -> i32 {
        self.global.msg_id
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.global.msg_flags.security_level
    }

    pub fn is_reportable(&self) -> bool {
        self.global.msg_flags.reportable
    }

    pub fn scoped_pdu(&self) -> Option<&ScopedPdu> {
        match &self.data {
            ScopedPduData::Plaintext(scoped) => Some(scoped),
            ScopedPduData::Encrypted(_) => None,
        }
    }

    /// Engine discovery probe: noAuthNoPriv with an empty user name
    /// (RFC 3414 Section 4).
    pub fn is_discovery(&self) -> bool {
        self.security_level() == SecurityLevel::NoAuthNoPriv
            && self.security_params.username.is_empty()
    }

    /// Validate a decoded message tree.
    ///
    /// Versions 0 and 1 yield [`ProtocolErrorKind::LegacyVersion`] so the
    /// caller can route them to the legacy path. msgSecurityParameters is
    /// decoded with a second pass over its octets; decode errors there report
    /// offsets relative to the start of that field.
    pub fn parse(value: &BerValue) -> Result<Self> {
        let items = value.as_sequence().ok_or(Error::protocol(ProtocolErrorKind::WrongType {
            field: "SNMPv3Message",
        }))?;

        match items.first().and_then(BerValue::as_integer) {
            Some(SNMP_V3) => {}
            Some(v @ (0 | 1)) => return Err(Error::protocol(ProtocolErrorKind::LegacyVersion(v))),
            Some(v) => return Err(Error::protocol(ProtocolErrorKind::UnknownVersion(v))),
            None => {
                return Err(Error::protocol(ProtocolErrorKind::WrongType {
                    field: "msgVersion",
                }));
            }
        }

        let [_, global, security, data] = items else {
            return Err(Error::protocol(ProtocolErrorKind::WrongElementCount {
                what: "SNMPv3Message",
                expected: 4,
                actual: items.len(),
            }));
        };

        let global = MsgGlobalData::from_ber(global)?;

        let security = security.as_octet_string().ok_or(Error::protocol(
            ProtocolErrorKind::WrongType {
                field: "msgSecurityParameters",
            },
        ))?;
        let security_params = UsmSecurityParams::from_ber(&decode(security.clone())?)?;

        if global.msg_flags.security_level.requires_auth() && security_params.auth_params.is_empty()
        {
            return Err(Error::protocol(ProtocolErrorKind::EmptyAuthParams));
        }

        let data = match (global.msg_flags.security_level.requires_priv(), data) {
            (true, BerValue::OctetString(ciphertext)) => ScopedPduData::Encrypted(ciphertext.clone()),
            (false, BerValue::Sequence(_)) => ScopedPduData::Plaintext(ScopedPdu::parse(data)?),
            _ => return Err(Error::protocol(ProtocolErrorKind::ScopedPduMismatch)),
        };

        Ok(Self {
            global,
            security_params,
            data,
        })
    }

    /// Decode and validate raw datagram bytes.
    pub fn decode(data: Bytes) -> Result<Self> {
        Self::parse(&decode(data)?)
    }

    /// Encode as-is. authParameters are written verbatim, so authenticated
    /// messages are encoded with a zeroed placeholder and signed afterwards.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            match &self.data {
                ScopedPduData::Plaintext(scoped) => scoped.encode(buf),
                ScopedPduData::Encrypted(ciphertext) => buf.push_octet_string(ciphertext),
            }

            let mut security = EncodeBuf::new();
            self.security_params.encode_to_buf(&mut security);
            buf.push_octet_string(&security.finish());

            self.global.encode(buf);
            buf.push_integer(SNMP_V3);
        });
        buf.finish()
    }
}
