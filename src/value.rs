//! SNMP value types carried in trap varbinds.

use bytes::Bytes;

use crate::ber::{BerValue, EncodeBuf, tag};
use crate::error::{Error, ProtocolErrorKind, Result};
use crate::oid::Oid;
use crate::util::HexDisplay;

/// SNMP varbind value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Value {
    /// INTEGER
    Integer(i64),
    /// OCTET STRING (arbitrary bytes)
    OctetString(Bytes),
    /// NULL
    Null,
    /// OBJECT IDENTIFIER
    ObjectIdentifier(Oid),
    /// IpAddress (4 bytes, network order)
    IpAddress([u8; 4]),
    /// Counter32
    Counter32(u32),
    /// Gauge32 / Unsigned32
    Gauge32(u32),
    /// TimeTicks (hundredths of a second)
    TimeTicks(u32),
    /// Counter64
    Counter64(u64),
    /// Opaque, left undecoded
    Opaque(Bytes),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Unsigned view of Counter32, Gauge32, TimeTicks and Counter64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(u64::from(*v)),
            Value::Counter64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::OctetString(b) | Value::Opaque(b) => Some(b),
            _ => None,
        }
    }

    /// OCTET STRING content as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::OctetString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Value::ObjectIdentifier(oid) => Some(oid),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<std::net::Ipv4Addr> {
        match self {
            Value::IpAddress(a) => Some(std::net::Ipv4Addr::from(*a)),
            _ => None,
        }
    }

    /// Short type name used in log and JSON output.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::OctetString(_) => "string",
            Value::Null => "null",
            Value::ObjectIdentifier(_) => "oid",
            Value::IpAddress(_) => "ipaddress",
            Value::Counter32(_) => "counter32",
            Value::Gauge32(_) => "gauge32",
            Value::TimeTicks(_) => "timeticks",
            Value::Counter64(_) => "counter64",
            Value::Opaque(_) => "opaque",
            Value::NoSuchObject => "noSuchObject",
            Value::NoSuchInstance => "noSuchInstance",
            Value::EndOfMibView => "endOfMibView",
        }
    }

    /// Convert a decoded BER value. Sequences and PDUs are not values.
    pub fn from_ber(value: &BerValue) -> Result<Self> {
        Ok(match value {
            BerValue::Integer(v) => Value::Integer(*v),
            BerValue::OctetString(b) => Value::OctetString(b.clone()),
            BerValue::Null => Value::Null,
            BerValue::ObjectIdentifier(oid) => Value::ObjectIdentifier(oid.clone()),
            BerValue::IpAddress(a) => Value::IpAddress(*a),
            BerValue::Opaque(b) => Value::Opaque(b.clone()),
            // Range was checked by the decoder
            BerValue::Unsigned { tag, value } => match *tag {
                tag::application::COUNTER32 => Value::Counter32(*value as u32),
                tag::application::GAUGE32 => Value::Gauge32(*value as u32),
                tag::application::TIMETICKS => Value::TimeTicks(*value as u32),
                _ => Value::Counter64(*value),
            },
            BerValue::Exception(tag::context::NO_SUCH_OBJECT) => Value::NoSuchObject,
            BerValue::Exception(tag::context::NO_SUCH_INSTANCE) => Value::NoSuchInstance,
            BerValue::Exception(_) => Value::EndOfMibView,
            BerValue::Sequence(_) | BerValue::Constructed { .. } => {
                return Err(Error::protocol(ProtocolErrorKind::WrongType {
                    field: "varbind value",
                }));
            }
        })
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Value::Integer(v) => buf.push_integer(*v),
            Value::OctetString(data) => buf.push_octet_string(data),
            Value::Null => buf.push_null(),
            Value::ObjectIdentifier(oid) => buf.push_oid(oid),
            Value::IpAddress(addr) => buf.push_ip_address(*addr),
            Value::Counter32(v) => buf.push_unsigned(tag::application::COUNTER32, u64::from(*v)),
            Value::Gauge32(v) => buf.push_unsigned(tag::application::GAUGE32, u64::from(*v)),
            Value::TimeTicks(v) => buf.push_unsigned(tag::application::TIMETICKS, u64::from(*v)),
            Value::Counter64(v) => buf.push_unsigned(tag::application::COUNTER64, *v),
            Value::Opaque(data) => {
                buf.push_bytes(data);
                buf.push_length(data.len());
                buf.push_tag(tag::application::OPAQUE);
            }
            Value::NoSuchObject => push_exception(buf, tag::context::NO_SUCH_OBJECT),
            Value::NoSuchInstance => push_exception(buf, tag::context::NO_SUCH_INSTANCE),
            Value::EndOfMibView => push_exception(buf, tag::context::END_OF_MIB_VIEW),
        }
    }
}

fn push_exception(buf: &mut EncodeBuf, t: u8) {
    buf.push_length(0);
    buf.push_tag(t);
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) if s.chars().all(|c| !c.is_control() || c.is_whitespace()) => {
                    write!(f, "{}", s)
                }
                _ => write!(f, "0x{}", HexDisplay(data)),
            },
            Value::Null => write!(f, "NULL"),
            Value::ObjectIdentifier(oid) => write!(f, "{}", oid),
            Value::IpAddress(a) => write!(f, "{}", std::net::Ipv4Addr::from(*a)),
            Value::Counter32(v) | Value::Gauge32(v) => write!(f, "{}", v),
            Value::TimeTicks(v) => {
                let secs = v / 100;
                write!(
                    f,
                    "{}d {:02}:{:02}:{:02}.{:02}",
                    secs / 86400,
                    (secs / 3600) % 24,
                    (secs / 60) % 60,
                    secs % 60,
                    v % 100
                )
            }
            Value::Counter64(v) => write!(f, "{}", v),
            Value::Opaque(data) => write!(f, "Opaque(0x{})", HexDisplay(data)),
            Value::NoSuchObject => write!(f, "noSuchObject"),
            Value::NoSuchInstance => write!(f, "noSuchInstance"),
            Value::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Oid> for Value {
    fn from(oid: Oid) -> Self {
        Value::ObjectIdentifier(oid)
    }
}
