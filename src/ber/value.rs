//! Decoded BER value tree.

use bytes::Bytes;

use super::tag;
use crate::oid::Oid;

/// A decoded BER value.
///
/// Produced once by [`decode`](super::decode) and never mutated. Octet
/// strings and opaque values are zero-copy slices of the received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BerValue {
    /// Universal INTEGER.
    Integer(i64),
    /// Universal OCTET STRING (may be empty).
    OctetString(Bytes),
    /// Universal NULL.
    Null,
    /// Universal OBJECT IDENTIFIER.
    ObjectIdentifier(Oid),
    /// Universal SEQUENCE.
    Sequence(Vec<BerValue>),
    /// Counter32, Gauge32/Unsigned32, TimeTicks or Counter64, keeping the tag.
    Unsigned { tag: u8, value: u64 },
    /// IpAddress (application 0).
    IpAddress([u8; 4]),
    /// Opaque (application 4), content left undecoded.
    Opaque(Bytes),
    /// Context-specific constructed value, such as a PDU.
    Constructed { tag: u8, items: Vec<BerValue> },
    /// noSuchObject, noSuchInstance or endOfMibView.
    Exception(u8),
}

impl BerValue {
    /// The tag octet this value was encoded with.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Integer(_) => tag::universal::INTEGER,
            Self::OctetString(_) => tag::universal::OCTET_STRING,
            Self::Null => tag::universal::NULL,
            Self::ObjectIdentifier(_) => tag::universal::OBJECT_IDENTIFIER,
            Self::Sequence(_) => tag::universal::SEQUENCE,
            Self::Unsigned { tag, .. } => *tag,
            Self::IpAddress(_) => tag::application::IP_ADDRESS,
            Self::Opaque(_) => tag::application::OPAQUE,
            Self::Constructed { tag, .. } => *tag,
            Self::Exception(tag) => *tag,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_octet_string(&self) -> Option<&Bytes> {
        match self {
            Self::OctetString(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Self::ObjectIdentifier(oid) => Some(oid),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[BerValue]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Items of a context-specific constructed value, with its tag.
    pub fn as_constructed(&self) -> Option<(u8, &[BerValue])> {
        match self {
            Self::Constructed { tag, items } => Some((*tag, items)),
            _ => None,
        }
    }
}
