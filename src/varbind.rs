//! Variable binding (VarBind) type.
//!
//! A VarBind pairs an OID with a value.

use crate::ber::{BerValue, EncodeBuf};
use crate::error::{Error, ProtocolErrorKind, Result};
use crate::oid::Oid;
use crate::value::Value;

/// Variable binding - an OID-value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    /// The object identifier.
    pub oid: Oid,
    /// The value.
    pub value: Value,
}

impl VarBind {
    /// Create a new VarBind.
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.value.encode(buf);
            buf.push_oid(&self.oid);
        });
    }

    /// Convert a decoded `SEQUENCE { name, value }`.
    pub fn from_ber(value: &BerValue) -> Result<Self> {
        let items = value.as_sequence().ok_or(Error::protocol(ProtocolErrorKind::WrongType {
            field: "varbind",
        }))?;
        let [name, value] = items else {
            return Err(Error::protocol(ProtocolErrorKind::WrongElementCount {
                what: "varbind",
                expected: 2,
                actual: items.len(),
            }));
        };
        let oid = name.as_oid().ok_or(Error::protocol(ProtocolErrorKind::WrongType {
            field: "varbind name",
        }))?;
        Ok(VarBind {
            oid: oid.clone(),
            value: Value::from_ber(value)?,
        })
    }
}

impl std::fmt::Display for VarBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.oid, self.value)
    }
}

/// Encode a list of VarBinds.
pub fn encode_varbind_list(buf: &mut EncodeBuf, varbinds: &[VarBind]) {
    buf.push_sequence(|buf| {
        // Reverse buffer: last varbind first
        for vb in varbinds.iter().rev() {
            vb.encode(buf);
        }
    });
}

/// Convert a decoded varbind list, preserving order.
pub fn varbind_list_from_ber(value: &BerValue) -> Result<Vec<VarBind>> {
    value
        .as_sequence()
        .ok_or(Error::protocol(ProtocolErrorKind::WrongType {
            field: "varbind list",
        }))?
        .iter()
        .map(VarBind::from_ber)
        .collect()
}
