//! Generic SNMPv2 PDU: request-id, error-status, error-index, varbinds.
//!
//! Every PDU a v3 message can carry shares this layout (RFC 3416
//! Section 3), so a single struct keyed by its tag covers traps, informs,
//! reports and the GET probe used for engine discovery.

use crate::ber::{BerValue, EncodeBuf, tag};
use crate::error::{Error, ProtocolErrorKind, Result};
use crate::varbind::{VarBind, encode_varbind_list, varbind_list_from_ber};

/// A decoded PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    /// Context-specific tag, 0xA0..=0xA8 excluding the v1 trap.
    pub tag: u8,
    pub request_id: i32,
    pub error_status: i32,
    pub error_index: i32,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    pub fn new(tag: u8, request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            tag,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    pub fn trap(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self::new(tag::pdu::TRAP_V2, request_id, varbinds)
    }

    pub fn inform(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self::new(tag::pdu::INFORM_REQUEST, request_id, varbinds)
    }

    /// True for SNMPv2-Trap and InformRequest.
    pub fn is_notification(&self) -> bool {
        matches!(self.tag, tag::pdu::TRAP_V2 | tag::pdu::INFORM_REQUEST)
    }

    pub fn is_inform(&self) -> bool {
        self.tag == tag::pdu::INFORM_REQUEST
    }

    pub fn name(&self) -> &'static str {
        tag::pdu_name(self.tag)
    }

    /// Response acknowledging this PDU, echoing request-id and varbinds
    /// (RFC 3416 Section 4.2.7).
    pub fn to_response(&self) -> Pdu {
        Pdu {
            tag: tag::pdu::RESPONSE,
            request_id: self.request_id,
            error_status: 0,
            error_index: 0,
            varbinds: self.varbinds.clone(),
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.tag, |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(i64::from(self.error_index));
            buf.push_integer(i64::from(self.error_status));
            buf.push_integer(i64::from(self.request_id));
        });
    }

    /// Interpret a decoded context-constructed value as a PDU.
    pub fn from_ber(value: &BerValue) -> Result<Self> {
        let Some((pdu_tag, items)) = value.as_constructed() else {
            return Err(Error::protocol(ProtocolErrorKind::WrongType { field: "PDU" }));
        };
        if !(tag::pdu::GET_REQUEST..=tag::pdu::REPORT).contains(&pdu_tag)
            || pdu_tag == tag::pdu::TRAP_V1
        {
            return Err(Error::protocol(ProtocolErrorKind::UnknownPduType(pdu_tag)));
        }
        let [request_id, error_status, error_index, varbinds] = items else {
            return Err(Error::protocol(ProtocolErrorKind::WrongElementCount {
                what: "PDU",
                expected: 4,
                actual: items.len(),
            }));
        };

        Ok(Self {
            tag: pdu_tag,
            request_id: int32(request_id, "request-id")?,
            error_status: int32(error_status, "error-status")?,
            error_index: int32(error_index, "error-index")?,
            varbinds: varbind_list_from_ber(varbinds)?,
        })
    }
}

fn int32(value: &BerValue, field: &'static str) -> Result<i32> {
    let v = value
        .as_integer()
        .ok_or(Error::protocol(ProtocolErrorKind::WrongType { field }))?;
    i32::try_from(v).map_err(|_| Error::protocol(ProtocolErrorKind::OutOfRange { field, value: v }))
}
