//! SNMP message wrappers.
//!
//! Only SNMPv3 messages are accepted. v1/v2c datagrams are recognised by
//! their version field and reported as
//! [`LegacyVersion`](crate::error::ProtocolErrorKind::LegacyVersion).

mod pdu;
mod v3;

pub use pdu::Pdu;
pub use v3::{
    LOCAL_MSG_MAX_SIZE, MIN_MSG_MAX_SIZE, MsgFlags, MsgGlobalData, SNMP_V3, ScopedPdu,
    ScopedPduData, SecurityLevel, SnmpV3Message, USM_SECURITY_MODEL,
};
