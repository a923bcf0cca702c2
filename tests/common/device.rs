//! Simulated device: an authoritative engine that emits notifications.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use bytes::Bytes;
use snmp_trapd::ber::tag;
use snmp_trapd::message::{
    LOCAL_MSG_MAX_SIZE, MsgFlags, MsgGlobalData, Pdu, ScopedPdu, ScopedPduData, SnmpV3Message,
};
use snmp_trapd::v3::{SaltCounter, UsmSecurityParams, UsmUser};
use snmp_trapd::{SecurityLevel, VarBind};

/// A device engine sending as one user.
pub struct Device {
    pub engine_id: Bytes,
    pub user: UsmUser,
    boots: AtomicU32,
    time: AtomicU32,
    msg_id: AtomicI32,
    salt: SaltCounter,
}

impl Device {
    pub fn new(engine_id: Bytes, user: UsmUser) -> Self {
        Self {
            engine_id,
            user,
            boots: AtomicU32::new(1),
            time: AtomicU32::new(1000),
            msg_id: AtomicI32::new(1),
            salt: SaltCounter::from_value(0x5eed),
        }
    }

    pub fn set_clock(&self, boots: u32, time: u32) {
        self.boots.store(boots, Ordering::Relaxed);
        self.time.store(time, Ordering::Relaxed);
    }

    pub fn trap(&self, request_id: i32, varbinds: Vec<VarBind>) -> Bytes {
        self.seal(Pdu::trap(request_id, varbinds), false)
    }

    pub fn inform(&self, request_id: i32, varbinds: Vec<VarBind>) -> Bytes {
        self.seal(Pdu::inform(request_id, varbinds), true)
    }

    /// Encode `pdu` at the user's security level.
    pub fn seal(&self, pdu: Pdu, reportable: bool) -> Bytes {
        let keys = self.user.localize(&self.engine_id).unwrap();
        let msg_id = self.msg_id.fetch_add(1, Ordering::Relaxed);
        let global = MsgGlobalData::new(
            msg_id,
            LOCAL_MSG_MAX_SIZE,
            MsgFlags::new(self.user.security_level(), reportable),
        );
        let params = UsmSecurityParams::new(
            self.engine_id.clone(),
            self.boots.load(Ordering::Relaxed),
            self.time.load(Ordering::Relaxed),
            self.user.name().clone(),
        );
        let scoped = ScopedPdu::new(self.engine_id.clone(), Bytes::new(), pdu);
        keys.seal(global, params, &scoped, &self.salt).unwrap()
    }
}

/// Engine discovery probe: noAuthNoPriv, reportable, empty user and engine.
pub fn discovery_probe(msg_id: i32) -> Bytes {
    SnmpV3Message {
        global: MsgGlobalData::new(
            msg_id,
            LOCAL_MSG_MAX_SIZE,
            MsgFlags::new(SecurityLevel::NoAuthNoPriv, true),
        ),
        security_params: UsmSecurityParams::default(),
        data: ScopedPduData::Plaintext(ScopedPdu::new(
            Bytes::new(),
            Bytes::new(),
            Pdu::new(tag::pdu::GET_REQUEST, msg_id, vec![]),
        )),
    }
    .encode()
}
