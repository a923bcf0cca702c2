//! Common test fixtures and constants.

use std::sync::OnceLock;

use bytes::Bytes;
use snmp_trapd::v3::{AuthProtocol, PrivProtocol, UsmUser};
use snmp_trapd::{Oid, Value, VarBind, oid};

// =============================================================================
// Notification OIDs
// =============================================================================

pub fn sys_uptime() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)
}
pub fn snmp_trap_oid() -> Oid {
    oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0)
}
pub fn link_down_oid() -> Oid {
    oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3)
}
pub fn if_oper_status(index: u32) -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 8).child(index)
}

/// sysUpTime, snmpTrapOID = linkDown, ifOperStatus.index = down(2).
pub fn link_down_varbinds(index: u32) -> Vec<VarBind> {
    vec![
        VarBind::new(sys_uptime(), Value::TimeTicks(123_456)),
        VarBind::new(snmp_trap_oid(), Value::ObjectIdentifier(link_down_oid())),
        VarBind::new(if_oper_status(index), Value::Integer(2)),
    ]
}

// =============================================================================
// Credentials
// =============================================================================

/// Auth password for all V3 users
pub const AUTH_PASSWORD: &str = "authpass123";
/// Privacy password for all V3 users
pub const PRIV_PASSWORD: &str = "privpass123";

/// V3 usernames, one per security level and protocol pair
pub mod users {
    pub const NOAUTH_USER: &str = "noauth_user";
    pub const AUTHMD5_USER: &str = "authmd5_user";
    pub const AUTHSHA1_USER: &str = "authsha1_user";
    pub const PRIVDES_USER: &str = "privdes_user";
    pub const PRIVAES128_USER: &str = "privaes128_user";
}

/// Password-to-key derivation is slow in debug builds, so every user is
/// built once per test binary.
fn cached_users() -> &'static [UsmUser; 5] {
    static USERS: OnceLock<[UsmUser; 5]> = OnceLock::new();
    USERS.get_or_init(|| {
        [
            UsmUser::builder(users::NOAUTH_USER).build().unwrap(),
            UsmUser::builder(users::AUTHMD5_USER)
                .auth(AuthProtocol::Md5, AUTH_PASSWORD)
                .build()
                .unwrap(),
            UsmUser::builder(users::AUTHSHA1_USER)
                .auth(AuthProtocol::Sha1, AUTH_PASSWORD)
                .build()
                .unwrap(),
            UsmUser::builder(users::PRIVDES_USER)
                .auth(AuthProtocol::Sha1, AUTH_PASSWORD)
                .privacy(PrivProtocol::Des, PRIV_PASSWORD)
                .build()
                .unwrap(),
            UsmUser::builder(users::PRIVAES128_USER)
                .auth(AuthProtocol::Sha1, AUTH_PASSWORD)
                .privacy(PrivProtocol::Aes128, PRIV_PASSWORD)
                .build()
                .unwrap(),
        ]
    })
}

pub fn noauth_user() -> UsmUser {
    cached_users()[0].clone()
}

pub fn auth_user(protocol: AuthProtocol) -> UsmUser {
    match protocol {
        AuthProtocol::Md5 => cached_users()[1].clone(),
        AuthProtocol::Sha1 => cached_users()[2].clone(),
    }
}

pub fn priv_user(protocol: PrivProtocol) -> UsmUser {
    match protocol {
        PrivProtocol::Des => cached_users()[3].clone(),
        PrivProtocol::Aes128 => cached_users()[4].clone(),
    }
}

/// Every user above.
pub fn all_users() -> Vec<UsmUser> {
    cached_users().to_vec()
}

// =============================================================================
// Engine IDs
// =============================================================================

/// Receiver's engine ID.
pub const LOCAL_ENGINE_ID: &[u8] = b"\x80\x00\x00\x00\x05trapd-test";

/// Device engine ID in RFC 3411 text format (enterprise 8072, format 4).
pub fn device_engine_id(n: u32) -> Bytes {
    let mut id = vec![0x80, 0x00, 0x1f, 0x88, 0x04];
    id.extend_from_slice(format!("device-{n}").as_bytes());
    Bytes::from(id)
}
