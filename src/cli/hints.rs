//! Well-known OID name hints.
//!
//! A small hardcoded table of names for the OIDs that show up in common
//! notifications. This is NOT MIB support.

use crate::Oid;

/// Well-known OID entries.
static WELL_KNOWN_OIDS: &[(&[u32], &str)] = &[
    // SNMPv2-MIB::system
    (&[1, 3, 6, 1, 2, 1, 1, 1, 0], "sysDescr.0"),
    (&[1, 3, 6, 1, 2, 1, 1, 3, 0], "sysUpTime.0"),
    (&[1, 3, 6, 1, 2, 1, 1, 5, 0], "sysName.0"),
    // SNMPv2-MIB notification objects
    (&[1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0], "snmpTrapOID.0"),
    (&[1, 3, 6, 1, 6, 3, 1, 1, 4, 3, 0], "snmpTrapEnterprise.0"),
    // Generic traps (RFC 3418)
    (&[1, 3, 6, 1, 6, 3, 1, 1, 5, 1], "coldStart"),
    (&[1, 3, 6, 1, 6, 3, 1, 1, 5, 2], "warmStart"),
    (&[1, 3, 6, 1, 6, 3, 1, 1, 5, 3], "linkDown"),
    (&[1, 3, 6, 1, 6, 3, 1, 1, 5, 4], "linkUp"),
    (&[1, 3, 6, 1, 6, 3, 1, 1, 5, 5], "authenticationFailure"),
    // USM statistics carried in reports
    (&[1, 3, 6, 1, 6, 3, 15, 1, 1, 2, 0], "usmStatsNotInTimeWindows.0"),
    (&[1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0], "usmStatsUnknownEngineIDs.0"),
];

/// IF-MIB ifEntry columns, matched by prefix with the ifIndex appended.
static IF_ENTRY_COLUMNS: &[(u32, &str)] = &[
    (1, "ifIndex"),
    (2, "ifDescr"),
    (7, "ifAdminStatus"),
    (8, "ifOperStatus"),
];

const IF_ENTRY: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1];

/// snmpTrapOID.0, the varbind naming the notification.
pub fn snmp_trap_oid() -> Oid {
    Oid::from_slice(&[1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0])
}

/// Look up a friendly name for an OID.
///
/// Returns `None` if the OID is not in the well-known table.
pub fn lookup(oid: &Oid) -> Option<&'static str> {
    let arcs = oid.arcs();
    if let Some(name) = WELL_KNOWN_OIDS
        .iter()
        .find(|(pattern, _)| *pattern == arcs)
        .map(|(_, name)| *name)
    {
        return Some(name);
    }

    // ifEntry column plus exactly one index arc
    let rest = arcs.strip_prefix(IF_ENTRY)?;
    let [column, _index] = rest else {
        return None;
    };
    IF_ENTRY_COLUMNS
        .iter()
        .find(|(c, _)| c == column)
        .map(|(_, name)| *name)
}
