//! JSON-lines output for received notifications and counters.

use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::cli::hints;
use crate::dispatch::MetricsSnapshot;
use crate::store::DecodedTrap;
use crate::util::encode_hex;
use crate::{Oid, Value, VarBind};

/// One received notification, ready for output.
#[derive(Debug, Serialize)]
pub struct TrapRecord {
    pub source: String,
    pub engine_id: String,
    pub user: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub context: String,
    pub kind: &'static str,
    pub request_id: i32,
    /// Seconds since the Unix epoch.
    pub received_at: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trap_oid: Option<String>,
    pub varbinds: Vec<VarBindResult>,
}

/// A single varbind.
#[derive(Debug, Serialize)]
pub struct VarBindResult {
    pub oid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(rename = "type")]
    pub value_type: &'static str,
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

/// Output settings.
#[derive(Debug, Clone, Copy)]
pub struct OutputContext {
    pub show_hints: bool,
}

impl OutputContext {
    pub fn new(show_hints: bool) -> Self {
        Self { show_hints }
    }

    pub fn trap_record(&self, trap: &DecodedTrap) -> TrapRecord {
        let trap_oid = trap
            .varbinds
            .iter()
            .find(|vb| vb.oid == hints::snmp_trap_oid())
            .and_then(|vb| vb.value.as_oid())
            .map(|oid| self.oid_with_hint(oid));

        TrapRecord {
            source: trap.source.to_string(),
            engine_id: encode_hex(&trap.engine_id),
            user: String::from_utf8_lossy(&trap.user_name).into_owned(),
            context: String::from_utf8_lossy(&trap.context_name).into_owned(),
            kind: trap.kind.as_str(),
            request_id: trap.request_id,
            received_at: unix_seconds(trap.received_at),
            trap_oid,
            varbinds: trap.varbinds.iter().map(|vb| self.format_varbind(vb)).collect(),
        }
    }

    /// Write one trap as a single JSON line.
    pub fn write_trap<W: Write>(&self, w: &mut W, trap: &DecodedTrap) -> io::Result<()> {
        let json = serde_json::to_string(&self.trap_record(trap)).map_err(io::Error::other)?;
        writeln!(w, "{}", json)
    }

    fn oid_with_hint(&self, oid: &Oid) -> String {
        match hints::lookup(oid).filter(|_| self.show_hints) {
            Some(name) => format!("{} ({})", oid, name),
            None => oid.to_string(),
        }
    }

    fn format_varbind(&self, vb: &VarBind) -> VarBindResult {
        let hint = if self.show_hints {
            hints::lookup(&vb.oid).map(String::from)
        } else {
            None
        };
        let (value_type, value, formatted) = format_value(&vb.value);

        VarBindResult {
            oid: vb.oid.to_string(),
            hint,
            value_type,
            value,
            formatted,
        }
    }
}

/// Write counters as a single JSON line.
pub fn write_metrics<W: Write>(w: &mut W, metrics: &MetricsSnapshot) -> io::Result<()> {
    let json = serde_json::to_string(metrics).map_err(io::Error::other)?;
    writeln!(w, "{}", json)
}

fn unix_seconds(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Format a value, returning (type_name, json_value, formatted_string).
fn format_value(value: &Value) -> (&'static str, serde_json::Value, Option<String>) {
    match value {
        Value::Integer(v) => ("INTEGER", (*v).into(), None),

        Value::OctetString(bytes) => {
            if is_printable(bytes) {
                let s = String::from_utf8_lossy(bytes).into_owned();
                ("STRING", serde_json::Value::String(s), None)
            } else {
                (
                    "Hex-STRING",
                    serde_json::Value::String(encode_hex(bytes)),
                    Some(format_hex_string(bytes)),
                )
            }
        }

        Value::Null => ("NULL", serde_json::Value::Null, None),

        Value::ObjectIdentifier(oid) => {
            let formatted = hints::lookup(oid).map(String::from);
            ("OID", serde_json::Value::String(oid.to_string()), formatted)
        }

        Value::IpAddress(b) => {
            let s = format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3]);
            ("IpAddress", serde_json::Value::String(s), None)
        }

        Value::Counter32(v) => ("Counter32", (*v).into(), None),

        Value::Gauge32(v) => ("Gauge32", (*v).into(), None),

        Value::TimeTicks(v) => ("TimeTicks", (*v).into(), Some(format_timeticks(*v))),

        Value::Counter64(v) => ("Counter64", (*v).into(), None),

        Value::Opaque(bytes) => (
            "Opaque",
            serde_json::Value::String(encode_hex(bytes)),
            Some(format_hex_string(bytes)),
        ),

        Value::NoSuchObject => ("NoSuchObject", serde_json::Value::Null, None),

        Value::NoSuchInstance => ("NoSuchInstance", serde_json::Value::Null, None),

        Value::EndOfMibView => ("EndOfMibView", serde_json::Value::Null, None),
    }
}

/// Check if bytes are printable ASCII/UTF-8.
fn is_printable(bytes: &[u8]) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(s) => s
            .chars()
            .all(|c| c.is_ascii_graphic() || c.is_ascii_whitespace()),
        Err(_) => false,
    }
}

/// Format bytes as spaced hex for display.
fn format_hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format TimeTicks as human-readable duration.
fn format_timeticks(centiseconds: u32) -> String {
    let total_seconds = centiseconds / 100;
    let cs = centiseconds % 100;

    let days = total_seconds / 86400;
    let hours = (total_seconds % 86400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}.{:02}", days, hours, minutes, seconds, cs)
    } else {
        format!("{:02}:{:02}:{:02}.{:02}", hours, minutes, seconds, cs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::store::TrapKind;
    use bytes::Bytes;

    fn link_down() -> DecodedTrap {
        DecodedTrap {
            source: "192.0.2.1:50123".parse().unwrap(),
            engine_id: Bytes::from_static(&[0x80, 0x00, 0x1f, 0x88, 0x04]),
            user_name: Bytes::from_static(b"trapuser"),
            context_name: Bytes::new(),
            kind: TrapKind::Trap,
            request_id: 42,
            varbinds: vec![
                VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(360000)),
                VarBind::new(
                    oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0),
                    Value::ObjectIdentifier(oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3)),
                ),
                VarBind::new(
                    oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 2, 3),
                    Value::OctetString(Bytes::from_static(b"ge-0/0/3")),
                ),
            ],
            received_at: UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000),
        }
    }

    #[test]
    fn test_trap_json_line() {
        let mut out = Vec::new();
        OutputContext::new(true).write_trap(&mut out, &link_down()).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert_eq!(line.lines().count(), 1);

        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(json["engine_id"], "80001f8804");
        assert_eq!(json["kind"], "trap");
        assert_eq!(json["received_at"], 1_700_000_000.0);
        assert_eq!(json["trap_oid"], "1.3.6.1.6.3.1.1.5.3 (linkDown)");
        assert_eq!(json["varbinds"][0]["hint"], "sysUpTime.0");
        assert_eq!(json["varbinds"][2]["value"], "ge-0/0/3");
        assert!(json.get("context").is_none());
    }

    #[test]
    fn test_no_hints() {
        let record = OutputContext::new(false).trap_record(&link_down());
        assert_eq!(record.trap_oid.as_deref(), Some("1.3.6.1.6.3.1.1.5.3"));
        assert!(record.varbinds.iter().all(|vb| vb.hint.is_none()));
    }

    #[test]
    fn test_metrics_json_line() {
        let mut out = Vec::new();
        let metrics = MetricsSnapshot {
            decoded: 3,
            queue_dropped: 1,
            ..Default::default()
        };
        write_metrics(&mut out, &metrics).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["decoded"], 3);
        assert_eq!(json["queue_dropped"], 1);
    }

    #[test]
    fn test_metrics_write_error_surfaces() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let err = write_metrics(&mut Closed, &MetricsSnapshot::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_format_timeticks() {
        assert_eq!(format_timeticks(12345678), "1d 10:17:36.78");
        assert_eq!(format_timeticks(360000), "01:00:00.00");
        assert_eq!(format_timeticks(0), "00:00:00.00");
    }

    #[test]
    fn test_is_printable() {
        assert!(is_printable(b"Hello World"));
        assert!(is_printable(b""));
        assert!(!is_printable(&[0x00, 0x01, 0x02]));
        assert!(!is_printable(&[0x80, 0x81]));
    }

    #[test]
    fn test_binary_octets_as_hex() {
        let (ty, value, formatted) =
            format_value(&Value::OctetString(Bytes::from_static(&[0x00, 0x1a, 0x2b])));
        assert_eq!(ty, "Hex-STRING");
        assert_eq!(value, "001a2b");
        assert_eq!(formatted.as_deref(), Some("00 1A 2B"));
    }
}
