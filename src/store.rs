//! Latest decoded trap per (source IP, engine ID).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use bytes::Bytes;

use crate::util::HexDisplay;
use crate::varbind::VarBind;

/// A datagram as it came off the socket.
#[derive(Debug, Clone)]
pub struct RawDatagram {
    pub data: Bytes,
    pub source: SocketAddr,
    pub received_at: SystemTime,
}

impl RawDatagram {
    pub fn new(data: Bytes, source: SocketAddr) -> Self {
        Self {
            data,
            source,
            received_at: SystemTime::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Notification PDU type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    /// SNMPv2-Trap-PDU (unconfirmed)
    Trap,
    /// InformRequest-PDU (acknowledged)
    Inform,
}

impl TrapKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trap => "trap",
            Self::Inform => "inform",
        }
    }
}

/// A verified notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTrap {
    pub source: SocketAddr,
    pub engine_id: Bytes,
    pub user_name: Bytes,
    pub context_name: Bytes,
    pub kind: TrapKind,
    pub request_id: i32,
    /// In the order received.
    pub varbinds: Vec<VarBind>,
    pub received_at: SystemTime,
}

impl DecodedTrap {
    pub fn key(&self) -> TrapKey {
        TrapKey {
            source: self.source.ip(),
            engine_id: self.engine_id.clone(),
        }
    }
}

/// Store key: the sending host and its authoritative engine.
///
/// Informs are sent under the receiver's engine, so every inform from one
/// host shares a key regardless of the device engine behind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrapKey {
    pub source: IpAddr,
    pub engine_id: Bytes,
}

impl std::fmt::Display for TrapKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source, HexDisplay(&self.engine_id))
    }
}

/// Last-write-wins map of the most recent trap per key.
#[derive(Debug, Default)]
pub struct TrapStateStore {
    entries: RwLock<HashMap<TrapKey, Arc<DecodedTrap>>>,
}

impl TrapStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for the trap's key, returning the key.
    pub fn publish(&self, trap: DecodedTrap) -> TrapKey {
        let key = trap.key();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.clone(), Arc::new(trap));
        key
    }

    /// Consistent copy of every entry.
    pub fn snapshot(&self) -> HashMap<TrapKey, Arc<DecodedTrap>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, key: &TrapKey) -> Option<Arc<DecodedTrap>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
