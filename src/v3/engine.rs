//! Per-engine timeliness state (RFC 3414 Section 2.2).
//!
//! The receiver keeps one [`EngineRecord`] per authoritative engine ID it
//! accepts traffic from. Records feed the anti-replay check and are evicted
//! after a period of inactivity, except for engines pinned from
//! configuration.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::{Error, ReplayErrorKind, Result};
use crate::util::HexDisplay;

/// Timeliness window in seconds (RFC 3414 Section 2.2.3).
pub const TIME_WINDOW: u32 = 150;

/// Maximum snmpEngineBoots; a record at this value is latched.
pub const MAX_ENGINE_BOOTS: u32 = 2_147_483_647;

/// Maximum snmpEngineTime.
pub const MAX_ENGINE_TIME: u32 = 2_147_483_647;

/// Idle time after which a learned engine record is dropped.
pub const DEFAULT_ENGINE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How a record entered the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOrigin {
    /// The receiver's own engine, created by discovery.
    Local,
    /// Listed in configuration; never evicted.
    Configured,
    /// Created from the first authenticated message of an engine.
    Learned,
}

/// Timeliness state for one authoritative engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRecord {
    pub engine_id: Bytes,
    pub engine_boots: u32,
    /// engineTime as of `synced_at`.
    pub engine_time: u32,
    /// Highest engineTime seen for the current boots value.
    pub latest_received_time: u32,
    pub synced_at: Instant,
    pub last_seen: Instant,
    /// False until the first authenticated message for a configured engine.
    pub time_known: bool,
    pub origin: EngineOrigin,
}

impl EngineRecord {
    fn new(engine_id: Bytes, boots: u32, time: u32, origin: EngineOrigin, now: Instant) -> Self {
        Self {
            engine_id,
            engine_boots: boots,
            engine_time: time,
            latest_received_time: time,
            synced_at: now,
            last_seen: now,
            time_known: true,
            origin,
        }
    }

    /// Current engineTime estimate: the recorded value plus elapsed seconds.
    pub fn estimated_time(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.synced_at).as_secs();
        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        self.engine_time.saturating_add(elapsed).min(MAX_ENGINE_TIME)
    }

    pub fn is_latched(&self) -> bool {
        self.engine_boots >= MAX_ENGINE_BOOTS
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.origin != EngineOrigin::Configured
            && now.saturating_duration_since(self.last_seen) > ttl
    }

    /// Anti-replay decision for a message claiming `boots`/`time`.
    fn check(&self, boots: u32, time: u32, window: u32, now: Instant) -> Result<()> {
        if !self.time_known {
            return Ok(());
        }
        if self.is_latched() || boots >= MAX_ENGINE_BOOTS {
            return Err(Error::replay(ReplayErrorKind::BootsLatched));
        }
        if boots < self.engine_boots {
            return Err(Error::replay(ReplayErrorKind::BootsRegressed {
                recorded: self.engine_boots,
                received: boots,
            }));
        }
        if boots > self.engine_boots {
            return Ok(());
        }
        let estimated = self.estimated_time(now);
        if estimated.abs_diff(time) > window {
            return Err(Error::replay(ReplayErrorKind::OutsideWindow {
                estimated,
                received: time,
                window,
            }));
        }
        Ok(())
    }

    /// Advance the baseline after a fully verified message.
    fn advance(&mut self, boots: u32, time: u32, now: Instant) {
        self.last_seen = now;
        if self.origin == EngineOrigin::Local {
            return;
        }
        let resync = !self.time_known
            || boots > self.engine_boots
            || (boots == self.engine_boots && time > self.latest_received_time);
        if resync {
            self.engine_boots = boots;
            self.engine_time = time;
            self.latest_received_time = time;
            self.synced_at = now;
            self.time_known = true;
        }
    }
}

/// Shared map of engine ID to [`EngineRecord`].
///
/// Safe to share between workers; every operation takes the lock once. All
/// methods take the current instant so callers (and tests) control time.
#[derive(Debug)]
pub struct EngineCache {
    records: RwLock<HashMap<Bytes, EngineRecord>>,
    ttl: Duration,
}

impl Default for EngineCache {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_TTL)
    }
}

impl EngineCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Copy of the record for `engine_id`, if present and not expired.
    pub fn lookup(&self, engine_id: &[u8], now: Instant) -> Option<EngineRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(engine_id)
            .filter(|r| !r.is_expired(now, self.ttl))
            .cloned()
    }

    /// Insert or overwrite the record for `engine_id`.
    ///
    /// An existing record keeps its origin unless `origin` is stronger
    /// (Configured wins over the others). Inserting a new key also sweeps
    /// expired records so the map stays bounded without the housekeeping
    /// task.
    pub fn upsert(
        &self,
        engine_id: Bytes,
        boots: u32,
        time: u32,
        origin: EngineOrigin,
        now: Instant,
    ) -> EngineRecord {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = records.get_mut(&engine_id) {
            let origin = match (existing.origin, origin) {
                (EngineOrigin::Configured, _) => EngineOrigin::Configured,
                (_, new) => new,
            };
            *existing = EngineRecord::new(engine_id, boots, time, origin, now);
            return existing.clone();
        }

        let ttl = self.ttl;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now, ttl));
        let swept = before - records.len();
        if swept > 0 {
            tracing::debug!(target: "snmp_trapd::engine", swept, "evicted idle engine records");
        }

        let record = EngineRecord::new(engine_id.clone(), boots, time, origin, now);
        tracing::debug!(
            target: "snmp_trapd::engine",
            engine_id = %HexDisplay(&engine_id),
            boots,
            time,
            origin = ?origin,
            "engine record created"
        );
        records.insert(engine_id, record.clone());
        record
    }

    /// Register a configured engine whose clock is not yet known.
    ///
    /// The first authenticated message from it sets the baseline. Pinning an
    /// engine that already has a record only marks it Configured.
    pub fn pin(&self, engine_id: Bytes, now: Instant) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records
            .entry(engine_id.clone())
            .and_modify(|r| r.origin = EngineOrigin::Configured)
            .or_insert_with(|| EngineRecord {
                time_known: false,
                ..EngineRecord::new(engine_id, 0, 0, EngineOrigin::Configured, now)
            });
    }

    /// Drop records idle for longer than the TTL. Returns how many went.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        let ttl = self.ttl;
        records.retain(|_, r| !r.is_expired(now, ttl));
        before - records.len()
    }

    /// Anti-replay check without modifying state.
    ///
    /// Fails with [`Error::UnknownEngine`] if there is no live record.
    pub fn check_timeliness(
        &self,
        engine_id: &[u8],
        boots: u32,
        time: u32,
        window: u32,
        now: Instant,
    ) -> Result<()> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        match records.get(engine_id) {
            Some(record) if !record.is_expired(now, self.ttl) => {
                record.check(boots, time, window, now)
            }
            _ => Err(Error::UnknownEngine {
                engine_id: Bytes::copy_from_slice(engine_id),
            }),
        }
    }

    /// Move the baseline forward after a message passed every check.
    pub fn record_authenticated(&self, engine_id: &[u8], boots: u32, time: u32, now: Instant) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get_mut(engine_id) {
            record.advance(boots, time, now);
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINE: &[u8] = b"\x80\x00\x1f\x88\x04remote";

    fn cache_with(boots: u32, time: u32, now: Instant) -> EngineCache {
        let cache = EngineCache::default();
        cache.upsert(Bytes::from_static(ENGINE), boots, time, EngineOrigin::Learned, now);
        cache
    }

    fn replay_kind(err: Error) -> ReplayErrorKind {
        match err {
            Error::ClockSkewRejected { kind } => kind,
            other => panic!("expected ClockSkewRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_window_edges() {
        let now = Instant::now();
        let cache = cache_with(5, 1000, now);

        cache.check_timeliness(ENGINE, 5, 1000, TIME_WINDOW, now).unwrap();
        cache.check_timeliness(ENGINE, 5, 850, TIME_WINDOW, now).unwrap();
        cache.check_timeliness(ENGINE, 5, 1150, TIME_WINDOW, now).unwrap();

        let kind = replay_kind(cache.check_timeliness(ENGINE, 5, 849, TIME_WINDOW, now).unwrap_err());
        assert_eq!(
            kind,
            ReplayErrorKind::OutsideWindow {
                estimated: 1000,
                received: 849,
                window: 150
            }
        );
        assert!(cache.check_timeliness(ENGINE, 5, 1151, TIME_WINDOW, now).is_err());
    }

    #[test]
    fn test_estimate_follows_clock() {
        let t0 = Instant::now();
        let cache = cache_with(5, 1000, t0);
        let later = t0 + Duration::from_secs(100);

        // estimate is now 1100, so 1000 is still inside and 949 is not
        cache.check_timeliness(ENGINE, 5, 1000, TIME_WINDOW, later).unwrap();
        assert!(cache.check_timeliness(ENGINE, 5, 949, TIME_WINDOW, later).is_err());
    }

    #[test]
    fn test_boots_rules() {
        let now = Instant::now();
        let cache = cache_with(5, 1000, now);

        // reboot: any time accepted
        cache.check_timeliness(ENGINE, 6, 3, TIME_WINDOW, now).unwrap();
        cache.record_authenticated(ENGINE, 6, 3, now);
        let record = cache.lookup(ENGINE, now).unwrap();
        assert_eq!((record.engine_boots, record.engine_time), (6, 3));

        let kind = replay_kind(cache.check_timeliness(ENGINE, 5, 1000, TIME_WINDOW, now).unwrap_err());
        assert_eq!(
            kind,
            ReplayErrorKind::BootsRegressed {
                recorded: 6,
                received: 5
            }
        );
    }

    #[test]
    fn test_baseline_only_moves_forward() {
        let now = Instant::now();
        let cache = cache_with(5, 1000, now);

        cache.record_authenticated(ENGINE, 5, 850, now);
        let record = cache.lookup(ENGINE, now).unwrap();
        assert_eq!(record.engine_time, 1000);
        assert_eq!(record.latest_received_time, 1000);

        let later = now + Duration::from_secs(10);
        cache.record_authenticated(ENGINE, 5, 1010, later);
        let record = cache.lookup(ENGINE, later).unwrap();
        assert_eq!(record.engine_time, 1010);
        assert_eq!(record.synced_at, later);
    }

    #[test]
    fn test_latched_boots_rejected() {
        let now = Instant::now();
        let cache = cache_with(MAX_ENGINE_BOOTS, 0, now);
        let kind = replay_kind(
            cache
                .check_timeliness(ENGINE, MAX_ENGINE_BOOTS, 0, TIME_WINDOW, now)
                .unwrap_err(),
        );
        assert_eq!(kind, ReplayErrorKind::BootsLatched);
    }

    #[test]
    fn test_unknown_engine() {
        let cache = EngineCache::default();
        assert!(matches!(
            cache
                .check_timeliness(ENGINE, 1, 1, TIME_WINDOW, Instant::now())
                .unwrap_err(),
            Error::UnknownEngine { ref engine_id } if &engine_id[..] == ENGINE
        ));
    }

    #[test]
    fn test_pinned_engine_accepts_first_message() {
        let now = Instant::now();
        let cache = EngineCache::default();
        cache.pin(Bytes::from_static(ENGINE), now);

        cache.check_timeliness(ENGINE, 42, 123_456, TIME_WINDOW, now).unwrap();
        cache.record_authenticated(ENGINE, 42, 123_456, now);

        let record = cache.lookup(ENGINE, now).unwrap();
        assert!(record.time_known);
        assert_eq!(record.origin, EngineOrigin::Configured);
        assert!(cache.check_timeliness(ENGINE, 41, 0, TIME_WINDOW, now).is_err());
    }

    #[test]
    fn test_eviction_spares_configured() {
        let t0 = Instant::now();
        let cache = EngineCache::new(Duration::from_secs(60));
        cache.upsert(Bytes::from_static(b"learned"), 1, 1, EngineOrigin::Learned, t0);
        cache.pin(Bytes::from_static(b"pinned"), t0);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.evict_expired(t0 + Duration::from_secs(30)), 0);
        assert_eq!(cache.evict_expired(t0 + Duration::from_secs(61)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(b"pinned", t0 + Duration::from_secs(3600)).is_some());
    }

    #[test]
    fn test_expired_record_is_unknown() {
        let t0 = Instant::now();
        let cache = EngineCache::new(Duration::from_secs(60));
        cache.upsert(Bytes::from_static(ENGINE), 1, 1, EngineOrigin::Learned, t0);
        let later = t0 + Duration::from_secs(120);
        assert!(cache.lookup(ENGINE, later).is_none());
        assert!(matches!(
            cache.check_timeliness(ENGINE, 1, 121, TIME_WINDOW, later),
            Err(Error::UnknownEngine { .. })
        ));
    }

    #[test]
    fn test_upsert_is_idempotent_per_key() {
        let now = Instant::now();
        let cache = EngineCache::default();
        for i in 0..5 {
            cache.upsert(Bytes::from_static(b"local"), 1, i, EngineOrigin::Local, now);
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(b"local", now).unwrap().engine_time, 4);
    }

    #[test]
    fn test_local_record_ignores_advance() {
        let now = Instant::now();
        let cache = EngineCache::default();
        cache.upsert(Bytes::from_static(b"local"), 1, 10, EngineOrigin::Local, now);
        cache.record_authenticated(b"local", 1, 500, now);
        assert_eq!(cache.lookup(b"local", now).unwrap().engine_time, 10);
    }
}
