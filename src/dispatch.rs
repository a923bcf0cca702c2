//! Trap receiver: UDP intake, worker pool and the per-datagram pipeline.
//!
//! One task owns the socket and only receives and enqueues. Datagrams are
//! routed by source IP to one of N bounded worker queues, so every device's
//! traps are handled in order by a single worker. A full queue drops the
//! newest datagram instead of stalling the socket.
//!
//! # Example
//!
//! ```rust,no_run
//! use snmp_trapd::{AuthProtocol, PrivProtocol, TrapReceiver};
//!
//! # async fn example() -> snmp_trapd::Result<()> {
//! let receiver = TrapReceiver::builder()
//!     .bind("0.0.0.0:1162".parse().unwrap())
//!     .workers(4)
//!     .usm_user("trapuser", |u| {
//!         u.auth(AuthProtocol::Sha1, "authpass123")
//!             .privacy(PrivProtocol::Aes128, "privpass123")
//!     })
//!     .learn_engines(true)
//!     .build()
//!     .await?;
//!
//! let store = receiver.store().clone();
//! let cancel = receiver.cancel();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     cancel.cancel();
//! });
//! receiver.run().await?;
//! println!("{} devices seen", store.len());
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{Error, FailureKind, Result};
use crate::message::{MIN_MSG_MAX_SIZE, SnmpV3Message};
use crate::store::{DecodedTrap, RawDatagram, TrapKey, TrapKind, TrapStateStore};
use crate::util::{HexDisplay, bind_udp_socket, worker_index};
use crate::v3::{
    DEFAULT_ENGINE_TTL, EngineCache, MAX_ENGINE_BOOTS, MAX_ENGINE_ID_LEN, SecurityEngine,
    TIME_WINDOW, UsmOutcome, UsmUser, UsmUserBuilder, VerifiedPdu,
};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Smallest engine ID RFC 3411 allows.
const MIN_ENGINE_ID_LEN: usize = 5;

/// Receiver settings. Every field has a working default except the users,
/// which are added through [`TrapReceiverBuilder::usm_user`].
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub bind_addr: SocketAddr,
    /// Worker tasks; each owns one intake queue.
    pub workers: usize,
    /// Total intake capacity, split evenly across workers.
    pub queue_capacity: usize,
    /// Idle time after which an engine record is evicted.
    pub engine_ttl: Duration,
    /// Anti-replay window in seconds.
    pub time_window: u32,
    pub max_datagram_size: usize,
    /// `SO_RCVBUF`; `None` keeps the kernel default.
    pub recv_buffer_size: Option<usize>,
    /// Period of the eviction sweep and counter log.
    pub stats_interval: Duration,
    /// How long workers get to drain their queues on shutdown.
    pub shutdown_timeout: Duration,
    /// Local snmpEngineID; generated when `None`.
    pub engine_id: Option<Bytes>,
    pub engine_boots: u32,
    /// Create engine records for unknown engines once their HMAC verifies.
    pub learn_engines: bool,
    /// Device engine IDs accepted before any traffic from them.
    pub known_engines: Vec<Bytes>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 162)),
            workers: 4,
            queue_capacity: 1024,
            engine_ttl: DEFAULT_ENGINE_TTL,
            time_window: TIME_WINDOW,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            recv_buffer_size: None,
            stats_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(5),
            engine_id: None,
            engine_boots: 1,
            learn_engines: false,
            known_engines: Vec::new(),
        }
    }
}

impl ReceiverConfig {
    /// Reject settings the receiver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::config("workers must be at least 1"));
        }
        if self.queue_capacity < self.workers {
            return Err(Error::config(format!(
                "queue capacity {} is smaller than the worker count {}",
                self.queue_capacity, self.workers
            )));
        }
        if self.time_window == 0 {
            return Err(Error::config("time window must be at least 1 second"));
        }
        if self.engine_ttl.is_zero() || self.stats_interval.is_zero() {
            return Err(Error::config("engine TTL and stats interval must be non-zero"));
        }
        let min_size = MIN_MSG_MAX_SIZE as usize;
        if !(min_size..=MAX_DATAGRAM_SIZE).contains(&self.max_datagram_size) {
            return Err(Error::config(format!(
                "max datagram size {} outside {}..={}",
                self.max_datagram_size, min_size, MAX_DATAGRAM_SIZE
            )));
        }
        if self.engine_boots == 0 || self.engine_boots >= MAX_ENGINE_BOOTS {
            return Err(Error::config(format!(
                "engine boots {} outside 1..{}",
                self.engine_boots, MAX_ENGINE_BOOTS
            )));
        }
        if let Some(id) = &self.engine_id {
            check_engine_id(id, MIN_ENGINE_ID_LEN)?;
        }
        for id in &self.known_engines {
            check_engine_id(id, 1)?;
        }
        Ok(())
    }
}

fn check_engine_id(id: &[u8], min: usize) -> Result<()> {
    if (min..=MAX_ENGINE_ID_LEN).contains(&id.len()) {
        Ok(())
    } else {
        Err(Error::config(format!(
            "engine ID {} must be {}..={} octets",
            HexDisplay(id),
            min,
            MAX_ENGINE_ID_LEN
        )))
    }
}

/// Enterprise-less engine ID with format 5 (octets) and random bytes.
fn generate_engine_id() -> Bytes {
    let mut local = [0u8; 8];
    if let Err(e) = getrandom::fill(&mut local) {
        tracing::warn!(target: "snmp_trapd::dispatch", error = %e, "getrandom failed, deriving engine ID from clock");
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        local = nanos.to_be_bytes();
    }
    let mut id = vec![0x80, 0x00, 0x00, 0x00, 0x05];
    id.extend_from_slice(&local);
    Bytes::from(id)
}

/// Drop and outcome counters.
#[derive(Debug, Default)]
pub struct Metrics {
    decoded: AtomicU64,
    auth_failed: AtomicU64,
    priv_failed: AtomicU64,
    replay_rejected: AtomicU64,
    queue_dropped: AtomicU64,
    malformed: AtomicU64,
    protocol: AtomicU64,
    unknown_engine: AtomicU64,
    unsupported: AtomicU64,
    discovery_reports: AtomicU64,
    legacy_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a dropped datagram under its failure kind.
    pub fn record_failure(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::Malformed => &self.malformed,
            FailureKind::Protocol => &self.protocol,
            FailureKind::Legacy => &self.legacy_dropped,
            FailureKind::UnknownEngine => &self.unknown_engine,
            FailureKind::AuthFailed => &self.auth_failed,
            FailureKind::ReplayRejected => &self.replay_rejected,
            FailureKind::PrivFailed => &self.priv_failed,
            FailureKind::Unsupported => &self.unsupported,
            FailureKind::QueueSaturated => &self.queue_dropped,
            FailureKind::Io | FailureKind::Config => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_discovery(&self) {
        self.discovery_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            decoded: load(&self.decoded),
            auth_failed: load(&self.auth_failed),
            priv_failed: load(&self.priv_failed),
            replay_rejected: load(&self.replay_rejected),
            queue_dropped: load(&self.queue_dropped),
            malformed: load(&self.malformed),
            protocol: load(&self.protocol),
            unknown_engine: load(&self.unknown_engine),
            unsupported: load(&self.unsupported),
            discovery_reports: load(&self.discovery_reports),
            legacy_dropped: load(&self.legacy_dropped),
        }
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct MetricsSnapshot {
    pub decoded: u64,
    pub auth_failed: u64,
    pub priv_failed: u64,
    pub replay_rejected: u64,
    pub queue_dropped: u64,
    pub malformed: u64,
    pub protocol: u64,
    pub unknown_engine: u64,
    pub unsupported: u64,
    pub discovery_reports: u64,
    pub legacy_dropped: u64,
}

impl MetricsSnapshot {
    /// Every datagram that did not produce a trap or a report.
    pub fn dropped(&self) -> u64 {
        self.auth_failed
            + self.priv_failed
            + self.replay_rejected
            + self.queue_dropped
            + self.malformed
            + self.protocol
            + self.unknown_engine
            + self.unsupported
            + self.legacy_dropped
    }
}

/// Per-worker bounded queues between the socket task and the workers.
#[derive(Debug)]
pub struct IntakeQueue {
    senders: Vec<mpsc::Sender<RawDatagram>>,
    metrics: Arc<Metrics>,
}

impl IntakeQueue {
    /// Split `capacity` across `workers` queues, rounding up.
    pub fn new(
        workers: usize,
        capacity: usize,
        metrics: Arc<Metrics>,
    ) -> (Self, Vec<mpsc::Receiver<RawDatagram>>) {
        let workers = workers.max(1);
        let per_worker = capacity.div_ceil(workers).max(1);
        let (senders, receivers) = (0..workers).map(|_| mpsc::channel(per_worker)).unzip();
        (Self { senders, metrics }, receivers)
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Hand a datagram to its worker without waiting. A full (or closed)
    /// queue drops it and counts `queue_dropped`.
    pub fn try_enqueue(&self, datagram: RawDatagram) -> Result<()> {
        let index = worker_index(datagram.source.ip(), self.senders.len());
        let source_addr = datagram.source;
        match self.senders[index].try_send(datagram) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.metrics.record_failure(FailureKind::QueueSaturated);
                Err(Error::QueueSaturated { source_addr })
            }
        }
    }
}

/// What the pipeline did with a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Verified notification stored under `key`; `reply` acknowledges an inform.
    Published { key: TrapKey, reply: Option<Bytes> },
    /// Engine discovery probe, answered with a Report carrying our engine ID.
    Discovery { reply: Bytes },
    /// Verified, but not a notification PDU.
    Ignored { pdu: &'static str },
}

impl Disposition {
    pub fn reply(&self) -> Option<&Bytes> {
        match self {
            Self::Published { reply, .. } => reply.as_ref(),
            Self::Discovery { reply } => Some(reply),
            Self::Ignored { .. } => None,
        }
    }
}

/// Decode, verify and publish, synchronously, one datagram at a time.
#[derive(Debug)]
pub struct TrapPipeline {
    security: SecurityEngine,
    engines: Arc<EngineCache>,
    store: Arc<TrapStateStore>,
    metrics: Arc<Metrics>,
}

impl TrapPipeline {
    pub fn new(
        security: SecurityEngine,
        engines: Arc<EngineCache>,
        store: Arc<TrapStateStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            security,
            engines,
            store,
            metrics,
        }
    }

    pub fn security(&self) -> &SecurityEngine {
        &self.security
    }

    pub fn engines(&self) -> &Arc<EngineCache> {
        &self.engines
    }

    pub fn store(&self) -> &Arc<TrapStateStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run one datagram through the pipeline. Failures are counted and
    /// logged here, once, before being returned.
    pub fn process(&self, datagram: &RawDatagram, now: Instant) -> Result<Disposition> {
        let result = self.process_inner(datagram, now);
        if let Err(e) = &result {
            let kind = e.failure_kind();
            self.metrics.record_failure(kind);
            match kind {
                FailureKind::Legacy | FailureKind::Malformed => tracing::debug!(
                    target: "snmp_trapd::dispatch",
                    {
                        snmp.source = %datagram.source,
                        kind = kind.as_str(),
                        len = datagram.len(),
                        error = %e
                    },
                    "dropped datagram"
                ),
                _ => tracing::warn!(
                    target: "snmp_trapd::dispatch",
                    {
                        snmp.source = %datagram.source,
                        kind = kind.as_str(),
                        len = datagram.len(),
                        error = %e
                    },
                    "dropped datagram"
                ),
            }
        }
        result
    }

    fn process_inner(&self, datagram: &RawDatagram, now: Instant) -> Result<Disposition> {
        let message = SnmpV3Message::decode(datagram.data.clone())?;
        let outcome =
            self.security
                .authenticate_and_decrypt(&datagram.data, &message, &self.engines, now)?;

        let verified = match outcome {
            UsmOutcome::Discovery { report } => {
                self.metrics.record_discovery();
                return Ok(Disposition::Discovery { reply: report });
            }
            UsmOutcome::Verified(verified) => verified,
        };

        let pdu = &verified.scoped.pdu;
        if !pdu.is_notification() {
            tracing::debug!(
                target: "snmp_trapd::dispatch",
                {
                    snmp.source = %datagram.source,
                    pdu = pdu.name()
                },
                "ignoring non-notification PDU"
            );
            return Ok(Disposition::Ignored { pdu: pdu.name() });
        }

        let reply = if pdu.is_inform() {
            match self.security.inform_response(&verified) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(
                        target: "snmp_trapd::dispatch",
                        {
                            snmp.source = %datagram.source,
                            error = %e
                        },
                        "could not encode inform response"
                    );
                    None
                }
            }
        } else {
            None
        };

        let trap = decoded_trap(datagram, verified);
        tracing::debug!(
            target: "snmp_trapd::dispatch",
            {
                snmp.source = %datagram.source,
                engine_id = %HexDisplay(&trap.engine_id),
                kind = trap.kind.as_str(),
                request_id = trap.request_id,
                varbinds = trap.varbinds.len()
            },
            "notification received"
        );
        let key = self.store.publish(trap);
        self.metrics.record_decoded();
        Ok(Disposition::Published { key, reply })
    }
}

fn decoded_trap(datagram: &RawDatagram, verified: VerifiedPdu) -> DecodedTrap {
    let scoped = verified.scoped;
    let kind = if scoped.pdu.is_inform() {
        TrapKind::Inform
    } else {
        TrapKind::Trap
    };
    DecodedTrap {
        source: datagram.source,
        engine_id: verified.engine_id,
        user_name: verified.user_name,
        context_name: scoped.context_name,
        kind,
        request_id: scoped.pdu.request_id,
        varbinds: scoped.pdu.varbinds,
        received_at: datagram.received_at,
    }
}

/// Builder for [`TrapReceiver`].
#[derive(Debug, Default)]
pub struct TrapReceiverBuilder {
    config: ReceiverConfig,
    users: Vec<UsmUserBuilder>,
    store: Option<Arc<TrapStateStore>>,
    cancel: Option<CancellationToken>,
}

impl TrapReceiverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting at once.
    pub fn config(mut self, config: ReceiverConfig) -> Self {
        self.config = config;
        self
    }

    /// Local address to listen on (default `0.0.0.0:162`).
    ///
    /// Use `[::]:162` for a dual-stack socket.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn engine_ttl(mut self, ttl: Duration) -> Self {
        self.config.engine_ttl = ttl;
        self
    }

    pub fn time_window(mut self, seconds: u32) -> Self {
        self.config.time_window = seconds;
        self
    }

    pub fn max_datagram_size(mut self, size: usize) -> Self {
        self.config.max_datagram_size = size;
        self
    }

    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.config.recv_buffer_size = Some(size);
        self
    }

    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.config.stats_interval = interval;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    pub fn engine_id(mut self, engine_id: impl Into<Bytes>) -> Self {
        self.config.engine_id = Some(engine_id.into());
        self
    }

    pub fn engine_boots(mut self, boots: u32) -> Self {
        self.config.engine_boots = boots;
        self
    }

    pub fn learn_engines(mut self, enabled: bool) -> Self {
        self.config.learn_engines = enabled;
        self
    }

    /// Accept authenticated traffic from this device engine.
    pub fn known_engine(mut self, engine_id: impl Into<Bytes>) -> Self {
        self.config.known_engines.push(engine_id.into());
        self
    }

    /// Add a USM user.
    ///
    /// ```rust
    /// # use snmp_trapd::{AuthProtocol, TrapReceiver};
    /// let builder = TrapReceiver::builder()
    ///     .usm_user("monitor", |u| u.auth(AuthProtocol::Md5, "maplesyrup"));
    /// ```
    pub fn usm_user<F>(mut self, name: impl Into<Bytes>, configure: F) -> Self
    where
        F: FnOnce(UsmUserBuilder) -> UsmUserBuilder,
    {
        self.users.push(configure(UsmUserBuilder::new(name)));
        self
    }

    /// Publish into an existing store instead of a fresh one.
    pub fn store(mut self, store: Arc<TrapStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an external shutdown token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validate the configuration, build the users and bind the socket.
    pub async fn build(self) -> Result<TrapReceiver> {
        let mut config = self.config;
        config.validate()?;

        let users = self
            .users
            .into_iter()
            .map(UsmUserBuilder::build)
            .collect::<Result<Vec<UsmUser>>>()?;

        let bind_addr = config.bind_addr;
        let socket = bind_udp_socket(bind_addr, config.recv_buffer_size)
            .await
            .map_err(|source| Error::Io {
                target: Some(bind_addr),
                source,
            })?;
        let local_addr = socket.local_addr().map_err(|source| Error::Io {
            target: Some(bind_addr),
            source,
        })?;

        let engine_id = config.engine_id.get_or_insert_with(generate_engine_id).clone();
        let started = Instant::now();
        let security = users.into_iter().fold(
            SecurityEngine::new(engine_id, config.engine_boots, started)
                .with_window(config.time_window)
                .with_engine_learning(config.learn_engines),
            SecurityEngine::with_user,
        );

        let engines = Arc::new(EngineCache::new(config.engine_ttl));
        for id in &config.known_engines {
            engines.pin(id.clone(), started);
        }

        tracing::debug!(
            target: "snmp_trapd::dispatch",
            {
                snmp.local_addr = %local_addr,
                engine_id = %HexDisplay(security.engine_id()),
                workers = config.workers,
                queue_capacity = config.queue_capacity
            },
            "trap receiver bound"
        );

        let store = self.store.unwrap_or_default();
        let metrics = Arc::new(Metrics::new());
        let pipeline = TrapPipeline::new(security, engines, store, metrics);

        Ok(TrapReceiver {
            inner: Arc::new(ReceiverInner {
                socket: Arc::new(socket),
                local_addr,
                config,
                pipeline: Arc::new(pipeline),
                cancel: self.cancel.unwrap_or_default(),
            }),
        })
    }
}

struct ReceiverInner {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    config: ReceiverConfig,
    pipeline: Arc<TrapPipeline>,
    cancel: CancellationToken,
}

/// SNMPv3 trap receiver bound to a UDP socket.
#[derive(Clone)]
pub struct TrapReceiver {
    inner: Arc<ReceiverInner>,
}

impl std::fmt::Debug for TrapReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrapReceiver")
            .field("local_addr", &self.inner.local_addr)
            .field("security", self.inner.pipeline.security())
            .finish_non_exhaustive()
    }
}

impl TrapReceiver {
    pub fn builder() -> TrapReceiverBuilder {
        TrapReceiverBuilder::new()
    }

    /// Actual bound address, useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.inner.config
    }

    /// Local snmpEngineID reported to discovery probes.
    pub fn engine_id(&self) -> &Bytes {
        self.inner.pipeline.security().engine_id()
    }

    pub fn store(&self) -> &Arc<TrapStateStore> {
        self.inner.pipeline.store()
    }

    pub fn engines(&self) -> &Arc<EngineCache> {
        self.inner.pipeline.engines()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.pipeline.metrics().snapshot()
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn cancel(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Receive until the cancellation token fires, then drain the workers.
    #[instrument(skip(self), err, fields(snmp.local_addr = %self.local_addr()))]
    pub async fn run(&self) -> Result<()> {
        let config = &self.inner.config;
        let (queue, receivers) = IntakeQueue::new(
            config.workers,
            config.queue_capacity,
            self.inner.pipeline.metrics().clone(),
        );

        let mut workers: Vec<JoinHandle<()>> = receivers
            .into_iter()
            .enumerate()
            .map(|(index, rx)| {
                tokio::spawn(worker_loop(
                    index,
                    rx,
                    self.inner.pipeline.clone(),
                    self.inner.socket.clone(),
                ))
            })
            .collect();
        let housekeeping = tokio::spawn(housekeeping_loop(
            self.inner.pipeline.clone(),
            config.stats_interval,
            self.inner.cancel.clone(),
        ));

        tracing::info!(target: "snmp_trapd::dispatch", workers = workers.len(), "trap receiver started");

        let mut buf = vec![0u8; config.max_datagram_size];
        loop {
            tokio::select! {
                result = self.inner.socket.recv_from(&mut buf) => match result {
                    Ok((len, source)) => {
                        let datagram = RawDatagram::new(Bytes::copy_from_slice(&buf[..len]), source);
                        if let Err(e) = queue.try_enqueue(datagram) {
                            tracing::warn!(
                                target: "snmp_trapd::dispatch",
                                {
                                    snmp.source = %source,
                                    kind = e.failure_kind().as_str(),
                                    len
                                },
                                "dropped datagram"
                            );
                        }
                    }
                    Err(e) => {
                        // ICMP errors surface on UDP receive; the socket stays usable
                        tracing::error!(target: "snmp_trapd::dispatch", error = %e, "trap receiver recv error");
                    }
                },
                _ = self.inner.cancel.cancelled() => {
                    tracing::info!(target: "snmp_trapd::dispatch", "trap receiver shutdown requested");
                    break;
                }
            }
        }

        // Closing the senders lets each worker finish what is queued
        drop(queue);
        let drain = async {
            for handle in workers.iter_mut() {
                if let Err(e) = handle.await {
                    tracing::error!(target: "snmp_trapd::dispatch", error = %e, "worker task failed");
                }
            }
        };
        if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
            tracing::warn!(
                target: "snmp_trapd::dispatch",
                timeout = ?config.shutdown_timeout,
                "workers did not drain in time, aborting"
            );
            for handle in &workers {
                handle.abort();
            }
        }
        if let Err(e) = housekeeping.await {
            tracing::error!(target: "snmp_trapd::dispatch", error = %e, "housekeeping task failed");
        }

        log_counters(&self.inner.pipeline);
        Ok(())
    }
}

async fn worker_loop(
    index: usize,
    mut rx: mpsc::Receiver<RawDatagram>,
    pipeline: Arc<TrapPipeline>,
    socket: Arc<UdpSocket>,
) {
    while let Some(datagram) = rx.recv().await {
        // Failures are already counted and logged by the pipeline
        let Ok(disposition) = pipeline.process(&datagram, Instant::now()) else {
            continue;
        };
        if let Some(reply) = disposition.reply()
            && let Err(e) = socket.send_to(reply, datagram.source).await
        {
            tracing::warn!(
                target: "snmp_trapd::dispatch",
                {
                    snmp.source = %datagram.source,
                    error = %e
                },
                "failed to send reply"
            );
        }
    }
    tracing::trace!(target: "snmp_trapd::dispatch", worker = index, "worker drained");
}

async fn housekeeping_loop(
    pipeline: Arc<TrapPipeline>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    // First tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = pipeline.engines().evict_expired(Instant::now());
                if evicted > 0 {
                    tracing::debug!(target: "snmp_trapd::engine", evicted, "evicted idle engine records");
                }
                log_counters(&pipeline);
            }
            _ = cancel.cancelled() => break,
        }
    }
}

fn log_counters(pipeline: &TrapPipeline) {
    let m = pipeline.metrics().snapshot();
    tracing::info!(
        target: "snmp_trapd::dispatch",
        decoded = m.decoded,
        auth_failed = m.auth_failed,
        priv_failed = m.priv_failed,
        replay_rejected = m.replay_rejected,
        queue_dropped = m.queue_dropped,
        malformed = m.malformed,
        protocol = m.protocol,
        unknown_engine = m.unknown_engine,
        unsupported = m.unsupported,
        discovery_reports = m.discovery_reports,
        legacy_dropped = m.legacy_dropped,
        engines = pipeline.engines().len(),
        devices = pipeline.store().len(),
        "trap receiver counters"
    );
}
