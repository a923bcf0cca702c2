//! Command-line arguments for the `snmp-trapd` daemon.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;

use crate::dispatch::TrapReceiverBuilder;
use crate::util::decode_hex;
use crate::v3::{AuthProtocol, PrivProtocol};

/// Receive SNMPv3 traps and informs and print them as JSON lines.
#[derive(Debug, Parser)]
#[command(name = "snmp-trapd", version, about)]
pub struct Args {
    /// Address to listen on. Use [::]:162 for dual-stack.
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0:162")]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub v3: V3Args,

    /// Additional user as NAME[:AUTH:AUTHPASS[:PRIV:PRIVPASS]] (repeatable).
    #[arg(long = "user", value_name = "SPEC")]
    pub users: Vec<UserSpec>,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl Args {
    /// Map the arguments onto a receiver builder.
    pub fn receiver_builder(&self) -> Result<TrapReceiverBuilder, String> {
        let mut builder = TrapReceiverBuilder::new()
            .bind(self.bind)
            .workers(self.runtime.workers)
            .queue_capacity(self.runtime.queue_capacity)
            .engine_ttl(Duration::from_secs(self.engine.engine_ttl))
            .time_window(self.engine.window)
            .stats_interval(Duration::from_secs(self.runtime.stats_interval))
            .shutdown_timeout(Duration::from_secs(self.runtime.shutdown_timeout))
            .engine_boots(self.engine.engine_boots)
            .learn_engines(self.engine.learn_engines);

        if let Some(size) = self.runtime.recv_buffer {
            builder = builder.recv_buffer_size(size);
        }
        if let Some(id) = &self.engine.engine_id {
            builder = builder.engine_id(id.0.clone());
        }
        for id in &self.engine.known_engines {
            builder = builder.known_engine(id.0.clone());
        }

        let users = self.v3.user_spec()?.into_iter().chain(self.users.iter().cloned());
        let mut any_user = false;
        for spec in users {
            any_user = true;
            builder = builder.usm_user(spec.name.clone(), |mut u| {
                if let Some((protocol, password)) = &spec.auth {
                    u = u.auth(*protocol, password);
                }
                if let Some((protocol, password)) = &spec.privacy {
                    u = u.privacy(*protocol, password);
                }
                u
            });
        }
        if !any_user {
            return Err("at least one user is required (-u or --user)".into());
        }
        Ok(builder)
    }
}

/// Primary USM user.
#[derive(Debug, Parser)]
pub struct V3Args {
    /// Security name/username.
    #[arg(short = 'u', long = "username")]
    pub username: Option<String>,

    /// Authentication protocol: MD5 or SHA.
    #[arg(short = 'a', long = "auth-protocol")]
    pub auth_protocol: Option<AuthProtocol>,

    /// Authentication passphrase.
    #[arg(short = 'A', long = "auth-password")]
    pub auth_password: Option<String>,

    /// Privacy protocol: DES or AES.
    #[arg(short = 'x', long = "priv-protocol")]
    pub priv_protocol: Option<PrivProtocol>,

    /// Privacy passphrase.
    #[arg(short = 'X', long = "priv-password")]
    pub priv_password: Option<String>,
}

impl V3Args {
    /// The user described by `-u/-a/-A/-x/-X`, if any.
    pub fn user_spec(&self) -> Result<Option<UserSpec>, String> {
        let Some(name) = &self.username else {
            if self.auth_protocol.is_some() || self.priv_protocol.is_some() {
                return Err("-a/-x require a username (-u)".into());
            }
            return Ok(None);
        };
        let auth = match self.auth_protocol {
            Some(proto) => {
                let pass = self.auth_password.as_ref().ok_or("auth password required")?;
                Some((proto, pass.clone()))
            }
            None => None,
        };
        let privacy = match self.priv_protocol {
            Some(_) if auth.is_none() => {
                return Err("privacy requires an auth protocol (-a)".into());
            }
            Some(proto) => {
                let pass = self.priv_password.as_ref().ok_or("priv password required")?;
                Some((proto, pass.clone()))
            }
            None => None,
        };
        Ok(Some(UserSpec {
            name: name.clone(),
            auth,
            privacy,
        }))
    }
}

/// A user given as `NAME[:AUTH:AUTHPASS[:PRIV:PRIVPASS]]`.
#[derive(Clone)]
pub struct UserSpec {
    pub name: String,
    pub auth: Option<(AuthProtocol, String)>,
    pub privacy: Option<(PrivProtocol, String)>,
}

impl std::fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSpec")
            .field("name", &self.name)
            .field("auth", &self.auth.as_ref().map(|(p, _)| p))
            .field("privacy", &self.privacy.as_ref().map(|(p, _)| p))
            .finish()
    }
}

impl FromStr for UserSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Passphrases may contain ':' in the last field only
        let parts: Vec<&str> = s.splitn(5, ':').collect();
        let name = parts[0];
        if name.is_empty() {
            return Err("user name must not be empty".into());
        }
        let auth = match parts.get(1..3) {
            Some([proto, pass]) => {
                let proto = proto.parse::<AuthProtocol>().map_err(|e| e.to_string())?;
                Some((proto, pass.to_string()))
            }
            _ if parts.len() == 1 => None,
            _ => return Err(format!("expected NAME:AUTH:AUTHPASS, got '{}'", name)),
        };
        let privacy = match parts.get(3..5) {
            Some([proto, pass]) => {
                let proto = proto.parse::<PrivProtocol>().map_err(|e| e.to_string())?;
                Some((proto, pass.to_string()))
            }
            _ if parts.len() <= 3 => None,
            _ => return Err(format!("expected NAME:AUTH:AUTHPASS:PRIV:PRIVPASS for '{}'", name)),
        };
        Ok(Self {
            name: name.to_string(),
            auth,
            privacy,
        })
    }
}

/// Engine ID given in hex, with optional `0x` prefix and `:` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexEngineId(pub Bytes);

impl FromStr for HexEngineId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match decode_hex(s) {
            Some(bytes) if !bytes.is_empty() => Ok(Self(Bytes::from(bytes))),
            _ => Err(format!("invalid engine ID '{}': expected hex", s)),
        }
    }
}

/// Engine identity and anti-replay settings.
#[derive(Debug, Parser)]
pub struct EngineArgs {
    /// Local engine ID in hex (generated if omitted).
    #[arg(long = "engine-id")]
    pub engine_id: Option<HexEngineId>,

    /// Local engine boots.
    #[arg(long = "engine-boots", default_value = "1")]
    pub engine_boots: u32,

    /// Device engine ID in hex to accept traffic from (repeatable).
    #[arg(short = 'e', long = "known-engine", value_name = "HEX")]
    pub known_engines: Vec<HexEngineId>,

    /// Accept authenticated traffic from engines not listed with -e.
    #[arg(long = "learn-engines")]
    pub learn_engines: bool,

    /// Anti-replay window in seconds.
    #[arg(short = 'w', long = "window", default_value = "150")]
    pub window: u32,

    /// Seconds an idle engine record is kept.
    #[arg(long = "engine-ttl", default_value = "86400")]
    pub engine_ttl: u64,
}

/// Worker pool and queue sizing.
#[derive(Debug, Parser)]
pub struct RuntimeArgs {
    /// Worker tasks.
    #[arg(long = "workers", default_value = "4")]
    pub workers: usize,

    /// Total intake queue capacity.
    #[arg(long = "queue-capacity", default_value = "1024")]
    pub queue_capacity: usize,

    /// Socket receive buffer size in bytes.
    #[arg(long = "recv-buffer")]
    pub recv_buffer: Option<usize>,

    /// Seconds between counter logs and engine eviction sweeps.
    #[arg(long = "stats-interval", default_value = "60")]
    pub stats_interval: u64,

    /// Seconds to let workers drain on shutdown.
    #[arg(long = "shutdown-timeout", default_value = "5")]
    pub shutdown_timeout: u64,
}

/// Output and logging.
#[derive(Debug, Parser)]
pub struct OutputArgs {
    /// Milliseconds between store polls.
    ///
    /// The store keeps only the latest notification per device, so a device
    /// that sends more than one within a poll period is printed once, with
    /// its newest notification.
    #[arg(long = "poll", default_value = "500")]
    pub poll_ms: u64,

    /// Omit well-known OID names from the output.
    #[arg(long = "no-hints")]
    pub no_hints: bool,

    /// Print counters as a JSON line on exit.
    #[arg(long = "stats")]
    pub stats: bool,

    /// Enable debug logging.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Enable trace logging.
    #[arg(long = "trace")]
    pub trace: bool,
}

impl OutputArgs {
    /// Initialize tracing on stderr. `RUST_LOG` takes precedence over the flags.
    pub fn init_tracing(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = if self.trace {
            "snmp_trapd=trace"
        } else if self.debug {
            "snmp_trapd=debug"
        } else {
            "snmp_trapd=info"
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
            )
            .with_writer(std::io::stderr)
            .try_init();
    }
}
