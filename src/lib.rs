//! # snmp-trapd
//!
//! Async SNMPv3 trap and inform receiver.
//!
//! Datagrams arrive on a UDP socket, are decoded from BER, authenticated and
//! decrypted under the User-based Security Model (RFC 3414), checked against
//! the per-engine anti-replay window, and published to a shared
//! [`TrapStateStore`] holding the latest notification per device.
//!
//! ## Layers
//!
//! - [`ber`]: strict BER decoder and a reverse-buffer encoder
//! - [`message`]: SNMPv3 message, scoped PDU and PDU structures
//! - [`v3`]: USM keys, HMAC, DES/AES privacy, engine cache, security engine
//! - [`dispatch`]: socket intake, worker pool, pipeline and counters
//! - [`store`]: the published trap state
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use snmp_trapd::{AuthProtocol, PrivProtocol, TrapReceiver};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> snmp_trapd::Result<()> {
//!     let receiver = TrapReceiver::builder()
//!         .bind("[::]:162".parse().unwrap())
//!         .usm_user("trapuser", |u| {
//!             u.auth(AuthProtocol::Sha1, "authpass123")
//!                 .privacy(PrivProtocol::Aes128, "privpass123")
//!         })
//!         .known_engine(&b"\x80\x00\x1f\x88\x04router1"[..])
//!         .build()
//!         .await?;
//!
//!     receiver.run().await
//! }
//! ```
//!
//! ## Tracing targets
//!
//! | Target | Events |
//! |--------|--------|
//! | `snmp_trapd::ber` | decode failures with offsets |
//! | `snmp_trapd::usm` | discovery, authentication and privacy outcomes |
//! | `snmp_trapd::engine` | engine record creation, boots changes, eviction |
//! | `snmp_trapd::dispatch` | dropped datagrams, replies, counters, lifecycle |

pub mod ber;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod oid;
pub mod prelude;
pub mod store;
pub mod v3;
pub mod value;
pub mod varbind;

pub(crate) mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use dispatch::{
    Disposition, IntakeQueue, Metrics, MetricsSnapshot, ReceiverConfig, TrapPipeline,
    TrapReceiver, TrapReceiverBuilder,
};
pub use error::{
    AlgorithmErrorKind, AuthErrorKind, CryptoErrorKind, DecodeErrorKind, Error, FailureKind,
    ProtocolErrorKind, ReplayErrorKind, Result,
};
pub use message::{Pdu, ScopedPdu, SecurityLevel, SnmpV3Message};
pub use oid::Oid;
pub use store::{DecodedTrap, RawDatagram, TrapKey, TrapKind, TrapStateStore};
pub use util::{HexDisplay, decode_hex, encode_hex};
pub use v3::{
    AuthProtocol, EngineCache, EngineRecord, ParseProtocolError, PrivProtocol, SecurityEngine,
    UsmUser,
};
pub use value::Value;
pub use varbind::VarBind;
