//! Error types for snmp-trapd.
//!
//! Every error describes the failure of a single datagram (or of startup
//! configuration). None of them carry key material or passphrases.
//!
//! All errors are `#[non_exhaustive]` to allow adding new variants without breaking changes.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::util::HexDisplay;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// BER decode error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Input ended before a complete TLV was read.
    TruncatedData,
    /// Indefinite length (0x80) is not permitted in SNMP.
    IndefiniteLength,
    /// Length field uses more octets than supported.
    LengthTooLong { octets: usize },
    /// Declared length exceeds the decoder limit.
    LengthExceedsMax { length: usize, max: usize },
    /// Declared length runs past the end of the buffer.
    TlvOverflow,
    /// Expected a specific tag.
    UnexpectedTag { expected: u8, actual: u8 },
    /// Tag not understood by the decoder.
    UnknownTag(u8),
    /// Zero-length INTEGER.
    ZeroLengthInteger,
    /// INTEGER or unsigned value too wide.
    IntegerOverflow,
    /// Zero-length OBJECT IDENTIFIER.
    ZeroLengthOid,
    /// Malformed OID content.
    InvalidOidEncoding,
    /// OID has more arcs than allowed.
    OidTooLong { count: usize, max: usize },
    /// NULL with non-zero length.
    InvalidNull,
    /// IpAddress that is not 4 octets.
    InvalidIpAddressLength { length: usize },
    /// Constructed OCTET STRING (0x24) is not supported.
    ConstructedOctetString,
    /// Values nested deeper than the decoder allows.
    NestingTooDeep { max: usize },
    /// Bytes left over after the top-level value.
    TrailingData { remaining: usize },
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncatedData => write!(f, "unexpected end of data"),
            Self::IndefiniteLength => write!(f, "indefinite length encoding not supported"),
            Self::LengthTooLong { octets } => {
                write!(f, "length encoding too long ({} octets)", octets)
            }
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {} exceeds maximum {}", length, max)
            }
            Self::TlvOverflow => write!(f, "TLV extends past end of data"),
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{:02X}, got 0x{:02X}", expected, actual)
            }
            Self::UnknownTag(t) => write!(f, "unknown tag 0x{:02X}", t),
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::ZeroLengthOid => write!(f, "zero-length object identifier"),
            Self::InvalidOidEncoding => write!(f, "invalid OID encoding"),
            Self::OidTooLong { count, max } => {
                write!(f, "OID has {} arcs, exceeds maximum {}", count, max)
            }
            Self::InvalidNull => write!(f, "NULL with non-zero length"),
            Self::InvalidIpAddressLength { length } => {
                write!(f, "IP address must be 4 bytes, got {}", length)
            }
            Self::ConstructedOctetString => {
                write!(f, "constructed OCTET STRING (0x24) not supported")
            }
            Self::NestingTooDeep { max } => write!(f, "nesting deeper than {}", max),
            Self::TrailingData { remaining } => {
                write!(f, "{} trailing bytes after value", remaining)
            }
        }
    }
}

/// Structural problems with an otherwise well-formed BER message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// SNMPv1 or SNMPv2c message, handled by the legacy fallback path.
    LegacyVersion(i64),
    /// Version number that no SNMP revision uses.
    UnknownVersion(i64),
    /// A sequence had the wrong number of elements.
    WrongElementCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A field had the wrong BER type.
    WrongType { field: &'static str },
    /// A numeric field outside its RFC 3412/3414 range.
    OutOfRange { field: &'static str, value: i64 },
    /// msgFlags must be exactly one octet.
    InvalidMsgFlagsLength { length: usize },
    /// Privacy flag set without the authentication flag.
    PrivWithoutAuth,
    /// Authentication flag set but authParameters empty.
    EmptyAuthParams,
    /// Security model other than USM (3).
    UnknownSecurityModel(i64),
    /// An octet string field exceeds its size limit.
    FieldTooLong {
        field: &'static str,
        length: usize,
        max: usize,
    },
    /// PDU tag not valid inside a scoped PDU.
    UnknownPduType(u8),
    /// Scoped PDU form does not match msgFlags.
    ScopedPduMismatch,
}

impl std::fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LegacyVersion(v) => write!(f, "legacy SNMP version {}", v),
            Self::UnknownVersion(v) => write!(f, "unknown SNMP version {}", v),
            Self::WrongElementCount {
                what,
                expected,
                actual,
            } => write!(f, "{} has {} elements, expected {}", what, actual, expected),
            Self::WrongType { field } => write!(f, "{} has wrong type", field),
            Self::OutOfRange { field, value } => write!(f, "{} out of range: {}", field, value),
            Self::InvalidMsgFlagsLength { length } => {
                write!(f, "msgFlags must be 1 octet, got {}", length)
            }
            Self::PrivWithoutAuth => write!(f, "invalid msgFlags: privacy without authentication"),
            Self::EmptyAuthParams => write!(f, "authentication flag set with empty authParameters"),
            Self::UnknownSecurityModel(m) => write!(f, "unknown security model: {}", m),
            Self::FieldTooLong { field, length, max } => {
                write!(f, "{} is {} octets, maximum {}", field, length, max)
            }
            Self::UnknownPduType(t) => write!(f, "unknown PDU type: 0x{:02X}", t),
            Self::ScopedPduMismatch => write!(f, "scoped PDU form does not match msgFlags"),
        }
    }
}

/// Authentication error kinds (SNMPv3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// User not found in USM table.
    UnknownUser,
    /// HMAC verification failed.
    HmacMismatch,
    /// Authentication parameters wrong length.
    WrongMacLength { expected: usize, actual: usize },
    /// Could not locate auth params in message.
    AuthParamsNotFound,
    /// Message without authentication for a user that requires it.
    MissingAuthentication,
    /// HMAC could not be keyed.
    InvalidKey,
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownUser => write!(f, "user not found"),
            Self::HmacMismatch => write!(f, "HMAC verification failed"),
            Self::WrongMacLength { expected, actual } => {
                write!(f, "wrong MAC length: expected {}, got {}", expected, actual)
            }
            Self::AuthParamsNotFound => write!(f, "could not locate auth params in message"),
            Self::MissingAuthentication => write!(f, "user requires authentication"),
            Self::InvalidKey => write!(f, "authentication key rejected"),
        }
    }
}

/// Reasons a message fell outside the anti-replay window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayErrorKind {
    /// engineBoots lower than recorded.
    BootsRegressed { recorded: u32, received: u32 },
    /// Recorded engineBoots has reached 2^31-1.
    BootsLatched,
    /// engineTime differs from the estimate by more than the window.
    OutsideWindow {
        estimated: u32,
        received: u32,
        window: u32,
    },
}

impl std::fmt::Display for ReplayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BootsRegressed { recorded, received } => {
                write!(f, "engineBoots {} below recorded {}", received, recorded)
            }
            Self::BootsLatched => write!(f, "engineBoots latched at maximum"),
            Self::OutsideWindow {
                estimated,
                received,
                window,
            } => write!(
                f,
                "engineTime {} outside {}s window around {}",
                received, window, estimated
            ),
        }
    }
}

/// Cryptographic error kinds (decryption).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoErrorKind {
    /// Invalid priv params length.
    InvalidPrivParamsLength { expected: usize, actual: usize },
    /// Ciphertext length not a multiple of block size.
    InvalidCiphertextLength { length: usize, block_size: usize },
    /// Invalid key length for cipher.
    InvalidKeyLength,
    /// Cipher operation failed.
    CipherError,
    /// Decrypted bytes are not a valid scoped PDU.
    GarbledPlaintext,
}

impl std::fmt::Display for CryptoErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPrivParamsLength { expected, actual } => {
                write!(
                    f,
                    "invalid privParameters length: expected {}, got {}",
                    expected, actual
                )
            }
            Self::InvalidCiphertextLength { length, block_size } => {
                write!(
                    f,
                    "ciphertext length {} not multiple of block size {}",
                    length, block_size
                )
            }
            Self::InvalidKeyLength => write!(f, "invalid key length"),
            Self::CipherError => write!(f, "cipher operation failed"),
            Self::GarbledPlaintext => write!(f, "decrypted data is not a valid scoped PDU"),
        }
    }
}

/// Algorithm negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlgorithmErrorKind {
    /// Protocol name not supported by this receiver.
    UnknownProtocol(Box<str>),
    /// Message is authenticated but the user has no auth protocol.
    NoAuthProtocol,
    /// Message is encrypted but the user has no privacy protocol.
    NoPrivProtocol,
}

impl std::fmt::Display for AlgorithmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProtocol(name) => write!(f, "unsupported protocol '{}'", name),
            Self::NoAuthProtocol => write!(f, "user has no authentication protocol"),
            Self::NoPrivProtocol => write!(f, "user has no privacy protocol"),
        }
    }
}

/// Coarse failure label used for log fields and drop counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Io,
    Config,
    Malformed,
    Protocol,
    Legacy,
    UnknownEngine,
    AuthFailed,
    ReplayRejected,
    PrivFailed,
    Unsupported,
    QueueSaturated,
}

impl FailureKind {
    /// Stable snake_case label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::Config => "config",
            Self::Malformed => "malformed_encoding",
            Self::Protocol => "protocol_violation",
            Self::Legacy => "legacy_version",
            Self::UnknownEngine => "unknown_engine",
            Self::AuthFailed => "authentication_failed",
            Self::ReplayRejected => "clock_skew_rejected",
            Self::PrivFailed => "privacy_decrypt_failed",
            Self::Unsupported => "unsupported_algorithm",
            Self::QueueSaturated => "queue_saturated",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Library error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Socket I/O error.
    #[error("I/O error{}: {source}", target.map(|t| format!(" communicating with {}", t)).unwrap_or_default())]
    Io {
        target: Option<SocketAddr>,
        #[source]
        source: std::io::Error,
    },

    /// Invalid receiver configuration.
    #[error("invalid configuration: {0}")]
    Config(Box<str>),

    /// OID string that is not dotted decimal.
    #[error("invalid OID: '{input}'")]
    InvalidOid { input: Box<str> },

    /// BER decoding error.
    #[error("malformed encoding at offset {offset}: {kind}")]
    MalformedEncoding {
        offset: usize,
        kind: DecodeErrorKind,
    },

    /// Well-formed BER that is not a valid SNMPv3 message.
    #[error("protocol violation: {kind}")]
    ProtocolViolation { kind: ProtocolErrorKind },

    /// No engine record for an authenticated message.
    #[error("unknown engine ID {}", HexDisplay(engine_id))]
    UnknownEngine { engine_id: Bytes },

    /// Authentication failed (SNMPv3).
    #[error("authentication failed: {kind}")]
    AuthenticationFailed { kind: AuthErrorKind },

    /// Message outside the anti-replay window.
    #[error("clock skew rejected: {kind}")]
    ClockSkewRejected { kind: ReplayErrorKind },

    /// Decryption failed (SNMPv3).
    #[error("privacy decrypt failed: {kind}")]
    PrivacyDecryptFailed { kind: CryptoErrorKind },

    /// Algorithm not configured or not supported.
    #[error("unsupported algorithm: {kind}")]
    UnsupportedAlgorithm { kind: AlgorithmErrorKind },

    /// Intake queue full; datagram dropped.
    #[error("intake queue saturated, dropped datagram from {source_addr}")]
    QueueSaturated { source_addr: SocketAddr },
}

impl Error {
    /// Create a decode error.
    pub fn decode(offset: usize, kind: DecodeErrorKind) -> Self {
        Self::MalformedEncoding { offset, kind }
    }

    /// Create a protocol violation.
    pub fn protocol(kind: ProtocolErrorKind) -> Self {
        Self::ProtocolViolation { kind }
    }

    /// Create an authentication error.
    pub fn auth(kind: AuthErrorKind) -> Self {
        Self::AuthenticationFailed { kind }
    }

    /// Create an anti-replay rejection.
    pub fn replay(kind: ReplayErrorKind) -> Self {
        Self::ClockSkewRejected { kind }
    }

    /// Create a decryption error.
    pub fn decrypt(kind: CryptoErrorKind) -> Self {
        Self::PrivacyDecryptFailed { kind }
    }

    /// Create an unsupported algorithm error.
    pub fn unsupported(kind: AlgorithmErrorKind) -> Self {
        Self::UnsupportedAlgorithm { kind }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<Box<str>>) -> Self {
        Self::Config(msg.into())
    }

    /// Coarse classification for logs and counters.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Io { .. } => FailureKind::Io,
            Self::Config(_) | Self::InvalidOid { .. } => FailureKind::Config,
            Self::MalformedEncoding { .. } => FailureKind::Malformed,
            Self::ProtocolViolation {
                kind: ProtocolErrorKind::LegacyVersion(_),
            } => FailureKind::Legacy,
            Self::ProtocolViolation { .. } => FailureKind::Protocol,
            Self::UnknownEngine { .. } => FailureKind::UnknownEngine,
            Self::AuthenticationFailed { .. } => FailureKind::AuthFailed,
            Self::ClockSkewRejected { .. } => FailureKind::ReplayRejected,
            Self::PrivacyDecryptFailed { .. } => FailureKind::PrivFailed,
            Self::UnsupportedAlgorithm { .. } => FailureKind::Unsupported,
            Self::QueueSaturated { .. } => FailureKind::QueueSaturated,
        }
    }
}
