//! SNMPv3 User-based Security Model (RFC 3414) for notification receivers.
//!
//! - USM security parameters decoding and encoding
//! - Password-to-key derivation and key localization
//! - Authentication (HMAC-MD5-96, HMAC-SHA-96)
//! - Privacy (DES-CBC, AES-128-CFB)
//! - Per-engine timeliness state and the anti-replay window
//! - The receiver-side security engine tying these together

pub mod auth;
mod engine;
mod privacy;
mod security;
mod usm;

pub use auth::{LocalizedKey, MasterKey};
pub use engine::{
    DEFAULT_ENGINE_TTL, EngineCache, EngineOrigin, EngineRecord, MAX_ENGINE_BOOTS, MAX_ENGINE_TIME,
    TIME_WINDOW,
};
pub use privacy::{PrivKey, SaltCounter};
pub use security::{
    SecurityEngine, UserKeys, UsmOutcome, UsmUser, UsmUserBuilder, VerifiedPdu, report_oids,
};
pub use usm::{MAX_ENGINE_ID_LEN, MAX_USER_NAME_LEN, UsmSecurityParams, find_auth_params};

use crate::error::{AlgorithmErrorKind, Error};

/// Error returned when parsing a protocol name fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProtocolError {
    input: String,
    kind: ProtocolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolKind {
    Auth,
    Priv,
}

impl std::fmt::Display for ParseProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ProtocolKind::Auth => write!(
                f,
                "unknown authentication protocol '{}'; expected MD5 or SHA",
                self.input
            ),
            ProtocolKind::Priv => write!(
                f,
                "unknown privacy protocol '{}'; expected DES or AES",
                self.input
            ),
        }
    }
}

impl std::error::Error for ParseProtocolError {}

impl From<ParseProtocolError> for Error {
    fn from(e: ParseProtocolError) -> Self {
        Error::unsupported(AlgorithmErrorKind::UnknownProtocol(e.input.into()))
    }
}

/// Authentication protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthProtocol {
    /// HMAC-MD5-96 (RFC 3414)
    Md5,
    /// HMAC-SHA-96 (RFC 3414)
    Sha1,
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA"),
        }
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" | "HMAC-MD5-96" => Ok(Self::Md5),
            "SHA" | "SHA1" | "SHA-1" | "HMAC-SHA-96" => Ok(Self::Sha1),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                kind: ProtocolKind::Auth,
            }),
        }
    }
}

impl AuthProtocol {
    /// Digest output length in bytes, which is also the localized key length.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
        }
    }

    /// Truncated MAC length carried in msgAuthenticationParameters.
    pub fn mac_len(self) -> usize {
        12
    }
}

/// Privacy protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivProtocol {
    /// DES-CBC (RFC 3414 Section 8)
    Des,
    /// AES-128-CFB (RFC 3826)
    Aes128,
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Des => write!(f, "DES"),
            Self::Aes128 => write!(f, "AES"),
        }
    }
}

impl std::str::FromStr for PrivProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DES" | "DES-CBC" => Ok(Self::Des),
            "AES" | "AES128" | "AES-128" | "AES-128-CFB" => Ok(Self::Aes128),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                kind: ProtocolKind::Priv,
            }),
        }
    }
}

impl PrivProtocol {
    /// Bytes of localized key material the cipher consumes.
    ///
    /// DES uses 8 bytes of key plus an 8-byte pre-IV.
    pub fn key_len(self) -> usize {
        16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_protocol_parse() {
        assert_eq!("md5".parse::<AuthProtocol>().unwrap(), AuthProtocol::Md5);
        assert_eq!("SHA".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha1);
        assert_eq!("sha-1".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha1);
        assert!("sha256".parse::<AuthProtocol>().is_err());
    }

    #[test]
    fn test_priv_protocol_parse() {
        assert_eq!("des".parse::<PrivProtocol>().unwrap(), PrivProtocol::Des);
        assert_eq!("AES-128".parse::<PrivProtocol>().unwrap(), PrivProtocol::Aes128);
        assert!("3des".parse::<PrivProtocol>().is_err());
    }

    #[test]
    fn test_parse_error_maps_to_unsupported_algorithm() {
        let err: Error = "aes256".parse::<PrivProtocol>().unwrap_err().into();
        assert!(matches!(
            err,
            Error::UnsupportedAlgorithm {
                kind: AlgorithmErrorKind::UnknownProtocol(ref name)
            } if &**name == "aes256"
        ));
        assert_eq!(
            "sha512".parse::<AuthProtocol>().unwrap_err().to_string(),
            "unknown authentication protocol 'sha512'; expected MD5 or SHA"
        );
    }

    #[test]
    fn test_lengths() {
        assert_eq!(AuthProtocol::Md5.digest_len(), 16);
        assert_eq!(AuthProtocol::Sha1.digest_len(), 20);
        assert_eq!(AuthProtocol::Sha1.mac_len(), 12);
        assert_eq!(PrivProtocol::Des.key_len(), 16);
    }
}
