//! Authentication key derivation and HMAC operations (RFC 3414).
//!
//! - Password-to-key derivation (1MB expansion + hash), done once per user
//!   at configuration time
//! - Key localization (binding a master key to an engine ID), done per
//!   engine on the receive path
//! - HMAC-96 computation and constant-time verification

use digest::{Digest, KeyInit, Mac};
use hmac::Hmac;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::AuthProtocol;
use crate::error::{AuthErrorKind, Error, Result};

/// Passwords shorter than this are accepted but logged (net-snmp refuses them).
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Length of the password expansion in RFC 3414 A.2.1.
const EXPANSION_SIZE: usize = 1_048_576;

/// Master key (Ku): the hashed password expansion, not yet bound to an engine.
///
/// Deriving this costs a megabyte of hashing, so it is computed once and
/// then localized cheaply for every engine a trap arrives from.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl MasterKey {
    /// Run the password-to-key algorithm (RFC 3414 A.2.1).
    ///
    /// An empty password yields an all-zero key.
    pub fn from_password(protocol: AuthProtocol, password: &[u8]) -> Self {
        if password.len() < MIN_PASSWORD_LENGTH {
            tracing::warn!(
                target: "snmp_trapd::usm",
                password_len = password.len(),
                min_len = MIN_PASSWORD_LENGTH,
                "SNMPv3 password shorter than recommended minimum"
            );
        }
        let key = match protocol {
            AuthProtocol::Md5 => password_to_key::<md5::Md5>(password),
            AuthProtocol::Sha1 => password_to_key::<sha1::Sha1>(password),
        };
        Self { key, protocol }
    }

    /// Use precomputed master key bytes (e.g. from a key file).
    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Bind to an engine: Kul = H(Ku || engineID || Ku) (RFC 3414 A.2.2).
    pub fn localize(&self, engine_id: &[u8]) -> LocalizedKey {
        let key = match self.protocol {
            AuthProtocol::Md5 => localize::<md5::Md5>(&self.key, engine_id),
            AuthProtocol::Sha1 => localize::<sha1::Sha1>(&self.key, engine_id),
        };
        LocalizedKey {
            key,
            protocol: self.protocol,
        }
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Localized key (Kul), usable for HMAC on messages of one engine.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl LocalizedKey {
    /// Derive from a password and engine ID in one step.
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Self {
        MasterKey::from_password(protocol, password).localize(engine_id)
    }

    /// Use already-localized key bytes.
    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Truncated MAC length (12 for both HMAC-96 variants).
    pub fn mac_len(&self) -> usize {
        self.protocol.mac_len()
    }

    /// Compute the truncated HMAC over `data`.
    pub fn compute_hmac(&self, data: &[u8]) -> Result<Vec<u8>> {
        let full = match self.protocol {
            AuthProtocol::Md5 => hmac_full::<Hmac<md5::Md5>>(&self.key, data)?,
            AuthProtocol::Sha1 => hmac_full::<Hmac<sha1::Sha1>>(&self.key, data)?,
        };
        Ok(full[..self.mac_len()].to_vec())
    }

    /// Check a received MAC in constant time.
    pub fn verify_hmac(&self, data: &[u8], expected: &[u8]) -> Result<()> {
        let computed = self.compute_hmac(data)?;
        if computed.len() == expected.len() && bool::from(computed.ct_eq(expected)) {
            Ok(())
        } else {
            Err(Error::auth(AuthErrorKind::HmacMismatch))
        }
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn password_to_key<D: Digest>(password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![0u8; <D as Digest>::output_size()];
    }

    // Hash the 1MB repetition in 64-byte chunks, as net-snmp does
    let mut hasher = D::new();
    let mut buf = [0u8; 64];
    let mut index = 0;
    for _ in 0..EXPANSION_SIZE / buf.len() {
        for byte in &mut buf {
            *byte = password[index];
            index = (index + 1) % password.len();
        }
        hasher.update(buf);
    }
    buf.zeroize();
    hasher.finalize().to_vec()
}

fn localize<D: Digest>(master_key: &[u8], engine_id: &[u8]) -> Vec<u8> {
    let mut hasher = D::new();
    hasher.update(master_key);
    hasher.update(engine_id);
    hasher.update(master_key);
    hasher.finalize().to_vec()
}

fn hmac_full<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|_| Error::auth(AuthErrorKind::InvalidKey))?;
    Mac::update(&mut mac, data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Write the MAC of an outgoing message into its zeroed authParameters field.
pub fn authenticate_message(
    key: &LocalizedKey,
    message: &mut [u8],
    auth_offset: usize,
    auth_len: usize,
) -> Result<()> {
    let mac = key.compute_hmac(message)?;
    let Some(field) = message.get_mut(auth_offset..auth_offset + auth_len) else {
        return Err(Error::auth(AuthErrorKind::AuthParamsNotFound));
    };
    if field.len() != mac.len() {
        return Err(Error::auth(AuthErrorKind::WrongMacLength {
            expected: mac.len(),
            actual: field.len(),
        }));
    }
    field.copy_from_slice(&mac);
    Ok(())
}

/// Verify an incoming message: HMAC over the whole message with the
/// authParameters content replaced by zeros.
pub fn verify_message(
    key: &LocalizedKey,
    message: &[u8],
    auth_offset: usize,
    auth_len: usize,
) -> Result<()> {
    if auth_len != key.mac_len() {
        return Err(Error::auth(AuthErrorKind::WrongMacLength {
            expected: key.mac_len(),
            actual: auth_len,
        }));
    }
    let Some(received) = message.get(auth_offset..auth_offset + auth_len) else {
        return Err(Error::auth(AuthErrorKind::AuthParamsNotFound));
    };

    let mut zeroed = message.to_vec();
    zeroed[auth_offset..auth_offset + auth_len].fill(0);
    key.verify_hmac(&zeroed, received)
}
