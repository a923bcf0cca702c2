//! Privacy (encryption) protocols for SNMPv3 (RFC 3414, RFC 3826).
//!
//! ## DES-CBC
//! - Key: first 8 bytes of the 16-byte localized privacy key
//! - IV: pre-IV (last 8 bytes of the key) XOR salt (privParameters)
//!
//! ## AES-128-CFB
//! - Key: first 16 bytes of the localized privacy key
//! - IV: engineBoots (4) || engineTime (4) || salt (8), concatenated

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::PrivProtocol;
use super::auth::LocalizedKey;
use crate::error::{CryptoErrorKind, Error, Result};

/// Salt length carried in msgPrivacyParameters.
pub const SALT_LEN: usize = 8;

/// Thread-safe salt source for outgoing encrypted messages.
pub struct SaltCounter(AtomicU64);

impl SaltCounter {
    /// Seed from the OS random source.
    ///
    /// A failing random source falls back to the clock; the salt only has to
    /// be unique per key, not secret.
    pub fn new() -> Self {
        let mut buf = [0u8; 8];
        let seed = match getrandom::fill(&mut buf) {
            Ok(()) => u64::from_ne_bytes(buf),
            Err(e) => {
                tracing::warn!(target: "snmp_trapd::usm", error = %e, "getrandom failed, seeding salt from clock");
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(1)
            }
        };
        Self(AtomicU64::new(seed))
    }

    /// Start at a fixed value.
    pub fn from_value(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Next salt; zero is skipped on wraparound, as net-snmp does.
    pub fn next(&self) -> u64 {
        let val = self.0.fetch_add(1, Ordering::Relaxed);
        if val == 0 {
            self.0.fetch_add(1, Ordering::Relaxed)
        } else {
            val
        }
    }
}

impl Default for SaltCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Localized privacy key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: PrivProtocol,
}

impl PrivKey {
    /// Build from a key localized with the user's auth protocol hash.
    ///
    /// Both MD5 (16 bytes) and SHA-1 (20 bytes) outputs cover the 16 bytes
    /// DES and AES-128 need; extra bytes are ignored.
    pub fn from_localized(protocol: PrivProtocol, key: &LocalizedKey) -> Result<Self> {
        Self::from_bytes(protocol, key.as_bytes())
    }

    /// Use raw localized key bytes.
    pub fn from_bytes(protocol: PrivProtocol, key: &[u8]) -> Result<Self> {
        let Some(key) = key.get(..protocol.key_len()) else {
            return Err(Error::decrypt(CryptoErrorKind::InvalidKeyLength));
        };
        Ok(Self {
            key: key.to_vec(),
            protocol,
        })
    }

    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    /// Encrypt a serialized scoped PDU, returning (ciphertext, privParameters).
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: &SaltCounter,
    ) -> Result<(Bytes, Bytes)> {
        match self.protocol {
            PrivProtocol::Des => self.encrypt_des(plaintext, engine_boots, salt.next()),
            PrivProtocol::Aes128 => self.encrypt_aes(plaintext, engine_boots, engine_time, salt.next()),
        }
    }

    /// Decrypt an encryptedPDU using the privParameters from the message.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8],
    ) -> Result<Bytes> {
        let Ok(salt) = <[u8; SALT_LEN]>::try_from(priv_params) else {
            return Err(Error::decrypt(CryptoErrorKind::InvalidPrivParamsLength {
                expected: SALT_LEN,
                actual: priv_params.len(),
            }));
        };

        match self.protocol {
            PrivProtocol::Des => self.decrypt_des(ciphertext, salt),
            PrivProtocol::Aes128 => self.decrypt_aes(ciphertext, engine_boots, engine_time, salt),
        }
    }

    fn des_iv(&self, salt: &[u8; SALT_LEN]) -> [u8; 8] {
        let mut iv = [0u8; 8];
        for (i, b) in iv.iter_mut().enumerate() {
            *b = self.key[8 + i] ^ salt[i];
        }
        iv
    }

    fn aes_iv(engine_boots: u32, engine_time: u32, salt: &[u8; SALT_LEN]) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
        iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
        iv[8..].copy_from_slice(salt);
        iv
    }

    /// DES-CBC encryption (RFC 3414 Section 8.1.1.1).
    fn encrypt_des(&self, plaintext: &[u8], engine_boots: u32, counter: u64) -> Result<(Bytes, Bytes)> {
        use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
        type DesCbc = cbc::Encryptor<des::Des>;

        // salt = engineBoots || local counter
        let mut salt = [0u8; SALT_LEN];
        salt[..4].copy_from_slice(&engine_boots.to_be_bytes());
        salt[4..].copy_from_slice(&(counter as u32).to_be_bytes());
        let iv = self.des_iv(&salt);

        // Zero padding to the block size; the receiver ignores it
        let padded_len = plaintext.len().div_ceil(8) * 8;
        let mut buffer = vec![0u8; padded_len.max(8)];
        buffer[..plaintext.len()].copy_from_slice(plaintext);
        let len = buffer.len();

        let cipher = DesCbc::new_from_slices(&self.key[..8], &iv)
            .map_err(|_| Error::decrypt(CryptoErrorKind::InvalidKeyLength))?;
        let ciphertext = cipher
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .map_err(|_| Error::decrypt(CryptoErrorKind::CipherError))?;

        Ok((Bytes::copy_from_slice(ciphertext), Bytes::copy_from_slice(&salt)))
    }

    /// DES-CBC decryption (RFC 3414 Section 8.1.1.2).
    fn decrypt_des(&self, ciphertext: &[u8], salt: [u8; SALT_LEN]) -> Result<Bytes> {
        use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
        type DesCbc = cbc::Decryptor<des::Des>;

        if ciphertext.is_empty() || !ciphertext.len().is_multiple_of(8) {
            return Err(Error::decrypt(CryptoErrorKind::InvalidCiphertextLength {
                length: ciphertext.len(),
                block_size: 8,
            }));
        }

        let iv = self.des_iv(&salt);
        let cipher = DesCbc::new_from_slices(&self.key[..8], &iv)
            .map_err(|_| Error::decrypt(CryptoErrorKind::InvalidKeyLength))?;

        let mut buffer = ciphertext.to_vec();
        let plaintext = cipher
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| Error::decrypt(CryptoErrorKind::CipherError))?;

        Ok(Bytes::copy_from_slice(plaintext))
    }

    /// AES-128-CFB encryption (RFC 3826 Section 3.1.3).
    fn encrypt_aes(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        counter: u64,
    ) -> Result<(Bytes, Bytes)> {
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
        type Aes128Cfb = cfb_mode::Encryptor<aes::Aes128>;

        let salt = counter.to_be_bytes();
        let iv = Self::aes_iv(engine_boots, engine_time, &salt);

        let mut buffer = plaintext.to_vec();
        Aes128Cfb::new_from_slices(&self.key[..16], &iv)
            .map_err(|_| Error::decrypt(CryptoErrorKind::InvalidKeyLength))?
            .encrypt(&mut buffer);

        Ok((Bytes::from(buffer), Bytes::copy_from_slice(&salt)))
    }

    /// AES-128-CFB decryption (RFC 3826 Section 3.1.4).
    fn decrypt_aes(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: [u8; SALT_LEN],
    ) -> Result<Bytes> {
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
        type Aes128Cfb = cfb_mode::Decryptor<aes::Aes128>;

        let iv = Self::aes_iv(engine_boots, engine_time, &salt);

        let mut buffer = ciphertext.to_vec();
        Aes128Cfb::new_from_slices(&self.key[..16], &iv)
            .map_err(|_| Error::decrypt(CryptoErrorKind::InvalidKeyLength))?
            .decrypt(&mut buffer);

        Ok(Bytes::from(buffer))
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
