//! Receiver-side USM processing (RFC 3414 Section 3.2).
//!
//! [`SecurityEngine::authenticate_and_decrypt`] takes a parsed message and
//! the raw bytes it came from, and either answers an engine discovery probe
//! or returns the verified scoped PDU. Checks run in a fixed order: engine
//! lookup, user lookup, HMAC, timeliness, decryption. Engine state is only
//! advanced once every check has passed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use bytes::Bytes;
use zeroize::Zeroizing;

use super::auth::{LocalizedKey, MasterKey, authenticate_message, verify_message};
use super::engine::{EngineCache, EngineOrigin, MAX_ENGINE_TIME, TIME_WINDOW};
use super::privacy::{PrivKey, SaltCounter};
use super::usm::{MAX_USER_NAME_LEN, UsmSecurityParams, find_auth_params};
use super::{AuthProtocol, PrivProtocol};
use crate::ber::{decode_prefix, tag};
use crate::error::{
    AlgorithmErrorKind, AuthErrorKind, CryptoErrorKind, Error, ProtocolErrorKind, Result,
};
use crate::message::{
    LOCAL_MSG_MAX_SIZE, MsgFlags, MsgGlobalData, Pdu, ScopedPdu, ScopedPduData, SecurityLevel,
    SnmpV3Message,
};
use crate::util::HexDisplay;
use crate::value::Value;
use crate::varbind::VarBind;

/// usmStats counters carried in Report PDUs (RFC 3414 Section 5).
pub mod report_oids {
    use crate::oid;
    use crate::oid::Oid;

    /// usmStatsUnknownEngineIDs.0
    pub fn unknown_engine_ids() -> Oid {
        oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0)
    }
}

enum Secret {
    Password(Zeroizing<Vec<u8>>),
    MasterKey(Zeroizing<Vec<u8>>),
}

impl Secret {
    fn into_master_key(self, protocol: AuthProtocol) -> Result<MasterKey> {
        match self {
            Secret::Password(password) => Ok(MasterKey::from_password(protocol, &password)),
            Secret::MasterKey(key) => {
                if key.len() != protocol.digest_len() {
                    return Err(Error::config(format!(
                        "{} master key must be {} bytes, got {}",
                        protocol,
                        protocol.digest_len(),
                        key.len()
                    )));
                }
                Ok(MasterKey::from_bytes(protocol, key.to_vec()))
            }
        }
    }
}

/// Builder for [`UsmUser`], used through
/// [`TrapReceiverBuilder::usm_user`](crate::dispatch::TrapReceiverBuilder::usm_user).
pub struct UsmUserBuilder {
    name: Bytes,
    auth: Option<(AuthProtocol, Secret)>,
    privacy: Option<(PrivProtocol, Secret)>,
}

impl std::fmt::Debug for UsmUserBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsmUserBuilder")
            .field("name", &String::from_utf8_lossy(&self.name))
            .field("auth", &self.auth.as_ref().map(|(p, _)| p))
            .field("privacy", &self.privacy.as_ref().map(|(p, _)| p))
            .finish()
    }
}

impl UsmUserBuilder {
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            auth: None,
            privacy: None,
        }
    }

    /// Authentication passphrase.
    pub fn auth(mut self, protocol: AuthProtocol, password: impl AsRef<[u8]>) -> Self {
        self.auth = Some((protocol, Secret::Password(Zeroizing::new(password.as_ref().to_vec()))));
        self
    }

    /// Precomputed authentication master key (Ku), skipping password expansion.
    pub fn auth_key(mut self, protocol: AuthProtocol, key: impl AsRef<[u8]>) -> Self {
        self.auth = Some((protocol, Secret::MasterKey(Zeroizing::new(key.as_ref().to_vec()))));
        self
    }

    /// Privacy passphrase. Requires authentication.
    pub fn privacy(mut self, protocol: PrivProtocol, password: impl AsRef<[u8]>) -> Self {
        self.privacy = Some((protocol, Secret::Password(Zeroizing::new(password.as_ref().to_vec()))));
        self
    }

    /// Precomputed privacy master key, hashed with the auth protocol.
    pub fn privacy_key(mut self, protocol: PrivProtocol, key: impl AsRef<[u8]>) -> Self {
        self.privacy = Some((protocol, Secret::MasterKey(Zeroizing::new(key.as_ref().to_vec()))));
        self
    }

    /// Run password-to-key for the configured secrets.
    pub fn build(self) -> Result<UsmUser> {
        if self.name.len() > MAX_USER_NAME_LEN {
            return Err(Error::config(format!(
                "user name is {} octets, maximum {}",
                self.name.len(),
                MAX_USER_NAME_LEN
            )));
        }
        let auth = match self.auth {
            Some((protocol, secret)) => Some(secret.into_master_key(protocol)?),
            None => None,
        };
        let privacy = match (self.privacy, &auth) {
            (None, _) => None,
            (Some(_), None) => {
                return Err(Error::config(format!(
                    "user '{}' has privacy without authentication",
                    String::from_utf8_lossy(&self.name)
                )));
            }
            (Some((protocol, secret)), Some(auth)) => {
                Some((protocol, secret.into_master_key(auth.protocol())?))
            }
        };
        Ok(UsmUser {
            name: self.name,
            auth,
            privacy,
        })
    }
}

/// A configured USM user with derived master keys.
#[derive(Clone, Debug)]
pub struct UsmUser {
    name: Bytes,
    auth: Option<MasterKey>,
    privacy: Option<(PrivProtocol, MasterKey)>,
}

impl UsmUser {
    pub fn builder(name: impl Into<Bytes>) -> UsmUserBuilder {
        UsmUserBuilder::new(name)
    }

    pub fn name(&self) -> &Bytes {
        &self.name
    }

    pub fn auth_protocol(&self) -> Option<AuthProtocol> {
        self.auth.as_ref().map(MasterKey::protocol)
    }

    pub fn priv_protocol(&self) -> Option<PrivProtocol> {
        self.privacy.as_ref().map(|(p, _)| *p)
    }

    /// Highest level this user can verify.
    pub fn security_level(&self) -> SecurityLevel {
        match (&self.auth, &self.privacy) {
            (None, _) => SecurityLevel::NoAuthNoPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            (Some(_), Some(_)) => SecurityLevel::AuthPriv,
        }
    }

    /// Localize this user's keys to one engine.
    pub fn localize(&self, engine_id: &[u8]) -> Result<UserKeys> {
        let auth = self.auth.as_ref().map(|k| k.localize(engine_id));
        let privacy = match &self.privacy {
            Some((protocol, master)) => Some(PrivKey::from_localized(*protocol, &master.localize(engine_id))?),
            None => None,
        };
        Ok(UserKeys { auth, privacy })
    }
}

/// One user's keys localized to one engine.
#[derive(Debug)]
pub struct UserKeys {
    auth: Option<LocalizedKey>,
    privacy: Option<PrivKey>,
}

impl UserKeys {
    pub fn auth(&self) -> Option<&LocalizedKey> {
        self.auth.as_ref()
    }

    pub fn privacy(&self) -> Option<&PrivKey> {
        self.privacy.as_ref()
    }

    /// Encode a message at the level given in `global`, encrypting and
    /// signing as that level requires.
    pub fn seal(
        &self,
        global: MsgGlobalData,
        params: UsmSecurityParams,
        scoped: &ScopedPdu,
        salt: &SaltCounter,
    ) -> Result<Bytes> {
        let level = global.msg_flags.security_level;
        let auth = match (level.requires_auth(), &self.auth) {
            (false, _) => None,
            (true, Some(key)) => Some(key),
            (true, None) => return Err(Error::unsupported(AlgorithmErrorKind::NoAuthProtocol)),
        };

        let mut params = params;
        let data = if level.requires_priv() {
            let key = self
                .privacy
                .as_ref()
                .ok_or_else(|| Error::unsupported(AlgorithmErrorKind::NoPrivProtocol))?;
            let (ciphertext, priv_params) = key.encrypt(
                &scoped.encode_to_bytes(),
                params.engine_boots,
                params.engine_time,
                salt,
            )?;
            params.priv_params = priv_params;
            ScopedPduData::Encrypted(ciphertext)
        } else {
            ScopedPduData::Plaintext(scoped.clone())
        };
        if let Some(key) = auth {
            params = params.with_auth_placeholder(key.mac_len());
        }

        let encoded = SnmpV3Message {
            global,
            security_params: params,
            data,
        }
        .encode();

        let Some(key) = auth else {
            return Ok(encoded);
        };
        let (offset, len) = find_auth_params(&encoded)?;
        let mut signed = encoded.to_vec();
        authenticate_message(key, &mut signed, offset, len)?;
        Ok(Bytes::from(signed))
    }
}

/// A message that passed every USM check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPdu {
    pub msg_id: i32,
    pub security_level: SecurityLevel,
    pub engine_id: Bytes,
    pub engine_boots: u32,
    pub engine_time: u32,
    pub user_name: Bytes,
    pub scoped: ScopedPdu,
}

/// Result of USM processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsmOutcome {
    /// Discovery probe; `report` is the encoded Report to send back.
    Discovery { report: Bytes },
    Verified(VerifiedPdu),
}

/// The receiver's USM: local engine identity plus configured users.
pub struct SecurityEngine {
    engine_id: Bytes,
    engine_boots: u32,
    started: Instant,
    users: HashMap<Bytes, UsmUser>,
    window: u32,
    learn_engines: bool,
    salt: SaltCounter,
    unknown_engine_ids: AtomicU32,
}

impl std::fmt::Debug for SecurityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityEngine")
            .field("engine_id", &HexDisplay(&self.engine_id))
            .field("engine_boots", &self.engine_boots)
            .field("users", &self.users.len())
            .field("window", &self.window)
            .field("learn_engines", &self.learn_engines)
            .finish_non_exhaustive()
    }
}

impl SecurityEngine {
    /// `started` is the instant engineTime counts from.
    pub fn new(engine_id: impl Into<Bytes>, engine_boots: u32, started: Instant) -> Self {
        Self {
            engine_id: engine_id.into(),
            engine_boots,
            started,
            users: HashMap::new(),
            window: TIME_WINDOW,
            learn_engines: false,
            salt: SaltCounter::new(),
            unknown_engine_ids: AtomicU32::new(0),
        }
    }

    pub fn with_user(mut self, user: UsmUser) -> Self {
        self.users.insert(user.name.clone(), user);
        self
    }

    /// Timeliness window in seconds.
    pub fn with_window(mut self, window: u32) -> Self {
        self.window = window;
        self
    }

    /// Accept authenticated traffic from engines with no record, creating
    /// one after the HMAC verifies.
    pub fn with_engine_learning(mut self, enabled: bool) -> Self {
        self.learn_engines = enabled;
        self
    }

    pub fn engine_id(&self) -> &Bytes {
        &self.engine_id
    }

    pub fn engine_boots(&self) -> u32 {
        self.engine_boots
    }

    /// Local snmpEngineTime.
    pub fn engine_time(&self, now: Instant) -> u32 {
        let secs = now.saturating_duration_since(self.started).as_secs();
        u32::try_from(secs).unwrap_or(MAX_ENGINE_TIME).min(MAX_ENGINE_TIME)
    }

    pub fn user(&self, name: &[u8]) -> Option<&UsmUser> {
        self.users.get(name)
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn authenticate_and_decrypt(
        &self,
        raw: &Bytes,
        message: &SnmpV3Message,
        cache: &EngineCache,
        now: Instant,
    ) -> Result<UsmOutcome> {
        if message.is_discovery() {
            let report = self.discovery_report(message, cache, now);
            return Ok(UsmOutcome::Discovery { report });
        }

        let params = &message.security_params;
        let level = message.security_level();

        if !level.requires_auth() {
            let user = self.lookup_user(&params.username)?;
            if user.auth.is_some() {
                return Err(Error::auth(AuthErrorKind::MissingAuthentication));
            }
            let scoped = match &message.data {
                ScopedPduData::Plaintext(scoped) => scoped.clone(),
                ScopedPduData::Encrypted(_) => {
                    return Err(Error::protocol(ProtocolErrorKind::ScopedPduMismatch));
                }
            };
            return Ok(UsmOutcome::Verified(self.verified(message, scoped)));
        }

        let engine_id = &params.engine_id;
        if engine_id == &self.engine_id && cache.lookup(engine_id, now).is_none() {
            self.refresh_local_record(cache, now);
        }
        let known = cache.lookup(engine_id, now).is_some();
        if !known && !self.learn_engines {
            return Err(Error::UnknownEngine {
                engine_id: engine_id.clone(),
            });
        }

        let user = self.lookup_user(&params.username)?;
        if user.auth.is_none() {
            return Err(Error::unsupported(AlgorithmErrorKind::NoAuthProtocol));
        }
        if level.requires_priv() && user.privacy.is_none() {
            return Err(Error::unsupported(AlgorithmErrorKind::NoPrivProtocol));
        }
        let keys = user.localize(engine_id)?;
        let auth_key = keys
            .auth
            .as_ref()
            .ok_or_else(|| Error::unsupported(AlgorithmErrorKind::NoAuthProtocol))?;

        let (offset, len) =
            find_auth_params(raw).map_err(|_| Error::auth(AuthErrorKind::AuthParamsNotFound))?;
        verify_message(auth_key, raw, offset, len)?;
        tracing::trace!(target: "snmp_trapd::usm", engine_id = %HexDisplay(engine_id), "HMAC verified");

        if known {
            cache.check_timeliness(
                engine_id,
                params.engine_boots,
                params.engine_time,
                self.window,
                now,
            )?;
        }

        let scoped = match &message.data {
            ScopedPduData::Plaintext(scoped) => scoped.clone(),
            ScopedPduData::Encrypted(ciphertext) => {
                let key = keys
                    .privacy
                    .as_ref()
                    .ok_or_else(|| Error::unsupported(AlgorithmErrorKind::NoPrivProtocol))?;
                let plaintext = key.decrypt(
                    ciphertext,
                    params.engine_boots,
                    params.engine_time,
                    &params.priv_params,
                )?;
                // Block cipher padding may follow the scoped PDU
                let (value, _) = decode_prefix(plaintext)
                    .map_err(|_| Error::decrypt(CryptoErrorKind::GarbledPlaintext))?;
                ScopedPdu::parse(&value).map_err(|_| Error::decrypt(CryptoErrorKind::GarbledPlaintext))?
            }
        };

        if known {
            cache.record_authenticated(engine_id, params.engine_boots, params.engine_time, now);
        } else {
            cache.upsert(
                engine_id.clone(),
                params.engine_boots,
                params.engine_time,
                EngineOrigin::Learned,
                now,
            );
            tracing::info!(
                target: "snmp_trapd::usm",
                engine_id = %HexDisplay(engine_id),
                user = %String::from_utf8_lossy(&params.username),
                "learned engine from authenticated message"
            );
        }

        Ok(UsmOutcome::Verified(self.verified(message, scoped)))
    }

    fn lookup_user(&self, name: &[u8]) -> Result<&UsmUser> {
        self.users.get(name).ok_or_else(|| {
            tracing::debug!(target: "snmp_trapd::usm", user = %String::from_utf8_lossy(name), "unknown USM user");
            Error::auth(AuthErrorKind::UnknownUser)
        })
    }

    fn verified(&self, message: &SnmpV3Message, scoped: ScopedPdu) -> VerifiedPdu {
        let params = &message.security_params;
        VerifiedPdu {
            msg_id: message.msg_id(),
            security_level: message.security_level(),
            engine_id: params.engine_id.clone(),
            engine_boots: params.engine_boots,
            engine_time: params.engine_time,
            user_name: params.username.clone(),
            scoped,
        }
    }

    fn refresh_local_record(&self, cache: &EngineCache, now: Instant) {
        cache.upsert(
            self.engine_id.clone(),
            self.engine_boots,
            self.engine_time(now),
            EngineOrigin::Local,
            now,
        );
    }

    /// Record the local engine and build the usmStatsUnknownEngineIDs report.
    fn discovery_report(&self, probe: &SnmpV3Message, cache: &EngineCache, now: Instant) -> Bytes {
        self.refresh_local_record(cache, now);
        let count = self.unknown_engine_ids.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let request_id = probe.scoped_pdu().map_or(0, |s| s.pdu.request_id);

        let report = Pdu::new(
            tag::pdu::REPORT,
            request_id,
            vec![VarBind::new(report_oids::unknown_engine_ids(), Value::Counter32(count))],
        );
        let message = SnmpV3Message {
            global: MsgGlobalData::new(
                probe.msg_id(),
                LOCAL_MSG_MAX_SIZE,
                MsgFlags::new(SecurityLevel::NoAuthNoPriv, false),
            ),
            security_params: UsmSecurityParams::new(
                self.engine_id.clone(),
                self.engine_boots,
                self.engine_time(now),
                Bytes::new(),
            ),
            data: ScopedPduData::Plaintext(ScopedPdu::new(self.engine_id.clone(), Bytes::new(), report)),
        };
        tracing::debug!(
            target: "snmp_trapd::usm",
            msg_id = probe.msg_id(),
            request_id,
            "answering engine discovery probe"
        );
        message.encode()
    }

    /// Response PDU acknowledging a verified InformRequest, at the inform's
    /// security level and under the same engine parameters.
    pub fn inform_response(&self, inform: &VerifiedPdu) -> Result<Bytes> {
        let user = self.lookup_user(&inform.user_name)?;
        let keys = user.localize(&inform.engine_id)?;
        let scoped = ScopedPdu::new(
            inform.scoped.context_engine_id.clone(),
            inform.scoped.context_name.clone(),
            inform.scoped.pdu.to_response(),
        );
        let global = MsgGlobalData::new(
            inform.msg_id,
            LOCAL_MSG_MAX_SIZE,
            MsgFlags::new(inform.security_level, false),
        );
        let params = UsmSecurityParams::new(
            inform.engine_id.clone(),
            inform.engine_boots,
            inform.engine_time,
            inform.user_name.clone(),
        );
        keys.seal(global, params, &scoped, &self.salt)
    }
}
