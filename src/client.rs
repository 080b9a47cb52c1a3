use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::Error;
use crate::agreement;
use crate::cipher;
use crate::config::ClientConfig;
use crate::crypto::{SharedKey, X25519PublicKey};
use crate::device::DeviceIdentity;
use crate::envelope::{ALGORITHM, AadMeta, ENVELOPE_VERSION, Envelope};
use crate::lifecycle;
use crate::registry::PreKeyRegistry;
use crate::store::StateStore;

/// The result of encrypting a message: the wire envelope plus the shared
/// key that sealed it. The key is also cached internally so the sender can
/// decrypt its own copy later.
pub struct OutboundMessage {
    pub envelope: Envelope,
    pub shared_key: SharedKey,
}

/// The encryption engine's facade: owns the device identity and
/// orchestrates key agreement, the authenticated cipher, and pre-key
/// lifecycle against the registry and state-store collaborators.
///
/// A `Client` is constructed explicitly and owned by the application
/// lifecycle; drop it on logout. All device-state mutations run inside one
/// mutex-guarded critical section and are persisted before the lock is
/// released, so concurrent encrypt/decrypt calls never observe a
/// half-applied state.
pub struct Client {
    device_id: String,
    state: Mutex<DeviceIdentity>,
    registry: Box<dyn PreKeyRegistry + Send + Sync>,
    store: Box<dyn StateStore + Send + Sync>,
    config: ClientConfig,
}

impl Client {
    /// Boots the engine: loads or generates the device identity, repairs
    /// the signed-pre-key signature if storage corrupted it, registers
    /// with the registry, and tops up the server's one-time pre-key stock.
    pub fn bootstrap(
        registry: Box<dyn PreKeyRegistry + Send + Sync>,
        store: Box<dyn StateStore + Send + Sync>,
        config: ClientConfig,
    ) -> Result<Self, Error> {
        let mut state = lifecycle::load_or_create(store.as_ref(), &config)?;
        if lifecycle::ensure_signed_pre_key_signature(&mut state) {
            store.save(&state.serialize()?)?;
        }
        lifecycle::register_device(&mut state, registry.as_ref(), &config)?;
        lifecycle::replenish_pre_keys(&mut state, registry.as_ref(), &config)?;
        store.save(&state.serialize()?)?;

        Ok(Self {
            device_id: state.device_id().to_string(),
            state: Mutex::new(state),
            registry,
            store,
            config,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The last identity key observed for a peer, if any.
    pub fn peer_fingerprint(&self, peer: u64) -> Result<Option<String>, Error> {
        let state = self.lock()?;
        Ok(state.fingerprint(peer).map(str::to_string))
    }

    /// Encrypts a message for a user's first registered device.
    ///
    /// Lists the peer's bundles (no bundle is [`Error::NoDeviceBundle`]),
    /// claims a pre-key from the first device, performs a fresh handshake
    /// against it, and seals the plaintext. The shared key is cached under
    /// `message_id` for later self-reads. Multi-device recipients only
    /// receive on their first registered device; fan-out is out of scope.
    pub fn encrypt_for_user(
        &self,
        peer: u64,
        message_id: &str,
        plaintext: &str,
    ) -> Result<OutboundMessage, Error> {
        let bundles = self.registry.list_device_bundles(peer)?;
        let Some(first) = bundles.first() else {
            return Err(Error::NoDeviceBundle);
        };
        self.observe_identity(peer, &first.identity_key)?;

        let bundle = self.registry.claim_pre_key(peer, &first.device_id)?;
        self.observe_identity(peer, &bundle.identity_key)?;

        let outbound = agreement::initiate(&bundle)?;
        let sealed = cipher::seal(&outbound.shared, plaintext.as_bytes(), &outbound.ephemeral_public)?;
        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            algorithm: ALGORITHM.to_string(),
            aad: sealed.aad,
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            key_ref: outbound.key_ref,
        };

        let cache_size = self.config.sent_key_cache_size;
        let shared_key = outbound.shared;
        self.with_state(|state| {
            state.remember_sent_key(message_id, shared_key.clone(), cache_size);
            Ok(())
        })?;

        Ok(OutboundMessage {
            envelope,
            shared_key,
        })
    }

    /// Decrypts an inbound envelope, or a self-sent copy when `from_self`
    /// is set.
    ///
    /// Self-reads skip key agreement entirely: the shared key is looked up
    /// in the sent-message-key cache by `message_id`, and an evicted or
    /// never-cached key is [`Error::MissingLocalKey`]. Otherwise the
    /// envelope's key reference selects the pre-key; consuming a one-time
    /// pre-key persists immediately and triggers a best-effort
    /// replenishment pass. Decryption is fail-closed throughout.
    pub fn decrypt_envelope(
        &self,
        envelope: &Envelope,
        message_id: &str,
        from_self: bool,
    ) -> Result<String, Error> {
        if from_self {
            let key = {
                let state = self.lock()?;
                state
                    .sent_key(message_id)
                    .map(|entry| entry.key.clone())
                    .ok_or(Error::MissingLocalKey)?
            };
            return Self::into_plaintext(cipher::open(&key, envelope)?);
        }

        let meta = AadMeta::decode(&envelope.aad)?;
        let ephemeral = X25519PublicKey::from_base64(meta.ephemeral()).map_err(|_| {
            Error::MalformedEnvelope("ephemeral key is not a valid public key".to_string())
        })?;

        let (shared, consumed) = {
            let mut state = self.lock()?;
            let result = agreement::respond(&mut state, &envelope.key_ref, &ephemeral)?;
            if result.1 {
                self.store.save(&state.serialize()?)?;
            }
            result
        };

        if consumed {
            // The consumed pre-key is already persisted; a failed top-up
            // must not turn a successful decrypt into an error.
            let outcome = self.with_state(|state| {
                lifecycle::replenish_pre_keys(state, self.registry.as_ref(), &self.config)
            });
            if let Err(err) = outcome {
                warn!(%err, "pre-key replenishment after consumption failed");
            }
        }

        Self::into_plaintext(cipher::open(&shared, envelope)?)
    }

    fn into_plaintext(bytes: Vec<u8>) -> Result<String, Error> {
        String::from_utf8(bytes)
            .map_err(|_| Error::MalformedEnvelope("plaintext is not valid UTF-8".to_string()))
    }

    /// Records the identity key observed in a fetched bundle, overwriting
    /// the cached fingerprint and emitting a diagnostic when it changed.
    /// A change most plausibly means a reinstall or a new device; the next
    /// send re-keys naturally since every message runs a fresh handshake.
    fn observe_identity(&self, peer: u64, identity_key: &str) -> Result<(), Error> {
        let mut state = self.lock()?;
        if state.note_fingerprint(peer, identity_key) {
            warn!(peer, "peer identity key changed");
            self.store.save(&state.serialize()?)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, DeviceIdentity>, Error> {
        self.state
            .lock()
            .map_err(|_| Error::Storage("device state lock poisoned".to_string()))
    }

    /// Runs one serialized state mutation and persists the result before
    /// releasing the lock.
    fn with_state<T>(
        &self,
        apply: impl FnOnce(&mut DeviceIdentity) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut state = self.lock()?;
        let value = apply(&mut state)?;
        self.store.save(&state.serialize()?)?;
        Ok(value)
    }
}
