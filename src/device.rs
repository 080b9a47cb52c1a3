use ed25519_dalek::{SecretKey, Signature, Signer, SigningKey};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Error;
use crate::crypto::{self, SharedKey, X25519PublicKey, X25519Secret};

/// Schema version of the persisted device-state record. Any persisted
/// record with a different version is discarded and a brand-new identity is
/// generated; there is deliberately no migration path.
pub(crate) const SCHEMA_VERSION: u32 = 1;

/// The signed pre-key: a medium-lived X25519 keypair whose public half is
/// signed by the identity key. `signature` is `None` only transiently (it
/// is repaired on load).
pub(crate) struct SignedPreKey {
    pub(crate) secret: X25519Secret,
    pub(crate) signature: Option<Signature>,
}

impl SignedPreKey {
    pub(crate) fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }
}

/// A one-time pre-key held locally until a peer's message consumes it.
pub(crate) struct StoredPreKey {
    pub(crate) secret: X25519Secret,
    pub(crate) uploaded: bool,
    pub(crate) created_at: u64,
}

impl StoredPreKey {
    pub(crate) fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }
}

/// A cached shared key for a message this device sent, kept so the sender
/// can decrypt its own copy later.
pub(crate) struct SentMessageKey {
    pub(crate) message_id: String,
    pub(crate) key: SharedKey,
    pub(crate) created_at: u64,
}

/// The last identity key observed for a peer.
pub(crate) struct Fingerprint {
    pub(crate) identity_key: String,
    pub(crate) updated_at: u64,
}

/// The persisted identity of the local device: signing keypair, signed
/// pre-key, one-time pre-key pool, sent-message-key cache, and per-peer
/// fingerprints.
pub(crate) struct DeviceIdentity {
    pub(crate) device_id: String,
    pub(crate) identity: Box<SigningKey>,
    pub(crate) signed_pre_key: SignedPreKey,
    pub(crate) one_time_pre_keys: Vec<StoredPreKey>,
    /// Most-recent-first, FIFO-capped. Entries past the cap are
    /// permanently unrecoverable.
    pub(crate) sent_message_keys: Vec<SentMessageKey>,
    pub(crate) peer_fingerprints: HashMap<u64, Fingerprint>,
    pub(crate) last_registered_at: Option<u64>,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl DeviceIdentity {
    /// Generates a brand-new identity: signing keypair, signed pre-key
    /// (signed with the identity key), and an initial batch of one-time
    /// pre-keys. Nothing is uploaded yet.
    pub(crate) fn generate(initial_pre_keys: usize) -> Result<Self, Error> {
        let device_id = crypto::generate_device_id()?;
        let seed = crypto::generate_seed()?;
        let identity = Box::new(SigningKey::from_bytes(&SecretKey::from(*seed)));

        let secret = X25519Secret::generate()?;
        let signature = identity.sign(&secret.public_key().to_bytes());

        let mut state = Self {
            device_id,
            identity,
            signed_pre_key: SignedPreKey {
                secret,
                signature: Some(signature),
            },
            one_time_pre_keys: Vec::new(),
            sent_message_keys: Vec::new(),
            peer_fingerprints: HashMap::new(),
            last_registered_at: None,
        };
        state.generate_pre_keys(initial_pre_keys)?;

        Ok(state)
    }

    pub(crate) fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The public identity key, base64, as uploaded to the registry.
    pub(crate) fn identity_key(&self) -> String {
        crypto::b64_encode(self.identity.verifying_key().as_bytes())
    }

    pub(crate) fn signed_pre_key_public(&self) -> String {
        self.signed_pre_key.public_key().to_base64()
    }

    pub(crate) fn signed_pre_key_signature(&self) -> Option<String> {
        self.signed_pre_key
            .signature
            .as_ref()
            .map(|sig| crypto::b64_encode(&sig.to_bytes()))
    }

    /// Verifies the stored signed-pre-key signature against the stored
    /// identity key. Used on every load to detect storage corruption.
    pub(crate) fn has_valid_pre_key_signature(&self) -> bool {
        match &self.signed_pre_key.signature {
            Some(signature) => self
                .identity
                .verifying_key()
                .verify_strict(&self.signed_pre_key.public_key().to_bytes(), signature)
                .is_ok(),
            None => false,
        }
    }

    /// Recomputes the signed-pre-key signature with the identity key.
    pub(crate) fn sign_pre_key(&mut self) {
        let signature = self
            .identity
            .sign(&self.signed_pre_key.public_key().to_bytes());
        self.signed_pre_key.signature = Some(signature);
    }

    /// Appends `count` freshly generated one-time pre-keys. Generation
    /// never reuses key material that was ever uploaded or consumed.
    pub(crate) fn generate_pre_keys(&mut self, count: usize) -> Result<(), Error> {
        let now = now_millis();
        for _ in 0..count {
            self.one_time_pre_keys.push(StoredPreKey {
                secret: X25519Secret::generate()?,
                uploaded: false,
                created_at: now,
            });
        }
        Ok(())
    }

    /// Public keys (base64) of pre-keys not yet uploaded to the registry.
    pub(crate) fn pending_upload(&self) -> Vec<String> {
        self.one_time_pre_keys
            .iter()
            .filter(|pre_key| !pre_key.uploaded)
            .map(|pre_key| pre_key.public_key().to_base64())
            .collect()
    }

    pub(crate) fn mark_uploaded(&mut self, public_keys: &[String]) {
        for pre_key in &mut self.one_time_pre_keys {
            if public_keys.contains(&pre_key.public_key().to_base64()) {
                pre_key.uploaded = true;
            }
        }
    }

    /// Removes and returns the one-time pre-key with the given base64
    /// public key. Single use: once taken, the key is gone from the store.
    pub(crate) fn take_pre_key(&mut self, public_key: &str) -> Option<StoredPreKey> {
        let index = self
            .one_time_pre_keys
            .iter()
            .position(|pre_key| pre_key.public_key().to_base64() == public_key)?;
        Some(self.one_time_pre_keys.remove(index))
    }

    /// Caches the shared key for a sent message, most recent first. An
    /// existing entry for the same message id is replaced; entries past
    /// `cap` are evicted oldest-first.
    pub(crate) fn remember_sent_key(&mut self, message_id: &str, key: SharedKey, cap: usize) {
        self.sent_message_keys
            .retain(|entry| entry.message_id != message_id);
        self.sent_message_keys.insert(
            0,
            SentMessageKey {
                message_id: message_id.to_string(),
                key,
                created_at: now_millis(),
            },
        );
        self.sent_message_keys.truncate(cap);
    }

    pub(crate) fn sent_key(&self, message_id: &str) -> Option<&SentMessageKey> {
        self.sent_message_keys
            .iter()
            .find(|entry| entry.message_id == message_id)
    }

    /// Records the identity key observed for a peer. Returns `true` when
    /// the cached fingerprint changed (first sighting or rotation); the
    /// caller is expected to surface a diagnostic.
    pub(crate) fn note_fingerprint(&mut self, peer: u64, identity_key: &str) -> bool {
        match self.peer_fingerprints.get(&peer) {
            Some(cached) if cached.identity_key == identity_key => false,
            _ => {
                self.peer_fingerprints.insert(
                    peer,
                    Fingerprint {
                        identity_key: identity_key.to_string(),
                        updated_at: now_millis(),
                    },
                );
                true
            }
        }
    }

    pub(crate) fn fingerprint(&self, peer: u64) -> Option<&str> {
        self.peer_fingerprints
            .get(&peer)
            .map(|entry| entry.identity_key.as_str())
    }

    pub(crate) fn touch_registered(&mut self) {
        self.last_registered_at = Some(now_millis());
    }
}
