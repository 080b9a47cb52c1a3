use ed25519_dalek::ed25519::SignatureBytes;
use ed25519_dalek::{SecretKey, Signature, SigningKey};
use prost::Message;
use std::collections::HashMap;

use crate::Error;
use crate::crypto::{SharedKey, X25519Secret};
use crate::device::{
    DeviceIdentity, Fingerprint, SCHEMA_VERSION, SentMessageKey, SignedPreKey, StoredPreKey,
};

include!(concat!(env!("OUT_DIR"), "/cachet.rs"));

impl DeviceIdentity {
    /// Serializes the device state to the versioned Protocol Buffers
    /// record kept in secure storage.
    pub(crate) fn serialize(&self) -> Result<Vec<u8>, Error> {
        let signed_pre_key = SignedPreKeyProto {
            private_key: self.signed_pre_key.secret.to_bytes().to_vec(),
            signature: match &self.signed_pre_key.signature {
                Some(signature) => signature.to_bytes().to_vec(),
                None => Vec::new(),
            },
        };

        let one_time_pre_keys = self
            .one_time_pre_keys
            .iter()
            .map(|pre_key| StoredPreKeyProto {
                private_key: pre_key.secret.to_bytes().to_vec(),
                uploaded: pre_key.uploaded,
                created_at: pre_key.created_at,
            })
            .collect();

        let sent_message_keys = self
            .sent_message_keys
            .iter()
            .map(|entry| SentMessageKeyProto {
                message_id: entry.message_id.clone(),
                key: entry.key.as_bytes().to_vec(),
                created_at: entry.created_at,
            })
            .collect();

        let mut peer_fingerprints = HashMap::with_capacity(self.peer_fingerprints.len());
        for (peer, fingerprint) in &self.peer_fingerprints {
            peer_fingerprints.insert(
                *peer,
                FingerprintProto {
                    identity_key: fingerprint.identity_key.clone(),
                    updated_at: fingerprint.updated_at,
                },
            );
        }

        let record = DeviceIdentityProto {
            version: SCHEMA_VERSION,
            device_id: self.device_id.clone(),
            identity_key: self.identity.to_bytes().to_vec(),
            signed_pre_key: Some(signed_pre_key),
            one_time_pre_keys,
            sent_message_keys,
            peer_fingerprints,
            last_registered_at: self.last_registered_at.unwrap_or_default(),
        };

        let mut buf = Vec::new();
        record
            .encode(&mut buf)
            .map_err(|err| Error::Serde(format!("Failed to encode device state: {err:?}")))?;

        Ok(buf)
    }

    /// Deserializes the persisted record. Every key field is
    /// length-checked and the schema version must match exactly; any
    /// failure here sends the caller down the regeneration path.
    pub(crate) fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let record = DeviceIdentityProto::decode(bytes)
            .map_err(|err| Error::Serde(format!("Failed to decode device state: {err:?}")))?;

        if record.version != SCHEMA_VERSION {
            return Err(Error::Serde(format!(
                "Unsupported schema version: {}",
                record.version
            )));
        }

        if record.identity_key.len() != 32 {
            return Err(Error::Serde("Invalid identity key length".to_string()));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&record.identity_key);
        let identity = Box::new(SigningKey::from_bytes(&SecretKey::from(seed)));

        let signed_pre_key = if let Some(proto) = record.signed_pre_key {
            if proto.private_key.len() != 32 {
                return Err(Error::Serde("Invalid signed pre-key length".to_string()));
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&proto.private_key);

            let signature = if proto.signature.is_empty() {
                None
            } else {
                if proto.signature.len() != 64 {
                    return Err(Error::Serde(
                        "Invalid signed pre-key signature length".to_string(),
                    ));
                }
                let mut sig = [0u8; 64];
                sig.copy_from_slice(&proto.signature);
                Some(Signature::from_bytes(&SignatureBytes::from(sig)))
            };

            SignedPreKey {
                secret: X25519Secret::from(key),
                signature,
            }
        } else {
            return Err(Error::Serde("Missing signed pre-key".to_string()));
        };

        let mut one_time_pre_keys = Vec::with_capacity(record.one_time_pre_keys.len());
        for proto in record.one_time_pre_keys {
            if proto.private_key.len() != 32 {
                return Err(Error::Serde("Invalid one-time pre-key length".to_string()));
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&proto.private_key);
            one_time_pre_keys.push(StoredPreKey {
                secret: X25519Secret::from(key),
                uploaded: proto.uploaded,
                created_at: proto.created_at,
            });
        }

        let mut sent_message_keys = Vec::with_capacity(record.sent_message_keys.len());
        for proto in record.sent_message_keys {
            sent_message_keys.push(SentMessageKey {
                message_id: proto.message_id,
                key: SharedKey::try_from(proto.key.as_slice())?,
                created_at: proto.created_at,
            });
        }

        let mut peer_fingerprints = HashMap::with_capacity(record.peer_fingerprints.len());
        for (peer, proto) in record.peer_fingerprints {
            peer_fingerprints.insert(
                peer,
                Fingerprint {
                    identity_key: proto.identity_key,
                    updated_at: proto.updated_at,
                },
            );
        }

        Ok(DeviceIdentity {
            device_id: record.device_id,
            identity,
            signed_pre_key,
            one_time_pre_keys,
            sent_message_keys,
            peer_fingerprints,
            last_registered_at: (record.last_registered_at != 0)
                .then_some(record.last_registered_at),
        })
    }
}
