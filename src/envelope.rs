use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::Error;
use crate::crypto::b64_decode;

/// Wire format version carried in every envelope.
pub const ENVELOPE_VERSION: u32 = 1;

/// Name of the authenticated construction. The value is part of the wire
/// format and must not change without a version bump.
pub const ALGORITHM: &str = "DH-SHA256-STREAM";

/// The encrypted message container exchanged through the relay.
///
/// The relay only ever sees this structure; every field is opaque to it.
/// Field names are fixed by the wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire format version, currently 1.
    #[serde(rename = "e2eeVer")]
    pub version: u32,
    /// Algorithm constant naming the construction.
    #[serde(rename = "algo")]
    pub algorithm: String,
    /// Base64 text encoding the associated-data structure.
    pub aad: String,
    /// 16-byte nonce, base64.
    #[serde(rename = "iv")]
    pub nonce: String,
    /// Ciphertext, base64. Identical length to the plaintext once decoded.
    pub ciphertext: String,
    /// Which of the recipient's pre-keys the sender performed DH against.
    #[serde(rename = "keyRef")]
    pub key_ref: KeyRef,
}

/// Identifies the recipient key used as the Diffie-Hellman input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyRef {
    /// A one-time pre-key, named by its base64 public key. Consumed by the
    /// receiver on first use.
    OneTime(String),
    /// The static signed pre-key. Never consumed by decryption.
    SignedPreKey,
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneTime(public_key) => write!(f, "otk:{public_key}"),
            Self::SignedPreKey => write!(f, "spk"),
        }
    }
}

impl FromStr for KeyRef {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Error> {
        if let Some(public_key) = value.strip_prefix("otk:") {
            if public_key.is_empty() {
                return Err(Error::MalformedEnvelope(
                    "empty one-time pre-key reference".to_string(),
                ));
            }
            return Ok(Self::OneTime(public_key.to_string()));
        }
        if value == "spk" {
            return Ok(Self::SignedPreKey);
        }
        Err(Error::MalformedEnvelope(format!(
            "unrecognized key reference: {value}"
        )))
    }
}

impl Serialize for KeyRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeyRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// The associated-data structure embedded in an envelope: the sender's
/// ephemeral public key (`e`) and, once computed, the integrity tag (`t`),
/// both base64. The tag is computed over the encoding *without* `t`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AadMeta {
    e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<String>,
}

impl AadMeta {
    pub(crate) fn new(ephemeral: String) -> Self {
        Self { e: ephemeral, t: None }
    }

    pub(crate) fn with_tag(ephemeral: String, tag: String) -> Self {
        Self {
            e: ephemeral,
            t: Some(tag),
        }
    }

    pub(crate) fn ephemeral(&self) -> &str {
        &self.e
    }

    pub(crate) fn tag(&self) -> Option<&str> {
        self.t.as_deref()
    }

    /// Canonical byte encoding, as hashed into the integrity tag.
    pub(crate) fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|err| Error::Serde(err.to_string()))
    }

    /// Decodes the base64 associated-data field of an envelope.
    pub(crate) fn decode(aad: &str) -> Result<Self, Error> {
        let bytes = b64_decode(aad).map_err(|_| {
            Error::MalformedEnvelope("associated data is not valid base64".to_string())
        })?;
        serde_json::from_slice(&bytes).map_err(|_| {
            Error::MalformedEnvelope("associated data structure is invalid".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::b64_encode;

    #[test]
    fn test_key_ref_string_forms() {
        let otk: KeyRef = "otk:abc123".parse().unwrap();
        assert_eq!(otk, KeyRef::OneTime("abc123".to_string()));
        assert_eq!(otk.to_string(), "otk:abc123");

        let spk: KeyRef = "spk".parse().unwrap();
        assert_eq!(spk, KeyRef::SignedPreKey);
        assert_eq!(spk.to_string(), "spk");

        assert!("otk:".parse::<KeyRef>().is_err());
        assert!("sgn".parse::<KeyRef>().is_err());
    }

    #[test]
    fn test_envelope_wire_field_names() {
        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            algorithm: ALGORITHM.to_string(),
            aad: "YWFk".to_string(),
            nonce: "bm9uY2U".to_string(),
            ciphertext: "Y3Q".to_string(),
            key_ref: KeyRef::SignedPreKey,
        };

        let value = serde_json::to_value(&envelope).unwrap();
        let object = value.as_object().unwrap();
        for field in ["e2eeVer", "algo", "aad", "iv", "ciphertext", "keyRef"] {
            assert!(object.contains_key(field), "missing wire field {field}");
        }
        assert_eq!(object["e2eeVer"], 1);
        assert_eq!(object["algo"], "DH-SHA256-STREAM");
        assert_eq!(object["keyRef"], "spk");

        let decoded: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_aad_meta_encoding_is_compact_and_ordered() {
        let bare = AadMeta::new("RVBI".to_string());
        assert_eq!(bare.encode().unwrap(), br#"{"e":"RVBI"}"#);

        let tagged = AadMeta::with_tag("RVBI".to_string(), "VEFH".to_string());
        assert_eq!(tagged.encode().unwrap(), br#"{"e":"RVBI","t":"VEFH"}"#);
    }

    #[test]
    fn test_aad_meta_decode_requires_ephemeral() {
        let missing = b64_encode(br#"{"t":"VEFH"}"#);
        assert!(matches!(
            AadMeta::decode(&missing),
            Err(Error::MalformedEnvelope(_))
        ));

        let not_json = b64_encode(b"][");
        assert!(matches!(
            AadMeta::decode(&not_json),
            Err(Error::MalformedEnvelope(_))
        ));

        assert!(matches!(
            AadMeta::decode("%%%"),
            Err(Error::MalformedEnvelope(_))
        ));
    }
}
