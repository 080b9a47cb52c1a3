use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use ed25519_dalek::ed25519::SignatureBytes;
use ed25519_dalek::{Signature, VerifyingKey};
use rand::TryRngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Error;

/// Length of every public key handled by the engine, in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of an Ed25519 signature, in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Generates a cryptographically secure random 32-byte seed.
pub(crate) fn generate_seed() -> Result<Box<[u8; 32]>, Error> {
    let mut seed = Box::new([0u8; 32]);
    OsRng
        .try_fill_bytes(seed.as_mut_slice())
        .map_err(|_| Error::Random)?;
    Ok(seed)
}

/// Generates a fresh device identifier of the form `dev-<20 chars>`.
pub(crate) fn generate_device_id() -> Result<String, Error> {
    let mut bytes = [0u8; 15];
    OsRng.try_fill_bytes(&mut bytes).map_err(|_| Error::Random)?;
    Ok(format!("dev-{}", URL_SAFE_NO_PAD.encode(bytes)))
}

pub(crate) fn b64_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub(crate) fn b64_decode(value: &str) -> Result<Vec<u8>, Error> {
    STANDARD
        .decode(value)
        .map_err(|err| Error::Serde(err.to_string()))
}

/// An X25519 public key used as the Diffie-Hellman input of key agreement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct X25519PublicKey(PublicKey);

impl X25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Encodes the key in the base64 form used on the wire and in bundles.
    pub fn to_base64(&self) -> String {
        b64_encode(self.as_bytes())
    }

    /// Decodes a base64 key, rejecting any input that is not exactly 32
    /// bytes before it reaches curve arithmetic.
    pub fn from_base64(value: &str) -> Result<Self, Error> {
        let bytes = b64_decode(value)?;
        Self::try_from(bytes.as_slice())
    }
}

impl From<[u8; 32]> for X25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(PublicKey::from(bytes))
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(value: PublicKey) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for X25519PublicKey {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 32] = value
            .try_into()
            .map_err(|_| Error::Serde("Invalid public key length".to_string()))?;
        Ok(Self::from(bytes))
    }
}

impl AsRef<PublicKey> for X25519PublicKey {
    fn as_ref(&self) -> &PublicKey {
        &self.0
    }
}

/// An X25519 secret key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct X25519Secret(Box<StaticSecret>);

impl X25519Secret {
    /// Creates a new secret from OS randomness.
    pub(crate) fn generate() -> Result<Self, Error> {
        Ok(Self::from(generate_seed()?))
    }

    /// Performs Diffie-Hellman key agreement with the other party's public
    /// key, yielding the raw 32-byte shared secret.
    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> SharedKey {
        SharedKey::from(self.0.diffie_hellman(public_key.as_ref()).to_bytes())
    }

    pub(crate) fn public_key(&self) -> X25519PublicKey {
        let pub_key = PublicKey::from(self.0.as_ref());
        pub_key.into()
    }

    pub(crate) fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<[u8; 32]> for X25519Secret {
    fn from(bytes: [u8; 32]) -> Self {
        Self(Box::new(StaticSecret::from(bytes)))
    }
}

impl From<Box<[u8; 32]>> for X25519Secret {
    fn from(mut bytes: Box<[u8; 32]>) -> Self {
        let secret = StaticSecret::from(*bytes);
        bytes.zeroize();
        Self(Box::new(secret))
    }
}

/// A 32-byte shared secret produced by key agreement. Feeds the keystream
/// and tag derivation directly; zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey(Box<[u8; 32]>);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for SharedKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(Box::new(bytes))
    }
}

impl TryFrom<&[u8]> for SharedKey {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; 32] = value
            .try_into()
            .map_err(|_| Error::Serde("Invalid shared key length".to_string()))?;
        Ok(Self::from(bytes))
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(other.0.as_ref()).into()
    }
}

impl Eq for SharedKey {}

impl std::fmt::Debug for SharedKey {
    /// Never prints key material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Verifies a bundle's signed-pre-key signature against its identity key.
///
/// All three inputs are the base64 strings carried by a pre-key bundle.
/// Malformed input (wrong-length key or signature, missing signature,
/// undecodable base64) is rejected before any curve arithmetic runs.
pub fn verify_pre_key_signature(
    identity_key: &str,
    signed_pre_key: &str,
    signature: Option<&str>,
) -> Result<(), Error> {
    let Some(signature) = signature else {
        return Err(Error::SignatureInvalid);
    };

    let sig_bytes = b64_decode(signature).map_err(|_| Error::SignatureInvalid)?;
    if sig_bytes.len() != SIGNATURE_LENGTH {
        return Err(Error::SignatureInvalid);
    }
    let mut sig = [0u8; SIGNATURE_LENGTH];
    sig.copy_from_slice(&sig_bytes);

    let key_bytes = b64_decode(identity_key).map_err(|_| Error::SignatureInvalid)?;
    if key_bytes.len() != KEY_LENGTH {
        return Err(Error::SignatureInvalid);
    }
    let mut key = [0u8; KEY_LENGTH];
    key.copy_from_slice(&key_bytes);

    let message = b64_decode(signed_pre_key).map_err(|_| Error::SignatureInvalid)?;

    let verifying_key = VerifyingKey::from_bytes(&key).map_err(|_| Error::SignatureInvalid)?;
    verifying_key
        .verify_strict(&message, &Signature::from_bytes(&SignatureBytes::from(sig)))
        .map_err(|_| Error::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{SecretKey, Signer, SigningKey};

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&SecretKey::from(*generate_seed().unwrap()))
    }

    #[test]
    fn test_dh_agreement_is_symmetric() {
        let alice = X25519Secret::generate().unwrap();
        let bob = X25519Secret::generate().unwrap();

        let alice_shared = alice.dh(&bob.public_key());
        let bob_shared = bob.dh(&alice.public_key());

        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn test_public_key_base64_roundtrip() {
        let secret = X25519Secret::generate().unwrap();
        let public = secret.public_key();

        let decoded = X25519PublicKey::from_base64(&public.to_base64()).unwrap();
        assert_eq!(decoded, public);
    }

    #[test]
    fn test_public_key_rejects_wrong_length() {
        let short = b64_encode(&[7u8; 16]);
        assert!(X25519PublicKey::from_base64(&short).is_err());
    }

    #[test]
    fn test_pre_key_signature_verification() {
        let identity = signing_key();
        let pre_key = X25519Secret::generate().unwrap().public_key();

        let signature = identity.sign(&pre_key.to_bytes());
        let identity_b64 = b64_encode(identity.verifying_key().as_bytes());
        let pre_key_b64 = pre_key.to_base64();
        let sig_b64 = b64_encode(&signature.to_bytes());

        assert!(
            verify_pre_key_signature(&identity_b64, &pre_key_b64, Some(sig_b64.as_str())).is_ok()
        );

        // A signature from a different identity must be refused.
        let other = signing_key();
        let forged = b64_encode(&other.sign(&pre_key.to_bytes()).to_bytes());
        assert_eq!(
            verify_pre_key_signature(&identity_b64, &pre_key_b64, Some(forged.as_str())),
            Err(Error::SignatureInvalid)
        );
    }

    #[test]
    fn test_pre_key_signature_rejects_malformed_input() {
        let identity = signing_key();
        let pre_key = X25519Secret::generate().unwrap().public_key();
        let identity_b64 = b64_encode(identity.verifying_key().as_bytes());
        let pre_key_b64 = pre_key.to_base64();

        assert_eq!(
            verify_pre_key_signature(&identity_b64, &pre_key_b64, None),
            Err(Error::SignatureInvalid)
        );

        let short_sig = b64_encode(&[1u8; 32]);
        assert_eq!(
            verify_pre_key_signature(&identity_b64, &pre_key_b64, Some(short_sig.as_str())),
            Err(Error::SignatureInvalid)
        );

        let sig = b64_encode(&identity.sign(&pre_key.to_bytes()).to_bytes());
        let short_identity = b64_encode(&[2u8; 16]);
        assert_eq!(
            verify_pre_key_signature(&short_identity, &pre_key_b64, Some(sig.as_str())),
            Err(Error::SignatureInvalid)
        );
    }

    #[test]
    fn test_device_id_shape() {
        let id = generate_device_id().unwrap();
        assert!(id.starts_with("dev-"));
        assert_eq!(id.len(), 24);
    }
}
