//! The authenticated construction: a counter-mode stream cipher and
//! integrity tag built from SHA-256.
//!
//! This is the original wire format's bespoke construction, not a
//! standards-track AEAD; it is preserved bit-exact for compatibility.
//! Keystream block `i` is `SHA-256(secret ‖ nonce ‖ i)` with a 4-byte
//! big-endian counter; the tag is `SHA-256(secret ‖ nonce ‖ ciphertext ‖
//! aad-without-tag)`.

use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::Error;
use crate::crypto::{SharedKey, X25519PublicKey, b64_encode};
use crate::envelope::{AadMeta, Envelope};

/// Nonce length in bytes, fixed by the wire format.
pub(crate) const NONCE_LENGTH: usize = 16;

/// Integrity tag length in bytes (one SHA-256 digest).
pub(crate) const TAG_LENGTH: usize = 32;

const DIGEST_LENGTH: usize = 32;

/// The base64 envelope fields produced by [`seal`].
pub(crate) struct SealedPayload {
    pub(crate) aad: String,
    pub(crate) nonce: String,
    pub(crate) ciphertext: String,
}

fn keystream(secret: &[u8; 32], nonce: &[u8], length: usize) -> Zeroizing<Vec<u8>> {
    let blocks = length.div_ceil(DIGEST_LENGTH);
    let mut output = Zeroizing::new(Vec::with_capacity(blocks * DIGEST_LENGTH));
    for counter in 0..blocks as u32 {
        let mut hasher = Sha256::new();
        hasher.update(secret);
        hasher.update(nonce);
        hasher.update(counter.to_be_bytes());
        output.extend_from_slice(&hasher.finalize());
    }
    output.truncate(length);
    output
}

fn compute_tag(secret: &[u8; 32], nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> [u8; TAG_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(nonce);
    hasher.update(ciphertext);
    hasher.update(aad);
    hasher.finalize().into()
}

fn xor_with_keystream(data: &[u8], stream: &[u8]) -> Vec<u8> {
    data.iter().zip(stream).map(|(byte, mask)| byte ^ mask).collect()
}

/// Encrypts a plaintext under the shared key with a fresh nonce and returns
/// the envelope fields, with the integrity tag embedded in the associated
/// data alongside the sender's ephemeral public key.
pub(crate) fn seal(
    shared: &SharedKey,
    plaintext: &[u8],
    ephemeral: &X25519PublicKey,
) -> Result<SealedPayload, Error> {
    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.try_fill_bytes(&mut nonce).map_err(|_| Error::Random)?;

    let stream = keystream(shared.as_bytes(), &nonce, plaintext.len());
    let ciphertext = xor_with_keystream(plaintext, &stream);

    let ephemeral_b64 = ephemeral.to_base64();
    let bare_aad = AadMeta::new(ephemeral_b64.clone()).encode()?;
    let tag = compute_tag(shared.as_bytes(), &nonce, &ciphertext, &bare_aad);
    let aad = AadMeta::with_tag(ephemeral_b64, b64_encode(&tag)).encode()?;

    Ok(SealedPayload {
        aad: b64_encode(&aad),
        nonce: b64_encode(&nonce),
        ciphertext: b64_encode(&ciphertext),
    })
}

/// Verifies and decrypts an envelope under the shared key.
///
/// Fail-closed: parse errors and length mismatches are
/// [`Error::MalformedEnvelope`], a failed integrity check is
/// [`Error::TagMismatch`], and no plaintext is surfaced in either case.
/// The tag comparison is constant-time.
pub(crate) fn open(shared: &SharedKey, envelope: &Envelope) -> Result<Vec<u8>, Error> {
    let meta = AadMeta::decode(&envelope.aad)?;
    let tag_b64 = meta
        .tag()
        .ok_or_else(|| Error::MalformedEnvelope("missing integrity tag".to_string()))?;

    let expected_tag = crate::crypto::b64_decode(tag_b64)
        .map_err(|_| Error::MalformedEnvelope("integrity tag is not valid base64".to_string()))?;
    if expected_tag.len() != TAG_LENGTH {
        return Err(Error::MalformedEnvelope(
            "integrity tag has the wrong length".to_string(),
        ));
    }

    let nonce = crate::crypto::b64_decode(&envelope.nonce)
        .map_err(|_| Error::MalformedEnvelope("nonce is not valid base64".to_string()))?;
    if nonce.len() != NONCE_LENGTH {
        return Err(Error::MalformedEnvelope(
            "nonce has the wrong length".to_string(),
        ));
    }

    let ciphertext = crate::crypto::b64_decode(&envelope.ciphertext)
        .map_err(|_| Error::MalformedEnvelope("ciphertext is not valid base64".to_string()))?;

    let bare_aad = AadMeta::new(meta.ephemeral().to_string()).encode()?;
    let actual_tag = compute_tag(shared.as_bytes(), &nonce, &ciphertext, &bare_aad);
    if !bool::from(expected_tag.ct_eq(&actual_tag)) {
        return Err(Error::TagMismatch);
    }

    let stream = keystream(shared.as_bytes(), &nonce, ciphertext.len());
    Ok(xor_with_keystream(&ciphertext, &stream))
}
