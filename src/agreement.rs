//! The ephemeral-static Diffie-Hellman handshake, run afresh for every
//! message. There is no cross-message session state by design.

use crate::Error;
use crate::crypto::{self, SharedKey, X25519PublicKey, X25519Secret};
use crate::device::DeviceIdentity;
use crate::envelope::KeyRef;
use crate::registry::PreKeyBundle;

/// The sender's half of a completed handshake.
pub(crate) struct OutboundAgreement {
    pub(crate) shared: SharedKey,
    pub(crate) ephemeral_public: X25519PublicKey,
    pub(crate) key_ref: KeyRef,
}

/// Sender role: derive a shared secret against a claimed bundle.
///
/// The bundle's signed-pre-key signature is verified first; a bundle that
/// fails verification is refused before any DH computation. The one-time
/// pre-key is preferred when the server handed one out, with the signed
/// pre-key as the fallback.
pub(crate) fn initiate(bundle: &PreKeyBundle) -> Result<OutboundAgreement, Error> {
    crypto::verify_pre_key_signature(
        &bundle.identity_key,
        &bundle.signed_pre_key,
        bundle.signed_pre_key_sig.as_deref(),
    )?;

    let (pre_key, key_ref) = match &bundle.one_time_pre_key {
        Some(one_time) => (
            X25519PublicKey::from_base64(one_time)?,
            KeyRef::OneTime(one_time.clone()),
        ),
        None => (
            X25519PublicKey::from_base64(&bundle.signed_pre_key)?,
            KeyRef::SignedPreKey,
        ),
    };

    let ephemeral = X25519Secret::generate()?;
    let shared = ephemeral.dh(&pre_key);

    Ok(OutboundAgreement {
        shared,
        ephemeral_public: ephemeral.public_key(),
        key_ref,
    })
}

/// Receiver role: recover the shared secret named by an envelope's key
/// reference.
///
/// A one-time pre-key is removed from the store the instant it is used;
/// the second element of the result reports that consumption so the caller
/// persists and replenishes. An absent one-time pre-key is
/// [`Error::MissingPreKeyMaterial`], never a silent fallback to another
/// key. The signed pre-key path is never consumed.
pub(crate) fn respond(
    state: &mut DeviceIdentity,
    key_ref: &KeyRef,
    ephemeral: &X25519PublicKey,
) -> Result<(SharedKey, bool), Error> {
    match key_ref {
        KeyRef::OneTime(public_key) => {
            let pre_key = state
                .take_pre_key(public_key)
                .ok_or(Error::MissingPreKeyMaterial)?;
            Ok((pre_key.secret.dh(ephemeral), true))
        }
        KeyRef::SignedPreKey => Ok((state.signed_pre_key.secret.dh(ephemeral), false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::b64_encode;
    use ed25519_dalek::{SecretKey, Signer, SigningKey};

    struct TestDevice {
        state: DeviceIdentity,
        identity_key: String,
    }

    fn test_device(one_time_pre_keys: usize) -> TestDevice {
        let state = DeviceIdentity::generate(one_time_pre_keys).unwrap();
        let identity_key = state.identity_key();
        TestDevice {
            state,
            identity_key,
        }
    }

    fn bundle_for(device: &TestDevice, with_one_time: bool) -> PreKeyBundle {
        PreKeyBundle {
            device_id: device.state.device_id().to_string(),
            identity_key: device.identity_key.clone(),
            signed_pre_key: device.state.signed_pre_key_public(),
            signed_pre_key_sig: device.state.signed_pre_key_signature(),
            one_time_pre_key: with_one_time.then(|| {
                device.state.one_time_pre_keys[0].public_key().to_base64()
            }),
        }
    }

    #[test]
    fn test_both_roles_agree_via_one_time_pre_key() {
        let mut receiver = test_device(2);
        let bundle = bundle_for(&receiver, true);

        let outbound = initiate(&bundle).unwrap();
        assert!(matches!(outbound.key_ref, KeyRef::OneTime(_)));

        let (shared, consumed) = respond(
            &mut receiver.state,
            &outbound.key_ref,
            &outbound.ephemeral_public,
        )
        .unwrap();
        assert!(consumed);
        assert_eq!(shared, outbound.shared);
        assert_eq!(receiver.state.one_time_pre_keys.len(), 1);
    }

    #[test]
    fn test_both_roles_agree_via_signed_pre_key() {
        let mut receiver = test_device(0);
        let bundle = bundle_for(&receiver, false);

        let outbound = initiate(&bundle).unwrap();
        assert_eq!(outbound.key_ref, KeyRef::SignedPreKey);

        let (shared, consumed) = respond(
            &mut receiver.state,
            &outbound.key_ref,
            &outbound.ephemeral_public,
        )
        .unwrap();
        assert!(!consumed);
        assert_eq!(shared, outbound.shared);
    }

    #[test]
    fn test_initiate_refuses_forged_signature() {
        let receiver = test_device(1);
        let mut bundle = bundle_for(&receiver, true);

        let forger = SigningKey::from_bytes(&SecretKey::from([11u8; 32]));
        let forged = forger.sign(&crypto::b64_decode(&bundle.signed_pre_key).unwrap());
        bundle.signed_pre_key_sig = Some(b64_encode(&forged.to_bytes()));

        assert!(matches!(initiate(&bundle), Err(Error::SignatureInvalid)));
    }

    #[test]
    fn test_initiate_refuses_unsigned_bundle() {
        let receiver = test_device(1);
        let mut bundle = bundle_for(&receiver, true);
        bundle.signed_pre_key_sig = None;

        assert!(matches!(initiate(&bundle), Err(Error::SignatureInvalid)));
    }

    #[test]
    fn test_respond_fails_closed_on_unknown_pre_key() {
        let mut receiver = test_device(1);
        let ephemeral = X25519Secret::generate().unwrap().public_key();

        let unknown = X25519Secret::generate().unwrap().public_key().to_base64();
        let result = respond(
            &mut receiver.state,
            &KeyRef::OneTime(unknown),
            &ephemeral,
        );
        assert!(matches!(result, Err(Error::MissingPreKeyMaterial)));
        // The stored pre-key is untouched.
        assert_eq!(receiver.state.one_time_pre_keys.len(), 1);
    }
}
