//! Identity bootstrap and pre-key pool upkeep.

use tracing::{debug, warn};

use crate::Error;
use crate::config::ClientConfig;
use crate::device::DeviceIdentity;
use crate::registry::{DeviceRegistration, PreKeyRegistry};
use crate::store::StateStore;

/// Loads the persisted identity, or generates a brand-new one when nothing
/// valid is stored.
///
/// Any load failure (absent record, undecodable bytes, schema-version
/// mismatch) takes the regeneration path: there is no migration and no
/// recovery of the previous identity. Pre-keys the old identity uploaded
/// are silently orphaned server-side.
pub(crate) fn load_or_create(
    store: &dyn StateStore,
    config: &ClientConfig,
) -> Result<DeviceIdentity, Error> {
    if let Some(bytes) = store.load()? {
        match DeviceIdentity::deserialize(&bytes) {
            Ok(state) => return Ok(state),
            Err(err) => {
                warn!(%err, "discarding persisted device state; generating a new identity");
            }
        }
    }

    let state = DeviceIdentity::generate(config.initial_pre_key_batch)?;
    store.save(&state.serialize()?)?;
    debug!(device_id = state.device_id(), "generated new device identity");
    Ok(state)
}

/// Re-verifies the stored signed-pre-key signature, re-signing when it is
/// missing or invalid. Returns `true` when a repair was made and the state
/// needs persisting. Guards against storage corruption or partial writes.
pub(crate) fn ensure_signed_pre_key_signature(state: &mut DeviceIdentity) -> bool {
    if state.has_valid_pre_key_signature() {
        return false;
    }

    warn!("signed pre-key signature missing or invalid; re-signing");
    state.sign_pre_key();
    true
}

/// Registers the device with the registry, uploading the identity key,
/// signed pre-key + signature, and every not-yet-uploaded one-time pre-key.
pub(crate) fn register_device(
    state: &mut DeviceIdentity,
    registry: &dyn PreKeyRegistry,
    config: &ClientConfig,
) -> Result<(), Error> {
    let pending = state.pending_upload();
    registry.register_device(&DeviceRegistration {
        device_id: state.device_id().to_string(),
        display_name: config.display_name.clone(),
        platform: config.platform.clone(),
        identity_key: state.identity_key(),
        signed_pre_key: state.signed_pre_key_public(),
        signed_pre_key_sig: state.signed_pre_key_signature(),
        one_time_pre_keys: pending.clone(),
    })?;

    state.mark_uploaded(&pending);
    state.touch_registered();
    debug!(
        device_id = state.device_id(),
        uploaded = pending.len(),
        "registered device"
    );
    Ok(())
}

/// Replenishes the server's one-time pre-key stock for this device.
///
/// When the reported stock is below the low-water-mark, locally generated
/// not-yet-uploaded keys are sent first and fresh keys are generated for
/// the remainder, covering the deficit up to the full batch size. Returns
/// the number of keys uploaded.
pub(crate) fn replenish_pre_keys(
    state: &mut DeviceIdentity,
    registry: &dyn PreKeyRegistry,
    config: &ClientConfig,
) -> Result<usize, Error> {
    let stock = registry.pre_key_stock(state.device_id())?;
    if stock >= config.min_server_stock {
        return Ok(0);
    }

    let target = config.initial_pre_key_batch.max(config.min_server_stock);
    let needed = target - stock;
    let available = state.pending_upload().len();
    if available < needed {
        state.generate_pre_keys(needed - available)?;
    }

    let to_send: Vec<String> = state.pending_upload().into_iter().take(needed).collect();
    if to_send.is_empty() {
        return Ok(0);
    }

    registry.upload_pre_keys(state.device_id(), &to_send)?;
    state.mark_uploaded(&to_send);
    debug!(uploaded = to_send.len(), "replenished one-time pre-keys");
    Ok(to_send.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PreKeyBundle;
    use crate::store::MemoryStore;
    use std::sync::Mutex;

    /// Registry double that records uploads and serves a configurable
    /// stock count.
    #[derive(Default)]
    struct RecordingRegistry {
        stock: Mutex<usize>,
        registered: Mutex<Vec<DeviceRegistration>>,
        uploaded: Mutex<Vec<String>>,
    }

    impl PreKeyRegistry for RecordingRegistry {
        fn register_device(&self, registration: &DeviceRegistration) -> Result<(), Error> {
            self.registered.lock().unwrap().push(registration.clone());
            Ok(())
        }

        fn list_device_bundles(&self, _user_id: u64) -> Result<Vec<PreKeyBundle>, Error> {
            Ok(Vec::new())
        }

        fn claim_pre_key(&self, _user_id: u64, _device_id: &str) -> Result<PreKeyBundle, Error> {
            Err(Error::Registry("no bundles".to_string()))
        }

        fn pre_key_stock(&self, _device_id: &str) -> Result<usize, Error> {
            Ok(*self.stock.lock().unwrap())
        }

        fn upload_pre_keys(&self, _device_id: &str, public_keys: &[String]) -> Result<(), Error> {
            self.uploaded.lock().unwrap().extend_from_slice(public_keys);
            Ok(())
        }
    }

    #[test]
    fn test_load_or_create_round_trips_persisted_state() {
        let store = MemoryStore::new();
        let config = ClientConfig::default();

        let first = load_or_create(&store, &config).unwrap();
        let second = load_or_create(&store, &config).unwrap();
        assert_eq!(first.device_id(), second.device_id());
        assert_eq!(first.identity_key(), second.identity_key());
    }

    #[test]
    fn test_corrupted_state_regenerates_identity() {
        let store = MemoryStore::new();
        let config = ClientConfig::default();

        let first = load_or_create(&store, &config).unwrap();
        store.save(b"\xff\xff not a record").unwrap();

        let second = load_or_create(&store, &config).unwrap();
        assert_ne!(first.device_id(), second.device_id());
    }

    #[test]
    fn test_registration_uploads_pending_keys() {
        let registry = RecordingRegistry::default();
        let config = ClientConfig::default();
        let mut state = DeviceIdentity::generate(config.initial_pre_key_batch).unwrap();

        register_device(&mut state, &registry, &config).unwrap();

        let registered = registry.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].one_time_pre_keys.len(), 10);
        assert!(registered[0].signed_pre_key_sig.is_some());
        assert!(state.pending_upload().is_empty());
        assert!(state.last_registered_at.is_some());
    }

    #[test]
    fn test_replenish_covers_deficit_toward_batch_size() {
        let registry = RecordingRegistry::default();
        let config = ClientConfig::default();
        let mut state = DeviceIdentity::generate(config.initial_pre_key_batch).unwrap();
        register_device(&mut state, &registry, &config).unwrap();

        // Healthy stock: nothing happens.
        *registry.stock.lock().unwrap() = 5;
        assert_eq!(replenish_pre_keys(&mut state, &registry, &config).unwrap(), 0);

        // Stock below the low-water-mark: refill back toward 10.
        *registry.stock.lock().unwrap() = 3;
        assert_eq!(replenish_pre_keys(&mut state, &registry, &config).unwrap(), 7);
        assert_eq!(registry.uploaded.lock().unwrap().len(), 7);
        assert!(state.pending_upload().is_empty());
        assert_eq!(state.one_time_pre_keys.len(), 17);
    }
}
