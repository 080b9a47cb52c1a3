#[macro_use]
extern crate afl;
use cachet::{
    Client, ClientConfig, DeviceRegistration, Envelope, Error, MemoryStore, PreKeyBundle,
    PreKeyRegistry,
};

/// Registry stub: registration succeeds, everything else is empty. The
/// fuzzed client only ever decrypts.
struct NullRegistry;

impl PreKeyRegistry for NullRegistry {
    fn register_device(&self, _registration: &DeviceRegistration) -> Result<(), Error> {
        Ok(())
    }

    fn list_device_bundles(&self, _user_id: u64) -> Result<Vec<PreKeyBundle>, Error> {
        Ok(Vec::new())
    }

    fn claim_pre_key(&self, _user_id: u64, _device_id: &str) -> Result<PreKeyBundle, Error> {
        Err(Error::Registry("no bundles".to_string()))
    }

    fn pre_key_stock(&self, _device_id: &str) -> Result<usize, Error> {
        Ok(0)
    }

    fn upload_pre_keys(&self, _device_id: &str, _public_keys: &[String]) -> Result<(), Error> {
        Ok(())
    }
}

fn main() {
    // The Victim
    let client = Client::bootstrap(
        Box::new(NullRegistry),
        Box::new(MemoryStore::new()),
        ClientConfig::default(),
    )
    .expect("Setup failed");

    fuzz!(|data: &[u8]| {
        if let Ok(envelope) = serde_json::from_slice::<Envelope>(data) {
            let _ = client.decrypt_envelope(&envelope, "fuzz", false);
        }
    });
}
