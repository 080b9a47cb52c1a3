use crate::Error;

/// Public key material for one registered device, as served by the relay's
/// pre-key registry. Ephemeral: fetched per key-agreement attempt and never
/// persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeyBundle {
    pub device_id: String,
    /// Ed25519 identity public key, base64.
    pub identity_key: String,
    /// X25519 signed pre-key public half, base64.
    pub signed_pre_key: String,
    /// Signature over the signed pre-key under the identity key, base64.
    /// `None` means the device never signed its pre-key; such a bundle is
    /// refused for key agreement.
    pub signed_pre_key_sig: Option<String>,
    /// A one-time pre-key public half, base64, or `None` once the server's
    /// pool for this device is exhausted.
    pub one_time_pre_key: Option<String>,
}

/// Payload uploaded when a device registers with the registry.
#[derive(Clone, Debug)]
pub struct DeviceRegistration {
    pub device_id: String,
    pub display_name: String,
    pub platform: String,
    pub identity_key: String,
    pub signed_pre_key: String,
    pub signed_pre_key_sig: Option<String>,
    /// Public halves of one-time pre-keys not yet known to the server.
    pub one_time_pre_keys: Vec<String>,
}

/// The relay's pre-key registry, consumed but not implemented by this
/// crate.
///
/// Implementations perform network I/O; errors are surfaced unchanged as
/// [`Error::Registry`] with no internal retry. Calls for different peers
/// may run concurrently.
pub trait PreKeyRegistry {
    /// Registers (or re-registers) the local device and its key material.
    fn register_device(&self, registration: &DeviceRegistration) -> Result<(), Error>;

    /// Lists the registered device bundles for a user. Callers of this
    /// engine use only the first entry; multi-device fan-out is out of
    /// scope.
    fn list_device_bundles(&self, user_id: u64) -> Result<Vec<PreKeyBundle>, Error>;

    /// Claims pre-key material for one device. The server atomically hands
    /// out and removes a one-time pre-key, or returns `None` in that field
    /// once its pool is exhausted.
    fn claim_pre_key(&self, user_id: u64, device_id: &str) -> Result<PreKeyBundle, Error>;

    /// Number of unclaimed one-time pre-keys the server still holds for a
    /// device.
    fn pre_key_stock(&self, device_id: &str) -> Result<usize, Error>;

    /// Uploads additional one-time pre-key public halves.
    fn upload_pre_keys(&self, device_id: &str, public_keys: &[String]) -> Result<(), Error>;
}
