/// Errors that can occur during encryption-engine operations.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// A signed pre-key signature failed verification. The bundle carrying
    /// it must never be used for key agreement.
    #[error("Signed pre-key signature is invalid")]
    SignatureInvalid,

    /// The peer has no registered device bundle, so there is nothing to
    /// encrypt to.
    #[error("No device bundle registered for the peer")]
    NoDeviceBundle,

    /// The pre-key named by an inbound envelope is not available locally.
    /// The engine never falls back to a different key.
    #[error("No pre-key material available to decrypt the message")]
    MissingPreKeyMaterial,

    /// The envelope or its associated-data structure could not be parsed.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The integrity tag did not match the transcript. No plaintext is
    /// surfaced.
    #[error("Integrity tag mismatch")]
    TagMismatch,

    /// A self-addressed message's key has been evicted from (or was never
    /// recorded in) the sent-message-key cache.
    #[error("Sent-message key is not cached locally")]
    MissingLocalKey,

    /// The pre-key registry reported a failure. Retry is the caller's
    /// responsibility.
    #[error("Registry error: {0}")]
    Registry(String),

    /// The device-state store reported a failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization/deserialization failed: {0}")]
    Serde(String),

    /// Random number generation failed.
    #[error("Random number generation failed")]
    Random,
}
