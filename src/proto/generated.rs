// @generated
// This file is the prost-generated output for `src/proto/device.proto`
// (package `cachet`). It is vendored so the crate builds in environments
// where `protoc` is unavailable; `build.rs` copies it into `OUT_DIR` as a
// fallback and regenerates it with prost whenever `protoc` is present.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedPreKeyProto {
    /// X25519 private key, 32 bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub private_key: ::prost::alloc::vec::Vec<u8>,
    /// Ed25519 signature over the public half, 64 bytes. Empty when unsigned.
    #[prost(bytes = "vec", tag = "2")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StoredPreKeyProto {
    /// X25519 private key, 32 bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub private_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(bool, tag = "2")]
    pub uploaded: bool,
    #[prost(uint64, tag = "3")]
    pub created_at: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SentMessageKeyProto {
    #[prost(string, tag = "1")]
    pub message_id: ::prost::alloc::string::String,
    /// Shared key, 32 bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub key: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub created_at: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FingerprintProto {
    /// Peer identity public key, base64.
    #[prost(string, tag = "1")]
    pub identity_key: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub updated_at: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceIdentityProto {
    /// Schema version. A mismatch forces full identity regeneration.
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(string, tag = "2")]
    pub device_id: ::prost::alloc::string::String,
    /// Ed25519 signing key seed, 32 bytes.
    #[prost(bytes = "vec", tag = "3")]
    pub identity_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub signed_pre_key: ::core::option::Option<SignedPreKeyProto>,
    #[prost(message, repeated, tag = "5")]
    pub one_time_pre_keys: ::prost::alloc::vec::Vec<StoredPreKeyProto>,
    /// Most recent first.
    #[prost(message, repeated, tag = "6")]
    pub sent_message_keys: ::prost::alloc::vec::Vec<SentMessageKeyProto>,
    #[prost(map = "uint64, message", tag = "7")]
    pub peer_fingerprints: ::std::collections::HashMap<u64, FingerprintProto>,
    /// Milliseconds since epoch; zero when the device never registered.
    #[prost(uint64, tag = "8")]
    pub last_registered_at: u64,
}
