/// Tunable parameters for a [`crate::Client`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// One-time pre-keys generated at bootstrap, and the pool size
    /// replenishment aims back toward.
    pub initial_pre_key_batch: usize,
    /// Server-side stock level that triggers replenishment.
    pub min_server_stock: usize,
    /// Capacity of the sent-message-key cache. Keys evicted past this cap
    /// make the sender's own copies permanently undecryptable.
    pub sent_key_cache_size: usize,
    /// Human-readable device name sent at registration.
    pub display_name: String,
    /// Platform tag sent at registration.
    pub platform: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            initial_pre_key_batch: 10,
            min_server_stock: 5,
            sent_key_cache_size: 200,
            display_name: "Cachet".to_string(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}
