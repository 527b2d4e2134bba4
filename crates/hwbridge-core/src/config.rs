use hwbridge_protocol::DEFAULT_MAX_MESSAGE_SIZE;

/// Configuration for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Largest message length a device may declare. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
