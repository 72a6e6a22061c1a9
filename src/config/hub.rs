//! Live-connection hub configuration

use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Outbound messages buffered per connection before it is evicted
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// WebSocket endpoint path
    #[serde(default = "default_path")]
    pub path: String,

    /// Also push every new post to all live connections from the bus
    #[serde(default)]
    pub broadcast_on_post: bool,
}

impl HubConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.outbound_capacity == 0 {
            return Err(ValidationError::MustBePositive("hub.outbound_capacity"));
        }
        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidWebSocketPath);
        }
        Ok(())
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: default_outbound_capacity(),
            path: default_path(),
            broadcast_on_post: false,
        }
    }
}

fn default_outbound_capacity() -> usize {
    256
}

fn default_path() -> String {
    "/post/feed/posted".to_string()
}
