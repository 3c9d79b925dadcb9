//! Websocket relay configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const MAX_HANDSHAKE_TIMEOUT_SECS: u64 = 3600;
const MAX_OUTBOUND_BUFFER: usize = 65_536;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Close connections that have not completed a handshake in time.
    /// Unset means wait indefinitely.
    #[serde(default)]
    pub handshake_timeout_secs: Option<u64>,

    /// Per-connection outbound queue depth
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl RelayConfig {
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(secs) = self.handshake_timeout_secs {
            if secs == 0 || secs > MAX_HANDSHAKE_TIMEOUT_SECS {
                return Err(ValidationError::InvalidHandshakeTimeout);
            }
        }
        if self.outbound_buffer == 0 || self.outbound_buffer > MAX_OUTBOUND_BUFFER {
            return Err(ValidationError::InvalidOutboundBuffer);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: None,
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

fn default_outbound_buffer() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_handshake_timeout_by_default() {
        let config = RelayConfig::default();
        assert!(config.handshake_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = RelayConfig {
            handshake_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let config = RelayConfig {
            outbound_buffer: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidOutboundBuffer)
        ));
    }
}
