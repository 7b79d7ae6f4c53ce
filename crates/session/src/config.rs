//! Configuration types for avatar sessions

use crate::signaling::CONNECT_TRIGGER;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a SessionController and its relay clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Relay backend base URL (http:// or https://)
    pub relay_url: String,

    /// Timeout for each relay request in seconds (default: 30)
    pub request_timeout_secs: u64,

    /// Trigger payload sent with the initiate request
    pub connect_trigger: String,

    /// Wait for local ICE gathering before submitting the answer (default: true)
    ///
    /// The relay has no trickle-ICE endpoint, so the answer must carry the
    /// gathered candidates.
    pub wait_for_ice_gathering: bool,

    /// Upper bound on the ICE gathering wait in milliseconds (default: 5000)
    pub ice_gathering_timeout_ms: u64,

    /// Capacity of the session event broadcast channel (default: 256)
    pub event_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 30,
            connect_trigger: CONNECT_TRIGGER.to_string(),
            wait_for_ice_gathering: true,
            ice_gathering_timeout_ms: 5000,
            event_channel_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.relay_url.starts_with("http://") && !self.relay_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "relay_url must start with http:// or https://, got: {}",
                self.relay_url
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.connect_trigger.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "connect_trigger must not be empty".to_string(),
            ));
        }

        if self.wait_for_ice_gathering && self.ice_gathering_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "ice_gathering_timeout_ms must be greater than 0 when waiting for gathering"
                    .to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Relay request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// ICE gathering wait, or None when the answer is sent without waiting
    pub fn ice_gathering_wait(&self) -> Option<Duration> {
        self.wait_for_ice_gathering
            .then(|| Duration::from_millis(self.ice_gathering_timeout_ms))
    }

    /// Relay base URL without a trailing slash
    pub fn relay_base(&self) -> &str {
        self.relay_url.trim_end_matches('/')
    }

    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = url.into();
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_connect_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.connect_trigger = trigger.into();
        self
    }

    /// Set the ICE gathering wait; None disables waiting
    pub fn with_ice_gathering_wait(mut self, timeout: Option<Duration>) -> Self {
        match timeout {
            Some(timeout) => {
                self.wait_for_ice_gathering = true;
                self.ice_gathering_timeout_ms = timeout.as_millis() as u64;
            }
            None => self.wait_for_ice_gathering = false,
        }
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connect_trigger, CONNECT_TRIGGER);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_relay_url() {
        let config = SessionConfig::default().with_relay_url("ws://localhost:5000");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = SessionConfig::default().with_request_timeout_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_trigger_rejected() {
        let config = SessionConfig::default().with_connect_trigger("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ice_gathering_wait() {
        let config = SessionConfig::default();
        assert_eq!(config.ice_gathering_wait(), Some(Duration::from_millis(5000)));

        let config = config.with_ice_gathering_wait(None);
        assert_eq!(config.ice_gathering_wait(), None);
        assert!(config.validate().is_ok());

        let config = config.with_ice_gathering_wait(Some(Duration::from_secs(2)));
        assert_eq!(config.ice_gathering_timeout_ms, 2000);
    }

    #[test]
    fn test_relay_base_trims_trailing_slash() {
        let config = SessionConfig::default().with_relay_url("https://relay.example.com/");
        assert_eq!(config.relay_base(), "https://relay.example.com");
    }

    #[test]
    fn test_config_deserializes_from_json() {
        let json = r#"{
            "relay_url": "https://relay.example.com",
            "request_timeout_secs": 10,
            "connect_trigger": "SYSTEM_CONNECT_REQUEST",
            "wait_for_ice_gathering": false,
            "ice_gathering_timeout_ms": 0,
            "event_channel_capacity": 16
        }"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.event_channel_capacity, 16);
    }
}
