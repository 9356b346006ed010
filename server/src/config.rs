/// Relay server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Registered peers allowed at once
    pub max_peers: usize,
    /// Frames buffered per peer before the peer is dropped as too slow
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9001".to_string(),
            max_peers: 512,
            outbound_queue: 256,
        }
    }
}

impl ServerConfig {
    /// Defaults with `PLATFORMER_LISTEN_ADDR` applied when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("PLATFORMER_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.trim().is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.max_peers == 0 {
            return Err("max_peers must be > 0".to_string());
        }
        if self.outbound_queue == 0 {
            return Err("outbound_queue must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = ServerConfig {
            max_peers: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
        let config = ServerConfig {
            outbound_queue: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
        let config = ServerConfig {
            listen_addr: " ".to_string(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
