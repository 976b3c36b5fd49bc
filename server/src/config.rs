use std::time::Duration;

use shared::{Framing, DEFAULT_BUFFER_SIZE, DEFAULT_PORT};

/// Everything the relay needs to know before it binds.
///
/// `Default` gives the production values; tests usually override a handful
/// with struct-update syntax.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Shown in the welcome prompt only.
    pub chat_name: String,
    pub strike_limit: u32,
    pub min_message_interval: Duration,
    pub handshake_timeout: Duration,
    /// How long a single write to a client may stall before the client is
    /// dropped. Also bounds the final flush at shutdown.
    pub write_timeout: Duration,
    pub buffer_size: usize,
    pub tick_interval: Duration,
    /// Lines buffered per client before broadcasts to it start being dropped.
    pub outbound_capacity: usize,
    pub framing: Framing,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            chat_name: "LofiChat".to_string(),
            strike_limit: 10,
            min_message_interval: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            buffer_size: DEFAULT_BUFFER_SIZE,
            tick_interval: Duration::from_millis(10),
            outbound_capacity: 256,
            framing: Framing::Lines,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.strike_limit, 10);
        assert_eq!(config.min_message_interval, Duration::from_secs(1));
        assert_eq!(config.handshake_timeout, Duration::from_secs(60));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.buffer_size, 2048);
        assert_eq!(config.framing, Framing::Lines);
        assert!(config.tick_interval < Duration::from_millis(100));
    }

    #[test]
    fn test_bind_address() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        };
        assert_eq!(config.bind_address(), "127.0.0.1:0");
    }
}
