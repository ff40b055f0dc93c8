use std::net::SocketAddr;

use crate::error::ConfigError;

pub const DEFAULT_BIND: &str = "127.0.0.1:1060";
pub const DEFAULT_MAX_SESSIONS: usize = 16;
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Admission limit. Existing sessions are never evicted to make room.
    pub max_sessions: usize,
    /// Backlog at which a consumer is evicted instead of receiving more.
    pub max_queue_depth: usize,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::NoSessions);
        }
        if self.max_queue_depth == 0 {
            return Err(ConfigError::NoQueueDepth);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 1060)),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
        }
    }
}
