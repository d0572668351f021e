use clap::Parser;
use std::time::Duration;
use thiserror::Error as ThisError;

use crate::codec::DEFAULT_MAX_LINE_LENGTH;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_MAX_CONNECTIONS: usize = 4;
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5000;

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(version, about)]
pub struct Config {
    /// The host to listen on
    #[arg(long, env = "LINEDIS_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// The port to listen on
    #[arg(short, long, env = "LINEDIS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// How many connections are served at once, further clients wait in the listen backlog
    #[arg(long, env = "LINEDIS_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,

    /// How many sessions may be registered at once
    #[arg(long, env = "LINEDIS_REGISTER_LIMIT", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub register_limit: usize,

    /// The longest line, in bytes, a client may send
    #[arg(long, env = "LINEDIS_MAX_LINE_LENGTH", default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,

    /// How long to wait for open sessions to finish after a shutdown request
    #[arg(long, env = "LINEDIS_DRAIN_TIMEOUT_MS", default_value_t = DEFAULT_DRAIN_TIMEOUT_MS)]
    pub drain_timeout_ms: u64,
}

#[derive(Debug, ThisError, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Zero("max_connections"));
        }
        if self.register_limit == 0 {
            return Err(ConfigError::Zero("register_limit"));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Zero("max_line_length"));
        }
        Ok(())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            register_limit: DEFAULT_MAX_CONNECTIONS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}
