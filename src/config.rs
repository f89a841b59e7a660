//! Startup configuration
//!
//! Read once from the environment (and `.env`, if present). Nothing here is
//! reconfigurable at runtime.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use time::Duration;

/// Largest accepted value for any capacity setting.
pub const MAX_CAPACITY: usize = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: SocketAddr,

    /// Chat messages, files and voice clips kept for replay
    pub message_capacity: usize,

    /// Status posts kept for replay
    pub status_capacity: usize,

    /// Age at which a status post disappears
    pub status_ttl: Duration,

    /// Reels kept for replay
    pub reel_capacity: usize,

    /// Frames queued per connection before new ones are dropped
    pub outbox_capacity: usize,

    /// Directory served for everything outside `/api` and `/ws`
    pub static_dir: Option<PathBuf>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            message_capacity: 100,
            status_capacity: 50,
            status_ttl: Duration::hours(24),
            reel_capacity: 30,
            outbox_capacity: 256,
            static_dir: None,
        }
    }
}

impl HubConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or_else(|| defaults.bind_addr.ip().to_string());
        let port: u16 = parse_or(&lookup, "PORT", "port number", defaults.bind_addr.port())?;
        let bind_addr = SocketAddr::from_str(&format!("{host}:{port}"))
            .or_else(|_| SocketAddr::from_str(&format!("[{host}]:{port}")))
            .map_err(|_| ConfigError::Invalid {
                var: "HOST",
                expected: "IP address",
                value: host.clone(),
            })?;

        let config = Self {
            bind_addr,
            message_capacity: parse_or(&lookup, "MESSAGE_CAPACITY", "integer", defaults.message_capacity)?,
            status_capacity: parse_or(&lookup, "STATUS_CAPACITY", "integer", defaults.status_capacity)?,
            status_ttl: Duration::seconds(parse_or(
                &lookup,
                "STATUS_TTL_SECS",
                "integer",
                defaults.status_ttl.whole_seconds(),
            )?),
            reel_capacity: parse_or(&lookup, "REEL_CAPACITY", "integer", defaults.reel_capacity)?,
            outbox_capacity: parse_or(&lookup, "OUTBOX_CAPACITY", "integer", defaults.outbox_capacity)?,
            static_dir: lookup("STATIC_DIR").filter(|dir| !dir.is_empty()).map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (var, value) in [
            ("MESSAGE_CAPACITY", self.message_capacity),
            ("STATUS_CAPACITY", self.status_capacity),
            ("REEL_CAPACITY", self.reel_capacity),
            ("OUTBOX_CAPACITY", self.outbox_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(var));
            }
            if value > MAX_CAPACITY {
                return Err(ConfigError::Invalid {
                    var,
                    expected: "integer no greater than 100000",
                    value: value.to_string(),
                });
            }
        }
        if !self.status_ttl.is_positive() {
            return Err(ConfigError::Zero("STATUS_TTL_SECS"));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value,
        }),
    }
}
