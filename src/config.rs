//! Runtime configuration parsed from environment variables.

use crate::error::ErrorCode;
use crate::registry::{DEFAULT_ZOOM, DEFAULT_ZOOM_FLOOR};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_PROBE_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PROBE_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_AGENT_KEY: &str = "local-agent";
pub const DEFAULT_NICKNAME: &str = "me";
pub const DEFAULT_AVATAR_URL: &str = "https://i.imgur.com/oIrcAO8.jpg";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    Parse(String),
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "E_CONFIG_PARSE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_PROBE_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_PROBE_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereConfig {
    pub port: u16,
    pub default_zoom: f64,
    pub zoom_floor: f64,
    pub probe_timeouts: ProbeTimeouts,
    pub agent_key: String,
    pub nickname: String,
    pub avatar_url: String,
}

impl Default for WhereConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_zoom: DEFAULT_ZOOM,
            zoom_floor: DEFAULT_ZOOM_FLOOR,
            probe_timeouts: ProbeTimeouts::default(),
            agent_key: DEFAULT_AGENT_KEY.into(),
            nickname: DEFAULT_NICKNAME.into(),
            avatar_url: DEFAULT_AVATAR_URL.into(),
        }
    }
}

impl WhereConfig {
    /// Build typed config from environment variables.
    ///
    /// All optional:
    /// - `PORT`: default 3000
    /// - `WHERE_DEFAULT_ZOOM`: zoom factor for newly seen spaces, default 1.0
    /// - `WHERE_ZOOM_FLOOR`: lowest zoom factor, default 0.01
    /// - `WHERE_PROBE_REQUEST_TIMEOUT_SECS`: default 10
    /// - `WHERE_PROBE_CONNECT_TIMEOUT_SECS`: default 5
    /// - `WHERE_AGENT_KEY`, `WHERE_NICKNAME`, `WHERE_AVATAR_URL`: local participant
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` or a zoom value is malformed, or if the zoom
    /// values are not positive.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Parse(format!("invalid PORT: {raw}")))?,
            Err(_) => DEFAULT_PORT,
        };

        let default_zoom = parse_positive_f64("WHERE_DEFAULT_ZOOM", DEFAULT_ZOOM)?;
        let zoom_floor = parse_positive_f64("WHERE_ZOOM_FLOOR", DEFAULT_ZOOM_FLOOR)?;
        if zoom_floor > default_zoom {
            return Err(ConfigError::Parse(format!(
                "WHERE_ZOOM_FLOOR ({zoom_floor}) exceeds WHERE_DEFAULT_ZOOM ({default_zoom})"
            )));
        }

        let probe_timeouts = ProbeTimeouts {
            request_secs: env_parse_u64("WHERE_PROBE_REQUEST_TIMEOUT_SECS", DEFAULT_PROBE_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("WHERE_PROBE_CONNECT_TIMEOUT_SECS", DEFAULT_PROBE_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            port,
            default_zoom,
            zoom_floor,
            probe_timeouts,
            agent_key: std::env::var("WHERE_AGENT_KEY").unwrap_or_else(|_| DEFAULT_AGENT_KEY.into()),
            nickname: std::env::var("WHERE_NICKNAME").unwrap_or_else(|_| DEFAULT_NICKNAME.into()),
            avatar_url: std::env::var("WHERE_AVATAR_URL").unwrap_or_else(|_| DEFAULT_AVATAR_URL.into()),
        })
    }
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_positive_f64(key: &str, default: f64) -> Result<f64, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(default);
    };
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(ConfigError::Parse(format!("{key} must be a positive number, got '{raw}'"))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
