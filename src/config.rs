//! Runtime configuration loaded from the environment (after `.env`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 7878;
const DEFAULT_OUTBOUND_CAPACITY: usize = 64;
const DEFAULT_REACTION_LIMIT: u32 = 10;
const DEFAULT_REACTION_WINDOW_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Messages queued per connection before broadcasts to it start being dropped
    pub outbound_capacity: usize,
    pub reaction_limit: u32,
    pub reaction_window: Duration,
    /// Advance LIVE games to COMPLETED once every category of their event is revealed
    pub auto_complete: bool,
    pub seed_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            reaction_limit: DEFAULT_REACTION_LIMIT,
            reaction_window: Duration::from_secs(DEFAULT_REACTION_WINDOW_SECS),
            auto_complete: true,
            seed_file: None,
        }
    }
}

impl AppConfig {
    /// Load config from environment variables:
    /// ENVELOPE_BIND_ADDR, ENVELOPE_OUTBOUND_CAPACITY, ENVELOPE_REACTION_LIMIT,
    /// ENVELOPE_REACTION_WINDOW_SECS, ENVELOPE_AUTO_COMPLETE, ENVELOPE_SEED_FILE
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            bind_addr: parse_env("ENVELOPE_BIND_ADDR", defaults.bind_addr),
            outbound_capacity: parse_env("ENVELOPE_OUTBOUND_CAPACITY", defaults.outbound_capacity)
                .max(1),
            reaction_limit: parse_env("ENVELOPE_REACTION_LIMIT", defaults.reaction_limit),
            reaction_window: Duration::from_secs(parse_env(
                "ENVELOPE_REACTION_WINDOW_SECS",
                DEFAULT_REACTION_WINDOW_SECS,
            )),
            auto_complete: parse_env("ENVELOPE_AUTO_COMPLETE", defaults.auto_complete),
            seed_file: std::env::var("ENVELOPE_SEED_FILE")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        };

        tracing::info!(
            bind_addr = %config.bind_addr,
            outbound_capacity = config.outbound_capacity,
            reaction_limit = config.reaction_limit,
            reaction_window_secs = config.reaction_window.as_secs(),
            auto_complete = config.auto_complete,
            "Configuration loaded"
        );
        config
    }
}

/// Read and parse an env var, falling back to `default` (with a warning) on bad input
fn parse_env<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid value {:?} for {}, using {}", raw, key, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "ENVELOPE_BIND_ADDR",
            "ENVELOPE_OUTBOUND_CAPACITY",
            "ENVELOPE_REACTION_LIMIT",
            "ENVELOPE_REACTION_WINDOW_SECS",
            "ENVELOPE_AUTO_COMPLETE",
            "ENVELOPE_SEED_FILE",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = AppConfig::from_env();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:7878");
        assert_eq!(config.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert!(config.auto_complete);
        assert!(config.seed_file.is_none());
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        std::env::set_var("ENVELOPE_BIND_ADDR", "127.0.0.1:9000");
        std::env::set_var("ENVELOPE_REACTION_LIMIT", "3");
        std::env::set_var("ENVELOPE_AUTO_COMPLETE", "false");
        std::env::set_var("ENVELOPE_SEED_FILE", "seed.json");

        let config = AppConfig::from_env();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.reaction_limit, 3);
        assert!(!config.auto_complete);
        assert_eq!(config.seed_file, Some(PathBuf::from("seed.json")));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        std::env::set_var("ENVELOPE_OUTBOUND_CAPACITY", "lots");
        std::env::set_var("ENVELOPE_REACTION_WINDOW_SECS", "-1");

        let config = AppConfig::from_env();
        assert_eq!(config.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert_eq!(
            config.reaction_window,
            Duration::from_secs(DEFAULT_REACTION_WINDOW_SECS)
        );
        clear_env();
    }
}
