//! Runtime configuration
//!
//! All settings are environment-sourced with defaults; the server binary
//! may override the listen address from the command line. Unset or
//! malformed values fall back to their defaults rather than failing.

use std::env;
use std::str::FromStr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind to.
    pub bind: String,
    /// sqlx connection string for the message store.
    pub db_connection: String,
    /// Maximum accepted WebSocket frame size in bytes.
    pub max_message_size: usize,
    /// Declared read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Declared write timeout in seconds.
    pub write_timeout_secs: u64,
    /// Username policy lower bound.
    pub min_username_len: usize,
    /// Username policy upper bound.
    pub max_username_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "127.0.0.1".to_string(),
            db_connection: "sqlite://chat.db?mode=rwc".to_string(),
            max_message_size: 4096,
            read_timeout_secs: 60,
            write_timeout_secs: 60,
            min_username_len: 3,
            max_username_len: 10,
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse_or("PORT", defaults.port),
            bind: env_or("BIND", &defaults.bind),
            db_connection: env_or("DB_CONNECTION", &defaults.db_connection),
            max_message_size: env_parse_or("MAX_MESSAGE_SIZE", defaults.max_message_size),
            read_timeout_secs: env_parse_or("READ_TIMEOUT", defaults.read_timeout_secs),
            write_timeout_secs: env_parse_or("WRITE_TIMEOUT", defaults.write_timeout_secs),
            min_username_len: env_parse_or("MIN_USERNAME_LEN", defaults.min_username_len),
            max_username_len: env_parse_or("MAX_USERNAME_LEN", defaults.max_username_len),
        }
    }

    /// Socket address string for the listener.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn env_parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value.parse().unwrap_or(default),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.min_username_len, 3);
        assert_eq!(config.max_username_len, 10);
        assert_eq!(config.socket_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_env_or_prefers_set_value() {
        env::set_var("CHAT_RELAY_TEST_BIND", "0.0.0.0");
        assert_eq!(env_or("CHAT_RELAY_TEST_BIND", "127.0.0.1"), "0.0.0.0");
        assert_eq!(env_or("CHAT_RELAY_TEST_UNSET", "127.0.0.1"), "127.0.0.1");
    }

    #[test]
    fn test_env_or_ignores_empty_value() {
        env::set_var("CHAT_RELAY_TEST_EMPTY", "");
        assert_eq!(env_or("CHAT_RELAY_TEST_EMPTY", "fallback"), "fallback");
    }

    #[test]
    fn test_env_parse_or() {
        env::set_var("CHAT_RELAY_TEST_PORT", "9001");
        assert_eq!(env_parse_or("CHAT_RELAY_TEST_PORT", 8080u16), 9001);
        assert_eq!(env_parse_or("CHAT_RELAY_TEST_PORT_UNSET", 8080u16), 8080);
    }

    #[test]
    fn test_env_parse_or_malformed_falls_back() {
        env::set_var("CHAT_RELAY_TEST_BAD_PORT", "not-a-number");
        assert_eq!(env_parse_or("CHAT_RELAY_TEST_BAD_PORT", 8080u16), 8080);
    }
}
