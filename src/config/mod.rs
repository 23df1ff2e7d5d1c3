//! Configuration module for the plant care backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::errors::AppError;

/// Timezone used for new user-plants and for day boundaries when the caller names none.
pub const DEFAULT_TIMEZONE: &str = "Europe/Amsterdam";

/// How long a cached list stays fresh.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
    /// Default IANA timezone for care schedules
    pub default_timezone: Tz,
    /// Freshness window of the query cache
    pub cache_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("PLANTCARE_API_PSK").ok();

        let db_path = env::var("PLANTCARE_DB_PATH")
            .unwrap_or_else(|_| "./data/plantcare.sqlite".to_string())
            .into();

        let bind_addr = env::var("PLANTCARE_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid PLANTCARE_BIND_ADDR: {}", e)))?;

        let log_level = env::var("PLANTCARE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = env::var("PLANTCARE_LOG_JSON")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let default_timezone = parse_timezone(
            &env::var("PLANTCARE_TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string()),
        )
        .map_err(|e| AppError::Internal(format!("Invalid PLANTCARE_TIMEZONE: {}", e.message())))?;

        let cache_ttl_secs = match env::var("PLANTCARE_CACHE_TTL_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                AppError::Internal(format!("Invalid PLANTCARE_CACHE_TTL_SECS: {}", e))
            })?,
            Err(_) => DEFAULT_CACHE_TTL_SECS,
        };

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            log_json,
            default_timezone,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
        })
    }
}

/// Parse an IANA timezone name such as `Europe/Amsterdam`.
pub fn parse_timezone(name: &str) -> Result<Tz, AppError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| AppError::BadRequest(format!("Unknown timezone '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("PLANTCARE_API_PSK");
        env::remove_var("PLANTCARE_DB_PATH");
        env::remove_var("PLANTCARE_BIND_ADDR");
        env::remove_var("PLANTCARE_LOG_LEVEL");
        env::remove_var("PLANTCARE_LOG_JSON");
        env::remove_var("PLANTCARE_TIMEZONE");
        env::remove_var("PLANTCARE_CACHE_TTL_SECS");

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/plantcare.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert_eq!(config.default_timezone, chrono_tz::Europe::Amsterdam);
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("UTC").unwrap(), chrono_tz::UTC);
        assert_eq!(
            parse_timezone(" America/New_York ").unwrap(),
            chrono_tz::America::New_York
        );
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
    }
}
