// Runtime configuration read from the environment (after .env is loaded)

use std::time::Duration;

use crate::auth::token::TokenConfig;

const DEFAULT_ACCESS_EXPIRY: &str = "15m";
const DEFAULT_REFRESH_EXPIRY: &str = "7d";
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 180;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ")]
    SharedSecret,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// In-memory storage is used when absent
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub tokens: TokenConfig,
    pub rate_limit_max_requests: u64,
    pub rate_limit_window: Duration,
    /// Shared rate-limit counters; per-process counters when absent
    pub redis_url: Option<String>,
    /// Take the caller address from `X-Forwarded-For` (set when behind a reverse proxy)
    pub trust_proxy: bool,
}

/// Parse `3600`, `45s`, `15m`, `12h` or `7d` into seconds
pub fn parse_duration(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (number, multiplier) = match value.chars().last()? {
        's' => (&value[..value.len() - 1], 1),
        'm' => (&value[..value.len() - 1], 60),
        'h' => (&value[..value.len() - 1], 60 * 60),
        'd' => (&value[..value.len() - 1], 24 * 60 * 60),
        _ => (value, 1),
    };

    number.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let access_secret =
            get("ACCESS_TOKEN_SECRET").ok_or(ConfigError::Missing("ACCESS_TOKEN_SECRET"))?;
        let refresh_secret =
            get("REFRESH_TOKEN_SECRET").ok_or(ConfigError::Missing("REFRESH_TOKEN_SECRET"))?;
        if access_secret == refresh_secret {
            return Err(ConfigError::SharedSecret);
        }

        let expiry = |key: &'static str, default: &str| -> Result<i64, ConfigError> {
            let raw = get(key).unwrap_or_else(|| default.to_string());
            parse_duration(&raw)
                .filter(|secs| *secs > 0)
                .and_then(|secs| i64::try_from(secs).ok())
                .ok_or(ConfigError::Invalid { key, value: raw })
        };
        let access_ttl_secs = expiry("ACCESS_TOKEN_EXPIRY", DEFAULT_ACCESS_EXPIRY)?;
        let refresh_ttl_secs = expiry("REFRESH_TOKEN_EXPIRY", DEFAULT_REFRESH_EXPIRY)?;

        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::Invalid { key, value: raw }),
                None => Ok(default),
            }
        };
        let rate_limit_max_requests =
            number("RATE_LIMIT_MAX_REQUESTS", DEFAULT_RATE_LIMIT_MAX_REQUESTS)?;
        let window_secs = number("RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS)?;
        if window_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_WINDOW_SECS",
                value: "0".to_string(),
            });
        }

        let trust_proxy = match get("TRUST_PROXY") {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "TRUST_PROXY",
                        value: raw,
                    })
                }
            },
            None => false,
        };

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            None => 8080,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            cors_origin: get("CORS_ORIGIN"),
            tokens: TokenConfig {
                access_secret,
                access_ttl_secs,
                refresh_secret,
                refresh_ttl_secs,
            },
            rate_limit_max_requests,
            rate_limit_window: Duration::from_secs(window_secs),
            redis_url: get("REDIS_URL"),
            trust_proxy,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
