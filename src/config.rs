//! Runtime configuration, read once at startup from `BANKCORE_*` variables
//! (a `.env` file is honoured if present).

use crate::domain::otp::OtpPolicy;
use chrono::TimeDelta;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_LOCAL_CACHE_CAPACITY: usize = 10_000;
/// Longest idempotency marker lifetime accepted (one week).
pub const MAX_IDEMPOTENCY_TTL_SECS: u64 = 7 * 24 * 60 * 60;
/// Longest OTP expiry, cool-down or window accepted (one week).
pub const MAX_OTP_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BankConfig {
    pub otp: OtpPolicy,
    pub idempotency_ttl: Duration,
    pub local_cache_capacity: usize,
    pub log_filter: String,
    pub log_json: bool,
    /// ip-api style template containing `{ip}`. No lookups are made when unset.
    pub geolocation_url: Option<String>,
    pub geolocation_token: Option<String>,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            otp: OtpPolicy::default(),
            idempotency_ttl: DEFAULT_IDEMPOTENCY_TTL,
            local_cache_capacity: DEFAULT_LOCAL_CACHE_CAPACITY,
            log_filter: "warn".to_string(),
            log_json: false,
            geolocation_url: None,
            geolocation_token: None,
        }
    }
}

impl BankConfig {
    /// Loads configuration from the environment, using defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but cannot be parsed,
    /// or if a duration or capacity is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`BankConfig::from_env`] but reads from an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let otp = OtpPolicy {
            expiry: minutes(&lookup, "BANKCORE_OTP_EXPIRY_MINUTES", defaults.otp.expiry)?,
            attempts_limit: positive(
                &lookup,
                "BANKCORE_OTP_ATTEMPTS_LIMIT",
                defaults.otp.attempts_limit,
            )?,
            cooldown: minutes(&lookup, "BANKCORE_OTP_COOLDOWN_MINUTES", defaults.otp.cooldown)?,
            window: minutes(&lookup, "BANKCORE_OTP_WINDOW_MINUTES", defaults.otp.window)?,
        };

        let ttl_secs = positive(
            &lookup,
            "BANKCORE_IDEMPOTENCY_TTL_SECS",
            defaults.idempotency_ttl.as_secs(),
        )?;
        if ttl_secs > MAX_IDEMPOTENCY_TTL_SECS {
            return Err(ConfigError::InvalidValue {
                key: "BANKCORE_IDEMPOTENCY_TTL_SECS".to_string(),
                message: format!("must be at most {MAX_IDEMPOTENCY_TTL_SECS}"),
            });
        }

        Ok(Self {
            otp,
            idempotency_ttl: Duration::from_secs(ttl_secs),
            local_cache_capacity: positive(
                &lookup,
                "BANKCORE_LOCAL_CACHE_CAPACITY",
                defaults.local_cache_capacity,
            )?,
            log_filter: lookup("BANKCORE_LOG").unwrap_or(defaults.log_filter),
            log_json: parsed(&lookup, "BANKCORE_LOG_JSON", defaults.log_json)?,
            geolocation_url: lookup("BANKCORE_GEO_URL").filter(|url| !url.trim().is_empty()),
            geolocation_token: lookup("BANKCORE_GEO_TOKEN")
                .filter(|token| !token.trim().is_empty()),
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn positive<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let value = parsed(lookup, key, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn minutes<F>(lookup: &F, key: &str, default: TimeDelta) -> Result<TimeDelta, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: i64 = positive(lookup, key, default.num_minutes())?;
    if value < 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if value > MAX_OTP_MINUTES {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be at most {MAX_OTP_MINUTES}"),
        });
    }
    TimeDelta::try_minutes(value).ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_string(),
        message: "out of range".to_string(),
    })
}
