//! Configuration types.
//!
//! Everything is read from the environment once at startup. Credentials are
//! wrapped in [`SecretString`] so they never end up in `Debug` output or logs.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP port the webhook server binds to.
    pub port: u16,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Optional directory for daily-rolled log files.
    pub log_dir: Option<PathBuf>,
    /// Sessions idle for longer than this are evicted.
    pub session_idle_timeout: Duration,
    /// How often the eviction sweep runs.
    pub session_sweep_interval: Duration,
    pub scheduling: SchedulingConfig,
    pub messaging: MessagingProvider,
    pub calendar: Option<CalendarConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_env("SHOP_ASSIST_PORT", 3001u16)?;
        let db_path = std::env::var("SHOP_ASSIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/shop-assist.db"));
        let log_dir = std::env::var("SHOP_ASSIST_LOG_DIR").ok().map(PathBuf::from);

        let idle_minutes: u64 = parse_env("SHOP_ASSIST_SESSION_IDLE_MINUTES", 30)?;
        let sweep_secs: u64 = parse_env("SHOP_ASSIST_SESSION_SWEEP_SECS", 60)?;

        Ok(Self {
            port,
            db_path,
            log_dir,
            session_idle_timeout: minutes("SHOP_ASSIST_SESSION_IDLE_MINUTES", idle_minutes)?,
            session_sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            scheduling: SchedulingConfig::from_env()?,
            messaging: MessagingProvider::from_env()?,
            calendar: CalendarConfig::from_env(),
        })
    }
}

/// Business hours and timezone used to build appointment slots.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Timezone for "today", slot instants and calendar events.
    pub timezone: Tz,
    /// First slot start.
    pub opening: NaiveTime,
    /// Slots must start strictly before this time.
    pub closing: NaiveTime,
    /// Slot length in minutes.
    pub slot_minutes: u32,
    /// Prefix for the calendar event summary.
    pub summary_prefix: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Madrid,
            opening: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            closing: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_minutes: 30,
            summary_prefix: "Cita".to_string(),
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(tz) = std::env::var("SHOP_ASSIST_TIMEZONE") {
            config.timezone = tz.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SHOP_ASSIST_TIMEZONE".into(),
                message: format!("unknown timezone '{tz}'"),
            })?;
        }
        Ok(config)
    }
}

/// Which WhatsApp transport delivers replies.
#[derive(Debug, Clone)]
pub enum MessagingProvider {
    /// Twilio Programmable Messaging (plain text only).
    Twilio {
        account_sid: String,
        auth_token: SecretString,
        /// Sender address, e.g. `whatsapp:+14155238886`.
        from: String,
    },
    /// WhatsApp Business Cloud API (supports interactive lists).
    CloudApi {
        access_token: SecretString,
        phone_number_id: String,
        verify_token: SecretString,
    },
    /// No transport configured; replies are only logged.
    LogOnly,
}

impl MessagingProvider {
    /// Cloud API wins when both providers are configured.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(access_token) = std::env::var("WHATSAPP_ACCESS_TOKEN") {
            let phone_number_id = require_env("WHATSAPP_PHONE_NUMBER_ID")?;
            let verify_token = require_env("WHATSAPP_VERIFY_TOKEN")?;
            return Ok(Self::CloudApi {
                access_token: SecretString::from(access_token),
                phone_number_id,
                verify_token: SecretString::from(verify_token),
            });
        }

        if let Ok(account_sid) = std::env::var("TWILIO_ACCOUNT_SID") {
            let auth_token = require_env("TWILIO_AUTH_TOKEN")?;
            let from = require_env("TWILIO_WHATSAPP_FROM")?;
            return Ok(Self::Twilio {
                account_sid,
                auth_token: SecretString::from(auth_token),
                from,
            });
        }

        Ok(Self::LogOnly)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Twilio { .. } => "twilio",
            Self::CloudApi { .. } => "whatsapp-cloud",
            Self::LogOnly => "log-only",
        }
    }
}

/// Google Calendar target for booked appointments.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub calendar_id: String,
    /// OAuth bearer token with `calendar.events` scope.
    pub access_token: SecretString,
}

impl CalendarConfig {
    /// Returns `None` unless both variables are set.
    pub fn from_env() -> Option<Self> {
        let calendar_id = std::env::var("GOOGLE_CALENDAR_ID").ok()?;
        let access_token = std::env::var("GOOGLE_CALENDAR_TOKEN").ok()?;
        Some(Self {
            calendar_id,
            access_token: SecretString::from(access_token),
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn minutes(key: &str, value: u64) -> Result<Duration, ConfigError> {
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value} minutes is out of range"),
        })
}
