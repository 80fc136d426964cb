//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

use chrono::FixedOffset;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub event_bus: EventBusConfig,

    pub smtp: SmtpConfig,

    /// Offset used to render timestamps in notification mail
    pub mail_utc_offset: FixedOffset,
}

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Broker addresses, first one wins (`memory://`, `redis://host:port`)
    pub brokers: Vec<String>,
    pub client_id: String,
    /// Base consumer group; each consumer appends its own suffix
    pub group_id: String,
    /// Lane workers per subscription
    pub lanes: usize,
}

impl EventBusConfig {
    /// Consumer group of the email notification consumer
    pub fn email_group(&self) -> String {
        format!("{}-email", self.group_id)
    }
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let brokers = parse_brokers(&required("EVENT_BUS_BROKERS")?)
            .ok_or(ConfigError::InvalidValue("EVENT_BUS_BROKERS"))?;

        let lanes = env::var("EVENT_BUS_LANES")
            .unwrap_or_else(|_| "4".to_string())
            .parse::<usize>()
            .ok()
            .filter(|lanes| *lanes > 0)
            .ok_or(ConfigError::InvalidValue("EVENT_BUS_LANES"))?;

        let event_bus = EventBusConfig {
            brokers,
            client_id: env::var("EVENT_BUS_CLIENT_ID")
                .unwrap_or_else(|_| "wallet-service".to_string()),
            group_id: env::var("EVENT_BUS_GROUP_ID")
                .unwrap_or_else(|_| "wallet-email-service".to_string()),
            lanes,
        };

        let smtp = SmtpConfig {
            host: required("SMTP_HOST")?,
            port: required("SMTP_PORT")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SMTP_PORT"))?,
            user: required("SMTP_USER")?,
            pass: required("SMTP_PASS")?,
        };

        let mail_utc_offset = parse_utc_offset(
            &env::var("MAIL_UTC_OFFSET").unwrap_or_else(|_| "+00:00".to_string()),
        )
        .ok_or(ConfigError::InvalidValue("MAIL_UTC_OFFSET"))?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            event_bus,
            smtp,
            mail_utc_offset,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingEnv(name))
}

/// Comma-separated, blanks ignored; at least one entry.
fn parse_brokers(raw: &str) -> Option<Vec<String>> {
    let brokers: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|broker| !broker.is_empty())
        .map(str::to_string)
        .collect();

    (!brokers.is_empty()).then_some(brokers)
}

/// `+HH:MM` / `-HH:MM`
fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = if let Some(rest) = raw.strip_prefix('+') {
        (1, rest)
    } else {
        (-1, raw.strip_prefix('-')?)
    };

    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
