//! Configuration types.
//!
//! Everything is read once at startup (from the process environment, after
//! loading an optional `.env` file) and handed to constructors.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::ticketing::ServiceArea;

/// Graph mailbox configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub tenant_id: String,
    /// Mailbox (user principal name) to poll.
    pub mailbox: String,
    /// Token authority host, e.g. `https://login.microsoftonline.com`.
    pub authority_url: String,
    /// Graph API base, e.g. `https://graph.microsoft.com/v1.0`.
    pub api_url: String,
    pub request_timeout: Duration,
}

/// Atium ticketing configuration.
#[derive(Debug, Clone)]
pub struct TicketingConfig {
    pub endpoint: String,
    pub username: String,
    pub password: SecretString,
    pub request_timeout: Duration,
}

/// Poll loop configuration.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between cycles.
    pub interval: Duration,
    /// Maximum unread messages fetched per cycle.
    pub batch_size: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_WAIT_CYCLE_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Fixed fields applied to every ticket opened from mail.
#[derive(Debug, Clone)]
pub struct TicketDefaults {
    pub service_area: ServiceArea,
    /// Operator id recorded as the ticket opener.
    pub opened_by: u32,
}

impl Default for TicketDefaults {
    fn default() -> Self {
        Self {
            service_area: ServiceArea::Generic,
            opened_by: DEFAULT_OPENED_BY,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
    /// Optional directory for a daily rolling log file.
    pub dir: Option<PathBuf>,
}

impl LogConfig {
    /// Logging settings alone, so tracing can be installed before the rest
    /// of the configuration is validated.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            level: get("LOGLEVEL").unwrap_or_else(|| "info".into()),
            dir: get("LOG_DIR").map(PathBuf::from),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mail: MailConfig,
    pub ticketing: TicketingConfig,
    pub poll: PollConfig,
    pub ticket: TicketDefaults,
    pub log: LogConfig,
}

const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_GRAPH_API_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_WAIT_CYCLE_SECS: u64 = 60;
const DEFAULT_BATCH_SIZE: usize = 5;
const MAX_BATCH_SIZE: usize = 1000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_OPENED_BY: u32 = 37;
const DEFAULT_SERVICE_AREA: &str = "Undistinguished";

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let timeout_secs: u64 = parse_or(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "REQUEST_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }
        let request_timeout = Duration::from_secs(timeout_secs);

        let mail = MailConfig {
            client_id: require("OFFICE_CLIENT_ID")?,
            client_secret: SecretString::from(require("OFFICE_CLIENT_SECRET")?),
            tenant_id: require("OFFICE_TENANT_ID")?,
            mailbox: require("USER_EMAIL")?,
            authority_url: trim_url(get("GRAPH_AUTHORITY_URL"), DEFAULT_AUTHORITY_URL),
            api_url: trim_url(get("GRAPH_API_URL"), DEFAULT_GRAPH_API_URL),
            request_timeout,
        };

        let ticketing = TicketingConfig {
            endpoint: trim_url(Some(require("ATIUM_ENDPOINT")?), ""),
            username: require("ATIUM_USER")?,
            password: SecretString::from(require("ATIUM_PASSWORD")?),
            request_timeout,
        };

        let batch_size: usize = parse_or(&get, "MAIL_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_BATCH_SIZE".into(),
                message: format!("must be between 1 and {MAX_BATCH_SIZE}, got {batch_size}"),
            });
        }

        let wait_secs: u64 = parse_or(&get, "WAIT_CYCLE", DEFAULT_WAIT_CYCLE_SECS)?;
        if wait_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WAIT_CYCLE".into(),
                message: "must be greater than zero".into(),
            });
        }

        let poll = PollConfig {
            interval: Duration::from_secs(wait_secs),
            batch_size,
        };

        let ticket = TicketDefaults {
            service_area: ServiceArea::from_label(
                &get("TICKET_SERVICE_AREA").unwrap_or_else(|| DEFAULT_SERVICE_AREA.into()),
            ),
            opened_by: parse_or(&get, "TICKET_OPENED_BY", DEFAULT_OPENED_BY)?,
        };

        let log = LogConfig::from_lookup(&lookup);

        Ok(Self {
            mail,
            ticketing,
            poll,
            ticket,
            log,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

fn trim_url(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("OFFICE_CLIENT_ID", "client"),
            ("OFFICE_CLIENT_SECRET", "secret"),
            ("OFFICE_TENANT_ID", "tenant"),
            ("USER_EMAIL", "support@example.com"),
            ("ATIUM_ENDPOINT", "https://atium.example.com/api/"),
            ("ATIUM_USER", "agent"),
            ("ATIUM_PASSWORD", "hunter2"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_applied() {
        let cfg = load(&base_env()).unwrap();
        assert_eq!(cfg.poll.interval, Duration::from_secs(60));
        assert_eq!(cfg.poll.batch_size, 5);
        assert_eq!(cfg.mail.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.mail.authority_url, "https://login.microsoftonline.com");
        assert_eq!(cfg.mail.api_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(cfg.ticket.service_area, ServiceArea::Generic);
        assert_eq!(cfg.ticket.opened_by, 37);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.log.dir.is_none());
    }

    #[test]
    fn endpoint_trailing_slash_trimmed() {
        let cfg = load(&base_env()).unwrap();
        assert_eq!(cfg.ticketing.endpoint, "https://atium.example.com/api");
        assert_eq!(cfg.ticketing.password.expose_secret(), "hunter2");
    }

    #[test]
    fn missing_required_var() {
        let mut env = base_env();
        env.remove("ATIUM_PASSWORD");
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "ATIUM_PASSWORD"));
    }

    #[test]
    fn blank_required_var_counts_as_missing() {
        let mut env = base_env();
        env.insert("USER_EMAIL", "   ");
        assert!(matches!(load(&env), Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn overrides_parsed() {
        let mut env = base_env();
        env.insert("WAIT_CYCLE", "15");
        env.insert("MAIL_BATCH_SIZE", "20");
        env.insert("REQUEST_TIMEOUT_SECS", "10");
        env.insert("TICKET_SERVICE_AREA", "Mago");
        env.insert("TICKET_OPENED_BY", "12");
        env.insert("LOGLEVEL", "debug");
        env.insert("LOG_DIR", "/var/log/mail-agent");
        let cfg = load(&env).unwrap();
        assert_eq!(cfg.poll.interval, Duration::from_secs(15));
        assert_eq!(cfg.poll.batch_size, 20);
        assert_eq!(cfg.ticketing.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.ticket.service_area, ServiceArea::Mago);
        assert_eq!(cfg.ticket.opened_by, 12);
        assert_eq!(cfg.log.level, "debug");
        assert_eq!(cfg.log.dir, Some(PathBuf::from("/var/log/mail-agent")));
    }

    #[test]
    fn invalid_number_rejected() {
        let mut env = base_env();
        env.insert("WAIT_CYCLE", "soon");
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "WAIT_CYCLE"));
    }

    #[test]
    fn batch_size_bounds() {
        let mut env = base_env();
        env.insert("MAIL_BATCH_SIZE", "0");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));
        env.insert("MAIL_BATCH_SIZE", "5000");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn zero_wait_cycle_rejected() {
        let mut env = base_env();
        env.insert("WAIT_CYCLE", "0");
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "WAIT_CYCLE"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut env = base_env();
        env.insert("REQUEST_TIMEOUT_SECS", "0");
        assert!(matches!(load(&env), Err(ConfigError::InvalidValue { .. })));
    }
}
