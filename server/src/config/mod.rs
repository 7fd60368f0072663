use std::env;
use std::str::FromStr;
use std::time::Duration;

pub mod http_client;
pub mod messaging;

pub use http_client::{BreakerKind, HttpClientConfig};
pub use messaging::AmqpConfig;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/ticket_inventory";
const DEFAULT_BRE_PATH: &str = "./assets/online-ticket-weight.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
}

impl ServiceEndpoint {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn from_env(prefix: &str, default_port: u16) -> Self {
        Self {
            host: env_or(&format!("{prefix}_HOST"), "localhost".to_string()),
            port: env_parse(&format!("{prefix}_PORT"), default_port),
        }
    }
}

/// How `ShowTickets` renders the online/online detail when the rule
/// engine overrides its stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnlineRowPolicy {
    /// Overridden row followed by the stored row.
    #[default]
    OverrideAndActual,
    /// Only the overridden row.
    OverrideOnly,
}

impl FromStr for OnlineRowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "override_and_actual" => Ok(Self::OverrideAndActual),
            "override_only" => Ok(Self::OverrideOnly),
            other => Err(format!("unknown online row policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub amqp: AmqpConfig,
    pub user_service: ServiceEndpoint,
    pub recommendation_service: ServiceEndpoint,
    pub http_client: HttpClientConfig,
    pub http_port: u16,
    pub request_timeout: Duration,
    pub bre_online_ticket_path: String,
    pub auth_enabled: bool,
    pub online_row_policy: OnlineRowPolicy,
    /// Verbose message-stream logging.
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            amqp: AmqpConfig::from_env(),
            user_service: ServiceEndpoint::from_env("USER_SERVICE", 3000),
            recommendation_service: ServiceEndpoint::from_env("RECOMMENDATION_SERVICE", 3001),
            http_client: HttpClientConfig::from_env(),
            http_port: env_parse("HTTP_SERVER_PORT", 9000),
            request_timeout: Duration::from_secs(env_parse("HTTP_SERVER_REQUEST_TIMEOUT", 30)),
            bre_online_ticket_path: env_or("BRE_ONLINE_TICKET_PATH", DEFAULT_BRE_PATH.to_string()),
            auth_enabled: env_parse("AUTH_ENABLED", false),
            online_row_policy: env_parse("ONLINE_ROW_POLICY", OnlineRowPolicy::default()),
            production: env_parse("PRODUCTION", false),
        }
    }
}

pub(crate) fn env_or(key: &str, default: String) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default,
    }
}

/// Parses `key`, falling back to `default` when unset or malformed.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "Config: invalid value, using default");
                default
            }
        },
        _ => default,
    }
}
