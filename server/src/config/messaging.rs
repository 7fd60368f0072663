use reqwest::Url;

use super::{env_or, env_parse};
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    /// Empty means the broker's default exchange.
    pub exchange_name: String,
    pub prefetch: u16,
}

impl AmqpConfig {
    pub fn from_env() -> Self {
        Self {
            username: env_or("AMQP_USER", "guest".to_string()),
            password: env_or("AMQP_PASS", "guest".to_string()),
            host: env_or("AMQP_HOST", "localhost".to_string()),
            port: env_parse("AMQP_PORT", 5672),
            ssl: env_parse("AMQP_SSL", false),
            exchange_name: std::env::var("AMQP_EXCHANGE_NAME").unwrap_or_default(),
            prefetch: env_parse("AMQP_PREFETCH", 10),
        }
    }

    /// Connection URI with credentials percent-encoded.
    pub fn uri(&self) -> AppResult<String> {
        let scheme = if self.ssl { "amqps" } else { "amqp" };
        let mut url = Url::parse(&format!("{scheme}://{}:{}/", self.host, self.port))
            .map_err(|e| AppError::internal(format!("invalid AMQP host: {e}")))?;
        url.set_username(&self.username)
            .map_err(|_| AppError::internal("invalid AMQP username"))?;
        url.set_password(Some(&self.password))
            .map_err(|_| AppError::internal("invalid AMQP password"))?;
        Ok(url.to_string())
    }
}
