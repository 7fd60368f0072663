use std::str::FromStr;
use std::time::Duration;

use super::{env_or, env_parse};

/// Default trip count of the threshold breaker when none is configured.
pub const DEFAULT_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerKind {
    Consecutive,
    ErrorRate,
    Threshold,
}

impl FromStr for BreakerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "consecutive" => BreakerKind::Consecutive,
            "error_rate" => BreakerKind::ErrorRate,
            // anything else falls through to the threshold breaker
            _ => BreakerKind::Threshold,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub kind: BreakerKind,
    pub consecutive_failures: u32,
    pub error_rate: f64,
    pub threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            kind: BreakerKind::Threshold,
            consecutive_failures: 5,
            error_rate: 0.5,
            threshold: DEFAULT_THRESHOLD,
            reset_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let threshold = match env_parse("HTTP_CLIENT_THRESHOLD", defaults.threshold) {
            0 => DEFAULT_THRESHOLD,
            n => n,
        };

        Self {
            timeout: Duration::from_secs(env_parse("HTTP_CLIENT_TIMEOUT", 5)),
            kind: env_or("HTTP_CLIENT_TYPE", "threshold".to_string())
                .parse()
                .unwrap_or(BreakerKind::Threshold),
            consecutive_failures: env_parse(
                "HTTP_CLIENT_CONSECUTIVE_FAILURES",
                defaults.consecutive_failures,
            ),
            error_rate: env_parse("HTTP_CLIENT_ERROR_RATE", defaults.error_rate),
            threshold,
            reset_timeout: Duration::from_secs(env_parse("HTTP_CLIENT_RESET_TIMEOUT", 10)),
        }
    }
}
