use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub breaker_failure_threshold: u32,
    pub breaker_open_timeout_secs: u64,
    pub retry_base_delay_secs: u64,
    pub retry_max_attempts: u32,
    pub adapter_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            breaker_failure_threshold: env::var("BREAKER_FAILURE_THRESHOLD")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            breaker_open_timeout_secs: env::var("BREAKER_OPEN_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            retry_base_delay_secs: env::var("RETRY_BASE_DELAY_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            retry_max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            adapter_timeout_secs: env::var("ADAPTER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        })
    }
}
