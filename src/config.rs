//! Process configuration, read once from the environment at startup.
//!
//! A `.env` file in the working directory is loaded first when present, so
//! local development does not need exported variables.

use std::env;
use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,
    pub log_dir: String,
    pub data_dir: String,

    pub jwt_secret: String,
    pub jwt_expiration: Duration,
    pub bcrypt_cost: u32,

    pub cors_allowed_origins: Vec<String>,

    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub frontend_url: String,
}

impl Config {
    /// Load `.env` (if any) and build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_err() {
            // Not an error: production deployments export variables directly.
            tracing::debug!("no .env file found, using process environment");
        }

        let jwt_hours: i64 = parse_var("JWT_EXPIRATION_HOURS", 24)?;

        Ok(Self {
            server_port: parse_var("SERVER_PORT", 8080)?,
            environment: var_or("ENVIRONMENT", "development"),
            log_level: var_or("LOG_LEVEL", "info"),
            log_dir: var_or("LOG_DIR", "logs"),
            data_dir: var_or("DATA_DIR", "sponsorship_data"),

            jwt_secret: var_or("JWT_SECRET", "dev-secret-key"),
            jwt_expiration: Duration::hours(jwt_hours),
            bcrypt_cost: parse_var("BCRYPT_COST", bcrypt::DEFAULT_COST)?,

            cors_allowed_origins: split_list(&var_or(
                "CORS_ALLOWED_ORIGINS",
                "http://localhost:3000,http://localhost:3001",
            )),

            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok().filter(|k| !k.is_empty()),
            stripe_api_base: var_or("STRIPE_API_BASE", "https://api.stripe.com"),
            frontend_url: var_or("FRONTEND_URL", "http://localhost:3000"),
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_port", &self.server_port)
            .field("environment", &self.environment)
            .field("log_level", &self.log_level)
            .field("log_dir", &self.log_dir)
            .field("data_dir", &self.data_dir)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expiration", &self.jwt_expiration)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("stripe_secret_key", &self.stripe_secret_key.as_ref().map(|_| "<redacted>"))
            .field("stripe_api_base", &self.stripe_api_base)
            .field("frontend_url", &self.frontend_url)
            .finish()
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
