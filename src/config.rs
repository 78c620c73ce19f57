//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub organization: OrganizationConfig,
    pub donations: DonationPolicyConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub run_migrations: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub enable_tracing: bool,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Organization identity used on receipts, bills and notifications
#[derive(Debug, Clone)]
pub struct OrganizationConfig {
    pub name: String,
    pub registration_no: Option<String>,
    pub address: String,
    pub email: String,
    pub phone: String,
    /// Receipt numbers: prefix + year + random suffix
    pub receipt_prefix: String,
    /// Payment references: prefix + random suffix
    pub reference_prefix: String,
    /// Public base URL for gateway return/callback links
    pub base_url: String,
}

/// Donation lifecycle policy knobs
#[derive(Debug, Clone)]
pub struct DonationPolicyConfig {
    /// Retry ceiling per donation
    pub max_payment_attempts: i32,
    /// Smallest accepted donation, in minor units
    pub min_amount: i64,
    /// Retry requests allowed per client per window
    pub retry_rate_limit: u32,
    pub retry_rate_window_secs: u64,
    /// Origins allowed to call the retry endpoint; empty disables the gate
    pub trusted_origins: Vec<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            organization: OrganizationConfig::from_env()?,
            donations: DonationPolicyConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.organization.validate()?;
        self.donations.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost,http://127.0.0.1".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
            run_migrations: env::var("RUN_MIGRATIONS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("RUN_MIGRATIONS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
            enable_tracing: env::var("ENABLE_TRACING")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ENABLE_TRACING".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl OrganizationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(OrganizationConfig {
            name: env::var("ORG_NAME").unwrap_or_else(|_| "Yayasan Ihsan Prihatin".to_string()),
            registration_no: env::var("ORG_REGISTRATION_NO").ok(),
            address: env::var("ORG_ADDRESS")
                .unwrap_or_else(|_| "Kuala Lumpur, Malaysia".to_string()),
            email: env::var("ORG_EMAIL").unwrap_or_else(|_| "info@yip.org.my".to_string()),
            phone: env::var("ORG_PHONE").unwrap_or_else(|_| "+60 3-0000 0000".to_string()),
            receipt_prefix: env::var("RECEIPT_PREFIX").unwrap_or_else(|_| "YIP".to_string()),
            reference_prefix: env::var("REFERENCE_PREFIX").unwrap_or_else(|_| "YIP".to_string()),
            base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "ORG_NAME cannot be empty".to_string(),
            ));
        }

        if self.receipt_prefix.is_empty()
            || !self.receipt_prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::InvalidValue(
                "RECEIPT_PREFIX must be non-empty alphanumeric".to_string(),
            ));
        }

        if self.reference_prefix.is_empty()
            || !self.reference_prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::InvalidValue(
                "REFERENCE_PREFIX must be non-empty alphanumeric".to_string(),
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PUBLIC_BASE_URL must be a valid URL".to_string(),
            ));
        }

        Ok(())
    }

    /// Callback URL the gateway posts payment results to
    pub fn callback_url(&self) -> String {
        format!(
            "{}/api/payments/callback",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Page the donor lands on after checkout
    pub fn return_url(&self, reference: &str) -> String {
        format!(
            "{}/donations/status?reference={}",
            self.base_url.trim_end_matches('/'),
            reference
        )
    }
}

impl DonationPolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DonationPolicyConfig {
            max_payment_attempts: env::var("DONATION_MAX_PAYMENT_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("DONATION_MAX_PAYMENT_ATTEMPTS".to_string())
                })?,
            min_amount: env::var("DONATION_MIN_AMOUNT")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DONATION_MIN_AMOUNT".to_string()))?,
            retry_rate_limit: env::var("DONATION_RETRY_RATE_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DONATION_RETRY_RATE_LIMIT".to_string()))?,
            retry_rate_window_secs: env::var("DONATION_RETRY_RATE_WINDOW_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("DONATION_RETRY_RATE_WINDOW_SECS".to_string())
                })?,
            trusted_origins: env::var("DONATION_TRUSTED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payment_attempts < 1 {
            return Err(ConfigError::InvalidValue(
                "DONATION_MAX_PAYMENT_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self.min_amount < 1 {
            return Err(ConfigError::InvalidValue(
                "DONATION_MIN_AMOUNT must be positive".to_string(),
            ));
        }

        if self.retry_rate_limit == 0 || self.retry_rate_window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "DONATION_RETRY_RATE_LIMIT and window must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: vec!["http://localhost".to_string()],
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Invalid port
            cors_allowed_origins: vec![],
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_donation_policy_defaults() {
        let config = DonationPolicyConfig {
            max_payment_attempts: 5,
            min_amount: 100,
            retry_rate_limit: 5,
            retry_rate_window_secs: 600,
            trusted_origins: vec![],
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_attempt_ceiling_rejected() {
        let config = DonationPolicyConfig {
            max_payment_attempts: 0,
            min_amount: 100,
            retry_rate_limit: 5,
            retry_rate_window_secs: 600,
            trusted_origins: vec![],
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_receipt_prefix_must_be_alphanumeric() {
        let mut config = OrganizationConfig {
            name: "Yayasan Ihsan Prihatin".to_string(),
            registration_no: None,
            address: "Kuala Lumpur, Malaysia".to_string(),
            email: "info@yip.org.my".to_string(),
            phone: "+60 3-0000 0000".to_string(),
            receipt_prefix: "YIP".to_string(),
            reference_prefix: "YIP".to_string(),
            base_url: "https://yip.org.my".to_string(),
        };
        assert!(config.validate().is_ok());

        config.receipt_prefix = "YIP-".to_string();
        assert!(config.validate().is_err());
    }
}
