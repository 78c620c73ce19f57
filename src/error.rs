//! Unified error handling for the donation backend
//!
//! This module provides a single error envelope with HTTP status mapping,
//! donor-safe messages, and structured error codes for client handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic client handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "DONATION_NOT_FOUND")]
    DonationNotFound,
    #[serde(rename = "PROJECT_NOT_FOUND")]
    ProjectNotFound,
    #[serde(rename = "ALREADY_COMPLETED")]
    AlreadyCompleted,
    #[serde(rename = "ALREADY_REFUNDED")]
    AlreadyRefunded,
    #[serde(rename = "MAX_ATTEMPTS_EXCEEDED")]
    MaxAttemptsExceeded,
    #[serde(rename = "RECEIPT_NOT_READY")]
    ReceiptNotReady,
    #[serde(rename = "DONOR_EMAIL_MISSING")]
    DonorEmailMissing,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 503, 504)
    #[serde(rename = "PAYMENT_GATEWAY_ERROR")]
    PaymentGatewayError,
    #[serde(rename = "MAIL_ERROR")]
    MailError,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimitError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business rule errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// No donation matches the given payment reference
    DonationNotFound { reference: String },
    /// Referenced fundraising project doesn't exist
    ProjectNotFound { project_id: String },
    /// Donation already reached `completed`; no retry is ever permitted
    AlreadyCompleted { reference: String },
    /// Donation was refunded; no retry is ever permitted
    AlreadyRefunded { reference: String },
    /// Retry ceiling reached for this donation
    MaxAttemptsExceeded {
        reference: String,
        attempts: i32,
        limit: i32,
    },
    /// Donation has no receipt number yet (not completed)
    ReceiptNotReady { reference: String },
    /// Donation has no donor email on file
    DonorEmailMissing { reference: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// External service errors (payment gateway, mail provider)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Payment gateway rejected a request or returned an unusable response
    Gateway { message: String, is_retryable: bool },
    /// Mail provider failure
    Mail { message: String },
    /// Rate limit exceeded
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    /// External service timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Required field missing
    MissingField { field: String },
    /// Invalid amount (format or value)
    InvalidAmount { amount: String, reason: String },
    /// Unsupported or malformed currency code
    InvalidCurrency { currency: String, reason: String },
    /// Malformed email address
    InvalidEmail { email: String },
    /// Field value out of acceptable range
    OutOfRange {
        field: String,
        min: Option<String>,
        max: Option<String>,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField { field } => {
                write!(f, "Required field '{}' is missing", field)
            }
            ValidationError::InvalidAmount { amount, reason } => {
                write!(f, "Invalid amount '{}': {}", amount, reason)
            }
            ValidationError::InvalidCurrency { currency, reason } => {
                write!(f, "Invalid currency '{}': {}", currency, reason)
            }
            ValidationError::InvalidEmail { email } => {
                write!(f, "Invalid email address '{}'", email)
            }
            ValidationError::OutOfRange { field, min, max } => match (min, max) {
                (Some(min), Some(max)) => {
                    write!(f, "Field '{}' must be between {} and {}", field, min, max)
                }
                (Some(min), None) => {
                    write!(f, "Field '{}' must be at least {}", field, min)
                }
                (None, Some(max)) => {
                    write!(f, "Field '{}' must be at most {}", field, max)
                }
                (None, None) => {
                    write!(f, "Field '{}' is out of acceptable range", field)
                }
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DonationNotFound { .. } => 404,
                DomainError::ProjectNotFound { .. } => 404,
                DomainError::AlreadyCompleted { .. } => 400,
                DomainError::AlreadyRefunded { .. } => 400,
                DomainError::MaxAttemptsExceeded { .. } => 400,
                DomainError::ReceiptNotReady { .. } => 400,
                DomainError::DonorEmailMissing { .. } => 400,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => 502, // Bad Gateway
                ExternalError::Mail { .. } => 502,
                ExternalError::RateLimit { .. } => 429, // Too Many Requests
                ExternalError::Timeout { .. } => 504,   // Gateway Timeout
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { .. } => 400,
                ValidationError::InvalidAmount { .. } => 400,
                ValidationError::InvalidCurrency { .. } => 400,
                ValidationError::InvalidEmail { .. } => 400,
                ValidationError::OutOfRange { .. } => 400,
            },
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DonationNotFound { .. } => ErrorCode::DonationNotFound,
                DomainError::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
                DomainError::AlreadyCompleted { .. } => ErrorCode::AlreadyCompleted,
                DomainError::AlreadyRefunded { .. } => ErrorCode::AlreadyRefunded,
                DomainError::MaxAttemptsExceeded { .. } => ErrorCode::MaxAttemptsExceeded,
                DomainError::ReceiptNotReady { .. } => ErrorCode::ReceiptNotReady,
                DomainError::DonorEmailMissing { .. } => ErrorCode::DonorEmailMissing,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => ErrorCode::PaymentGatewayError,
                ExternalError::Mail { .. } => ErrorCode::MailError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimitError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get donor-presentable error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DonationNotFound { reference } => {
                    format!("Donation '{}' not found", reference)
                }
                DomainError::ProjectNotFound { project_id } => {
                    format!("Project '{}' not found", project_id)
                }
                DomainError::AlreadyCompleted { reference } => {
                    format!(
                        "Donation '{}' has already been completed. Thank you for your support",
                        reference
                    )
                }
                DomainError::AlreadyRefunded { reference } => {
                    format!(
                        "Donation '{}' has been refunded and cannot be retried",
                        reference
                    )
                }
                DomainError::MaxAttemptsExceeded {
                    reference,
                    attempts,
                    limit,
                } => {
                    format!(
                        "Donation '{}' has reached the maximum of {} payment attempts ({} recorded). Please start a new donation",
                        reference, limit, attempts
                    )
                }
                DomainError::ReceiptNotReady { reference } => {
                    format!(
                        "A receipt for donation '{}' is not available yet because the payment has not completed",
                        reference
                    )
                }
                DomainError::DonorEmailMissing { reference } => {
                    format!("Donation '{}' has no donor email on file", reference)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { is_retryable, .. } => {
                    if *is_retryable {
                        "Payment gateway is temporarily unavailable. Please try again".to_string()
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::Mail { .. } => {
                    "Receipt email could not be sent. Please try again later".to_string()
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => {
                    if let Some(secs) = retry_after {
                        format!(
                            "Rate limit exceeded for {}. Please try again in {} seconds",
                            service, secs
                        )
                    } else {
                        format!("Rate limit exceeded for {}. Please try again later", service)
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidCurrency { currency, reason } => {
                    format!("Invalid currency '{}': {}", currency, reason)
                }
                ValidationError::InvalidEmail { email } => {
                    format!("Invalid email address '{}'", email)
                }
                ValidationError::OutOfRange { field, min, max } => match (min, max) {
                    (Some(min), Some(max)) => {
                        format!("Field '{}' must be between {} and {}", field, min, max)
                    }
                    (Some(min), None) => {
                        format!("Field '{}' must be at least {}", field, min)
                    }
                    (None, Some(max)) => {
                        format!("Field '{}' must be at most {}", field, max)
                    }
                    (None, None) => {
                        format!("Field '{}' is out of acceptable range", field)
                    }
                },
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { is_retryable, .. } => *is_retryable,
                ExternalError::Mail { .. } => true,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// Conversions from subsystem error types live with their subsystems to avoid
// circular dependencies: database/error.rs, gateway/error.rs, services/mailer.rs.

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_donation_not_found_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::DonationNotFound {
            reference: "YIP-404NF".to_string(),
        }));

        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::DonationNotFound);
        assert!(error.user_message().contains("YIP-404NF"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_max_attempts_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::MaxAttemptsExceeded {
            reference: "YIP-MAXED".to_string(),
            attempts: 5,
            limit: 5,
        }));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::MaxAttemptsExceeded);
        assert!(error.user_message().contains("maximum of 5"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_gateway_error_messages() {
        let transient = AppError::new(AppErrorKind::External(ExternalError::Gateway {
            message: "connect timed out".to_string(),
            is_retryable: true,
        }));
        assert_eq!(transient.status_code(), 502);
        assert!(transient.is_retryable());
        assert!(transient.user_message().contains("temporarily unavailable"));

        let terminal = AppError::new(AppErrorKind::External(ExternalError::Gateway {
            message: "invalid secret key".to_string(),
            is_retryable: false,
        }));
        assert!(!terminal.is_retryable());
        // Raw provider detail never reaches the donor-facing message.
        assert!(!terminal.user_message().contains("secret key"));
    }

    #[test]
    fn test_rate_limit_error() {
        let error = AppError::new(AppErrorKind::External(ExternalError::RateLimit {
            service: "donation retry".to_string(),
            retry_after: Some(60),
        }));

        assert_eq!(error.status_code(), 429);
        assert_eq!(error.error_code(), ErrorCode::RateLimitError);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_validation_error() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
            amount: "-100".to_string(),
            reason: "Amount cannot be negative".to_string(),
        }));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
        assert!(!error.is_retryable());
    }
}
