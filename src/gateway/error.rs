use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Payment gateway is not configured")]
    NotConfigured,

    #[error("Invalid bill parameters: {message}")]
    InvalidParams {
        message: String,
        field: Option<String>,
    },

    #[error("Category creation failed: {message}")]
    CategoryCreateFailed { message: String },

    #[error("Bill creation failed: {message}")]
    BillCreateFailed { message: String },

    #[error("Gateway connection error: {message}")]
    ConnectionError { message: String },

    #[error("Unexpected gateway response: {message}")]
    UnexpectedResponse { message: String },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::NotConfigured => false,
            GatewayError::InvalidParams { .. } => false,
            GatewayError::CategoryCreateFailed { .. } => false,
            GatewayError::BillCreateFailed { .. } => false,
            GatewayError::ConnectionError { .. } => true,
            GatewayError::UnexpectedResponse { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            GatewayError::NotConfigured => 503,
            GatewayError::InvalidParams { .. } => 400,
            GatewayError::CategoryCreateFailed { .. } => 502,
            GatewayError::BillCreateFailed { .. } => 502,
            GatewayError::ConnectionError { .. } => 503,
            GatewayError::UnexpectedResponse { .. } => 502,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            GatewayError::NotConfigured => {
                "Online payment is temporarily unavailable. Please try again later".to_string()
            }
            GatewayError::InvalidParams { message, .. } => message.clone(),
            GatewayError::CategoryCreateFailed { .. } => {
                "Could not prepare the payment with our gateway. Please try again".to_string()
            }
            GatewayError::BillCreateFailed { .. } => {
                "Could not create the payment with our gateway. Please try again".to_string()
            }
            GatewayError::ConnectionError { .. } => {
                "Payment gateway is temporarily unavailable. Please try again".to_string()
            }
            GatewayError::UnexpectedResponse { .. } => {
                "Payment gateway returned an unexpected response. Please try again".to_string()
            }
        }
    }
}

impl From<GatewayError> for crate::error::AppError {
    fn from(err: GatewayError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, InfrastructureError};

        let kind = match &err {
            GatewayError::NotConfigured => {
                AppErrorKind::Infrastructure(InfrastructureError::Configuration {
                    message: err.to_string(),
                })
            }
            _ => AppErrorKind::External(ExternalError::Gateway {
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            }),
        };

        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            GatewayError::InvalidParams {
                message: "bill name too long".to_string(),
                field: Some("bill_name".to_string())
            }
            .http_status_code(),
            400
        );
        assert_eq!(GatewayError::NotConfigured.http_status_code(), 503);
        assert_eq!(
            GatewayError::BillCreateFailed {
                message: "[FALSE]".to_string()
            }
            .http_status_code(),
            502
        );
    }

    #[test]
    fn retryable_flags_are_set() {
        assert!(GatewayError::ConnectionError {
            message: "connect timed out".to_string()
        }
        .is_retryable());
        assert!(!GatewayError::InvalidParams {
            message: "amount below minimum".to_string(),
            field: Some("amount".to_string())
        }
        .is_retryable());
        assert!(!GatewayError::UnexpectedResponse {
            message: "not json".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn user_messages_hide_raw_gateway_detail() {
        let err = GatewayError::CategoryCreateFailed {
            message: "[KEY-DID-NOT-EXIST]".to_string(),
        };
        assert!(!err.user_message().contains("KEY-DID-NOT-EXIST"));
    }
}
