//! Database error classification
//!
//! Repositories return `DatabaseError` so callers can tell a constraint
//! violation from a connection failure without inspecting sqlx internals.

use std::fmt;

use crate::error::{AppError, AppErrorKind, InfrastructureError};

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    /// Query expected a row and found none
    NotFound,
    /// Unique index rejected the write
    UniqueViolation { constraint: Option<String> },
    /// Foreign key rejected the write
    ForeignKeyViolation { constraint: Option<String> },
    /// Pool exhausted, connection dropped, or TLS failure
    ConnectionFailed { message: String },
    /// Statement executed and the database rejected it
    QueryFailed { message: String },
    /// Anything sqlx reports that doesn't fit the kinds above
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    /// Classify an sqlx error into a domain-usable kind
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound,
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation => DatabaseErrorKind::UniqueViolation {
                    constraint: db.constraint().map(String::from),
                },
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    DatabaseErrorKind::ForeignKeyViolation {
                        constraint: db.constraint().map(String::from),
                    }
                }
                _ => DatabaseErrorKind::QueryFailed {
                    message: db.message().to_string(),
                },
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::ConnectionFailed {
                    message: err.to_string(),
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };

        Self { kind }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::NotFound)
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }

    /// Connection-level failures are worth retrying; constraint violations are not
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::ConnectionFailed { .. })
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::NotFound => write!(f, "record not found"),
            DatabaseErrorKind::UniqueViolation { constraint } => match constraint {
                Some(name) => write!(f, "unique constraint '{}' violated", name),
                None => write!(f, "unique constraint violated"),
            },
            DatabaseErrorKind::ForeignKeyViolation { constraint } => match constraint {
                Some(name) => write!(f, "foreign key constraint '{}' violated", name),
                None => write!(f, "foreign key constraint violated"),
            },
            DatabaseErrorKind::ConnectionFailed { message } => {
                write!(f, "database connection failed: {}", message)
            }
            DatabaseErrorKind::QueryFailed { message } => {
                write!(f, "database query failed: {}", message)
            }
            DatabaseErrorKind::Unknown { message } => {
                write!(f, "database error: {}", message)
            }
        }
    }
}

impl std::error::Error for DatabaseError {}

// Lives here rather than in error.rs so the database module stays self-contained.
impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let is_retryable = err.is_retryable();
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: err.to_string(),
            is_retryable,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_detection() {
        let err = DatabaseError::new(DatabaseErrorKind::UniqueViolation {
            constraint: Some("donations_receipt_number_key".to_string()),
        });

        assert!(err.is_unique_violation());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("donations_receipt_number_key"));
    }

    #[test]
    fn test_connection_failures_are_retryable() {
        let err = DatabaseError::new(DatabaseErrorKind::ConnectionFailed {
            message: "pool timed out".to_string(),
        });

        assert!(err.is_retryable());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_conversion_to_app_error() {
        let err = DatabaseError::new(DatabaseErrorKind::QueryFailed {
            message: "syntax error".to_string(),
        });
        let app: AppError = err.into();

        assert_eq!(app.status_code(), 500);
        assert_eq!(app.error_code(), crate::error::ErrorCode::DatabaseError);
        assert!(!app.is_retryable());
    }
}
