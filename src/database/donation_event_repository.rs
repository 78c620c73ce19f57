use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::fmt;
use uuid::Uuid;

/// Audit event types recorded against a donation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationEventType {
    CallbackReceived,
    StatusUpdated,
    RetryInitiated,
    RetryError,
    ReceiptEmailSent,
    ReceiptEmailFailed,
    SideEffectError,
}

impl DonationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationEventType::CallbackReceived => "callback_received",
            DonationEventType::StatusUpdated => "status_updated",
            DonationEventType::RetryInitiated => "retry_initiated",
            DonationEventType::RetryError => "retry_error",
            DonationEventType::ReceiptEmailSent => "receipt_email_sent",
            DonationEventType::ReceiptEmailFailed => "receipt_email_failed",
            DonationEventType::SideEffectError => "side_effect_error",
        }
    }
}

impl fmt::Display for DonationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Donation event entity
///
/// Append-only. Rows are never updated or deleted; the log is the audit
/// trail operators read to diagnose gateway behaviour and absorbed failures.
#[derive(Debug, Clone, FromRow)]
pub struct DonationEvent {
    pub id: Uuid,
    pub donation_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Repository for the donation event log
#[derive(Clone)]
pub struct DonationEventRepository {
    pool: PgPool,
}

impl DonationEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one event
    pub async fn append(
        &self,
        donation_id: Uuid,
        event_type: DonationEventType,
        payload: serde_json::Value,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<DonationEvent, DatabaseError> {
        sqlx::query_as::<_, DonationEvent>(
            "INSERT INTO donation_events
             (donation_id, event_type, payload, ip_address, user_agent)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, donation_id, event_type, payload, ip_address,
                       user_agent, created_at",
        )
        .bind(donation_id)
        .bind(event_type.as_str())
        .bind(payload)
        .bind(ip_address)
        .bind(user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Find all events for a donation, oldest first
    pub async fn find_by_donation(
        &self,
        donation_id: Uuid,
    ) -> Result<Vec<DonationEvent>, DatabaseError> {
        sqlx::query_as::<_, DonationEvent>(
            "SELECT id, donation_id, event_type, payload, ip_address,
                    user_agent, created_at
             FROM donation_events
             WHERE donation_id = $1
             ORDER BY created_at ASC",
        )
        .bind(donation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Count events of one type for a donation
    pub async fn count_by_type(
        &self,
        donation_id: Uuid,
        event_type: DonationEventType,
    ) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM donation_events
             WHERE donation_id = $1 AND event_type = $2",
        )
        .bind(donation_id)
        .bind(event_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
