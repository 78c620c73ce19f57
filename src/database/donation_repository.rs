use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Donation entity
///
/// One row per logical donation. `payment_reference` is the stable external
/// identity; `gateway_bill_code` changes on every retry.
#[derive(Debug, Clone, FromRow)]
pub struct Donation {
    pub id: Uuid,
    pub payment_reference: String,
    pub amount: i64,
    pub currency: String,
    pub donor_name: String,
    pub donor_email: Option<String>,
    pub donor_phone: Option<String>,
    pub anonymous: bool,
    pub project_id: Option<Uuid>,
    pub status: String,
    pub gateway_bill_code: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub payment_attempts: i32,
    pub failure_reason: Option<String>,
    pub receipt_number: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub receipt_sent_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for managing donations
#[derive(Clone)]
pub struct DonationRepository {
    pool: PgPool,
}

impl DonationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new donation in `pending` with zero payment attempts
    #[allow(clippy::too_many_arguments)]
    pub async fn create_donation(
        &self,
        payment_reference: &str,
        amount: i64,
        currency: &str,
        donor_name: &str,
        donor_email: Option<&str>,
        donor_phone: Option<&str>,
        anonymous: bool,
        project_id: Option<Uuid>,
        gateway_bill_code: Option<&str>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Donation, DatabaseError> {
        sqlx::query_as::<_, Donation>(
            "INSERT INTO donations
             (payment_reference, amount, currency, donor_name, donor_email, donor_phone,
              anonymous, project_id, status, gateway_bill_code, ip_address, user_agent)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10, $11)
             RETURNING id, payment_reference, amount, currency, donor_name, donor_email,
                       donor_phone, anonymous, project_id, status, gateway_bill_code,
                       gateway_transaction_id, payment_attempts, failure_reason,
                       receipt_number, completed_at, receipt_sent_at, ip_address,
                       user_agent, created_at, updated_at",
        )
        .bind(payment_reference)
        .bind(amount)
        .bind(currency)
        .bind(donor_name)
        .bind(donor_email)
        .bind(donor_phone)
        .bind(anonymous)
        .bind(project_id)
        .bind(gateway_bill_code)
        .bind(ip_address)
        .bind(user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Find donation by payment reference
    pub async fn find_by_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<Donation>, DatabaseError> {
        sqlx::query_as::<_, Donation>(
            "SELECT id, payment_reference, amount, currency, donor_name, donor_email,
                    donor_phone, anonymous, project_id, status, gateway_bill_code,
                    gateway_transaction_id, payment_attempts, failure_reason,
                    receipt_number, completed_at, receipt_sent_at, ip_address,
                    user_agent, created_at, updated_at
             FROM donations
             WHERE payment_reference = $1",
        )
        .bind(payment_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Apply a callback status update as one conditional statement
    ///
    /// The `status NOT IN ('completed', 'refunded')` guard makes the database
    /// the arbiter of the absorbing states: a donation that already completed
    /// (possibly on a concurrent delivery) matches zero rows and the caller
    /// receives `None`, which it must treat as already-processed.
    ///
    /// `completed_at`, `receipt_number` and `failure_reason` are only written
    /// when provided; existing values are kept otherwise.
    pub async fn apply_status_update(
        &self,
        id: Uuid,
        status: &str,
        gateway_transaction_id: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
        receipt_number: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<Option<Donation>, DatabaseError> {
        sqlx::query_as::<_, Donation>(
            "UPDATE donations
             SET status = $2,
                 gateway_transaction_id = COALESCE($3, gateway_transaction_id),
                 completed_at = COALESCE($4, completed_at),
                 receipt_number = COALESCE($5, receipt_number),
                 failure_reason = COALESCE($6, failure_reason),
                 updated_at = NOW()
             WHERE id = $1 AND status NOT IN ('completed', 'refunded')
             RETURNING id, payment_reference, amount, currency, donor_name, donor_email,
                       donor_phone, anonymous, project_id, status, gateway_bill_code,
                       gateway_transaction_id, payment_attempts, failure_reason,
                       receipt_number, completed_at, receipt_sent_at, ip_address,
                       user_agent, created_at, updated_at",
        )
        .bind(id)
        .bind(status)
        .bind(gateway_transaction_id)
        .bind(completed_at)
        .bind(receipt_number)
        .bind(failure_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Point the donation at a fresh gateway bill as one conditional statement
    ///
    /// Increments `payment_attempts`, resets status to `pending`, clears the
    /// failure reason, and refreshes request audit fields. The guard enforces
    /// both the retryable states and the attempt ceiling; zero rows means a
    /// concurrent transition or exhausted attempts and the caller must
    /// re-check the donation instead of assuming success.
    pub async fn apply_retry_bill(
        &self,
        id: Uuid,
        gateway_bill_code: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        max_attempts: i32,
    ) -> Result<Option<Donation>, DatabaseError> {
        sqlx::query_as::<_, Donation>(
            "UPDATE donations
             SET gateway_bill_code = $2,
                 payment_attempts = payment_attempts + 1,
                 status = 'pending',
                 failure_reason = NULL,
                 ip_address = COALESCE($3, ip_address),
                 user_agent = COALESCE($4, user_agent),
                 updated_at = NOW()
             WHERE id = $1
               AND status IN ('pending', 'failed')
               AND payment_attempts < $5
             RETURNING id, payment_reference, amount, currency, donor_name, donor_email,
                       donor_phone, anonymous, project_id, status, gateway_bill_code,
                       gateway_transaction_id, payment_attempts, failure_reason,
                       receipt_number, completed_at, receipt_sent_at, ip_address,
                       user_agent, created_at, updated_at",
        )
        .bind(id)
        .bind(gateway_bill_code)
        .bind(ip_address)
        .bind(user_agent)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Record the receipt email delivery time, keeping the first timestamp
    pub async fn mark_receipt_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> Result<Donation, DatabaseError> {
        sqlx::query_as::<_, Donation>(
            "UPDATE donations
             SET receipt_sent_at = COALESCE(receipt_sent_at, $2), updated_at = NOW()
             WHERE id = $1
             RETURNING id, payment_reference, amount, currency, donor_name, donor_email,
                       donor_phone, anonymous, project_id, status, gateway_bill_code,
                       gateway_transaction_id, payment_attempts, failure_reason,
                       receipt_number, completed_at, receipt_sent_at, ip_address,
                       user_agent, created_at, updated_at",
        )
        .bind(id)
        .bind(sent_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
