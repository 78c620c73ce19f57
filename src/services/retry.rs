//! Donor-initiated payment retry
//!
//! A retry never creates a new donation. It issues a fresh gateway bill for
//! the same payment reference, bumps the attempt counter, and points the
//! donor at the new checkout URL. The guards run in a fixed order so callers
//! always get the most specific refusal.

use crate::config::OrganizationConfig;
use crate::database::donation_event_repository::{DonationEventRepository, DonationEventType};
use crate::database::donation_repository::{Donation, DonationRepository};
use crate::database::error::DatabaseError;
use crate::database::project_repository::ProjectRepository;
use crate::gateway::error::GatewayError;
use crate::gateway::provider::BillingGateway;
use crate::gateway::types::{
    truncate_chars, CreateBillParams, PayorInfo, BILL_DESCRIPTION_MAX_CHARS, BILL_NAME_MAX_CHARS,
};
use crate::services::category::{CategoryError, CategoryService};
use crate::services::lifecycle::DonationStatus;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("Donation '{reference}' was not found")]
    NotFound { reference: String },

    #[error("Donation '{reference}' has already been completed")]
    AlreadyCompleted { reference: String },

    #[error("Donation '{reference}' has been refunded")]
    AlreadyRefunded { reference: String },

    #[error("Donation '{reference}' reached the maximum of {limit} payment attempts")]
    MaxAttemptsExceeded {
        reference: String,
        attempts: i32,
        limit: i32,
    },

    #[error("Payment gateway is not configured")]
    GatewayNotConfigured,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<DatabaseError> for RetryError {
    fn from(err: DatabaseError) -> Self {
        RetryError::Database(err.to_string())
    }
}

impl From<CategoryError> for RetryError {
    fn from(err: CategoryError) -> Self {
        match err {
            CategoryError::Gateway(gateway) => RetryError::Gateway(gateway),
            CategoryError::Database { message } => RetryError::Database(message),
        }
    }
}

impl From<RetryError> for crate::error::AppError {
    fn from(err: RetryError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError};

        match err {
            RetryError::NotFound { reference } => AppError::new(AppErrorKind::Domain(
                DomainError::DonationNotFound { reference },
            )),
            RetryError::AlreadyCompleted { reference } => AppError::new(AppErrorKind::Domain(
                DomainError::AlreadyCompleted { reference },
            )),
            RetryError::AlreadyRefunded { reference } => AppError::new(AppErrorKind::Domain(
                DomainError::AlreadyRefunded { reference },
            )),
            RetryError::MaxAttemptsExceeded {
                reference,
                attempts,
                limit,
            } => AppError::new(AppErrorKind::Domain(DomainError::MaxAttemptsExceeded {
                reference,
                attempts,
                limit,
            })),
            RetryError::GatewayNotConfigured => AppError::new(AppErrorKind::Infrastructure(
                InfrastructureError::Configuration {
                    message: "payment gateway is not configured".to_string(),
                },
            )),
            RetryError::Gateway(gateway) => gateway.into(),
            RetryError::Database(message) => AppError::new(AppErrorKind::Infrastructure(
                InfrastructureError::Database {
                    message,
                    is_retryable: false,
                },
            )),
        }
    }
}

/// What the donor gets back from a successful retry.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub redirect_url: String,
    pub attempt_number: i32,
    pub reference: String,
}

/// Pure eligibility check, ordered: terminal states first, then the attempt
/// ceiling. Runs before any gateway traffic so an exhausted donation never
/// costs a network call.
pub fn check_retry_allowed(donation: &Donation, max_attempts: i32) -> Result<(), RetryError> {
    let status =
        DonationStatus::from_db_status(&donation.status).unwrap_or(DonationStatus::Pending);

    match status {
        DonationStatus::Completed => {
            return Err(RetryError::AlreadyCompleted {
                reference: donation.payment_reference.clone(),
            })
        }
        DonationStatus::Refunded => {
            return Err(RetryError::AlreadyRefunded {
                reference: donation.payment_reference.clone(),
            })
        }
        DonationStatus::Pending | DonationStatus::Failed => {}
    }

    if donation.payment_attempts >= max_attempts {
        return Err(RetryError::MaxAttemptsExceeded {
            reference: donation.payment_reference.clone(),
            attempts: donation.payment_attempts,
            limit: max_attempts,
        });
    }

    Ok(())
}

/// Pure composition of the retry bill. The bill is visibly marked as a retry
/// and trimmed to the gateway's field limits; anonymous donors get the
/// generic payer name and no payor-info collection.
pub fn compose_retry_bill(
    donation: &Donation,
    category_code: String,
    attempt_number: i32,
    organization: &OrganizationConfig,
) -> CreateBillParams {
    let bill_name = truncate_chars(
        &format!("Retry {} {}", attempt_number, donation.payment_reference),
        BILL_NAME_MAX_CHARS,
    );
    let bill_description = truncate_chars(
        &format!(
            "Retry attempt {} for donation {}",
            attempt_number, donation.payment_reference
        ),
        BILL_DESCRIPTION_MAX_CHARS,
    );

    CreateBillParams {
        category_code,
        bill_name,
        bill_description,
        amount: donation.amount,
        reference: donation.payment_reference.clone(),
        return_url: organization.return_url(&donation.payment_reference),
        callback_url: organization.callback_url(),
        payor: PayorInfo::for_donor(
            &donation.donor_name,
            donation.donor_email.as_deref(),
            donation.donor_phone.as_deref(),
            donation.anonymous,
        ),
    }
}

pub struct RetryService {
    donations: DonationRepository,
    projects: ProjectRepository,
    events: DonationEventRepository,
    categories: Arc<CategoryService>,
    gateway: Arc<dyn BillingGateway>,
    organization: OrganizationConfig,
    max_attempts: i32,
}

impl RetryService {
    pub fn new(
        donations: DonationRepository,
        projects: ProjectRepository,
        events: DonationEventRepository,
        categories: Arc<CategoryService>,
        gateway: Arc<dyn BillingGateway>,
        organization: OrganizationConfig,
        max_attempts: i32,
    ) -> Self {
        Self {
            donations,
            projects,
            events,
            categories,
            gateway,
            organization,
            max_attempts,
        }
    }

    /// Initiates a fresh payment attempt for an existing donation.
    ///
    /// On gateway failure only a `retry_error` event is appended; the
    /// donation row keeps its previous bill code and attempt count, so a
    /// failed retry consumes nothing.
    pub async fn initiate_retry(
        &self,
        reference: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<RetryOutcome, RetryError> {
        let donation = self
            .donations
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| RetryError::NotFound {
                reference: reference.to_string(),
            })?;

        check_retry_allowed(&donation, self.max_attempts)?;

        if !self.gateway.is_configured() {
            return Err(RetryError::GatewayNotConfigured);
        }

        let project = match donation.project_id {
            Some(project_id) => self.projects.find_by_id(project_id).await?,
            None => None,
        };
        let category_code = self.categories.category_for_project(project.as_ref()).await?;

        let attempt_number = donation.payment_attempts + 1;
        let params = compose_retry_bill(
            &donation,
            category_code,
            attempt_number,
            &self.organization,
        );
        let previous_bill_code = donation.gateway_bill_code.clone();

        let bill_code = match self.gateway.create_bill(&params).await {
            Ok(code) => code,
            Err(gateway_error) => {
                warn!(
                    reference = %donation.payment_reference,
                    error = %gateway_error,
                    "retry bill creation failed"
                );
                self.append_event(
                    &donation,
                    DonationEventType::RetryError,
                    json!({
                        "attempt_number": attempt_number,
                        "error": gateway_error.to_string(),
                    }),
                    ip_address,
                    user_agent,
                )
                .await;
                return Err(RetryError::Gateway(gateway_error));
            }
        };

        let updated = self
            .donations
            .apply_retry_bill(donation.id, &bill_code, ip_address, user_agent, self.max_attempts)
            .await?;

        let updated = match updated {
            Some(updated) => updated,
            None => {
                // Raced with a callback or another retry between the check
                // and the update. Re-read and report the precise refusal.
                let fresh = self
                    .donations
                    .find_by_reference(reference)
                    .await?
                    .ok_or_else(|| RetryError::NotFound {
                        reference: reference.to_string(),
                    })?;
                check_retry_allowed(&fresh, self.max_attempts)?;
                return Err(RetryError::Database(
                    "donation changed while the retry was in flight".to_string(),
                ));
            }
        };

        self.append_event(
            &updated,
            DonationEventType::RetryInitiated,
            json!({
                "previous_bill_code": previous_bill_code,
                "new_bill_code": bill_code,
                "attempt_number": updated.payment_attempts,
            }),
            ip_address,
            user_agent,
        )
        .await;

        info!(
            reference = %updated.payment_reference,
            bill_code = %bill_code,
            attempt = updated.payment_attempts,
            "payment retry initiated"
        );

        Ok(RetryOutcome {
            redirect_url: self.gateway.payment_url(&bill_code),
            attempt_number: updated.payment_attempts,
            reference: updated.payment_reference,
        })
    }

    async fn append_event(
        &self,
        donation: &Donation,
        event_type: DonationEventType,
        payload: serde_json::Value,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) {
        if let Err(e) = self
            .events
            .append(donation.id, event_type, payload, ip_address, user_agent)
            .await
        {
            error!(reference = %donation.payment_reference, error = %e, "failed to append retry event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn donation(status: &str, attempts: i32) -> Donation {
        Donation {
            id: Uuid::new_v4(),
            payment_reference: "YIP-20260815-XYZ".to_string(),
            amount: 5000,
            currency: "MYR".to_string(),
            donor_name: "Aisyah Rahman".to_string(),
            donor_email: Some("aisyah@example.com".to_string()),
            donor_phone: Some("+60123456789".to_string()),
            anonymous: false,
            project_id: None,
            status: status.to_string(),
            gateway_bill_code: Some("oldbill".to_string()),
            gateway_transaction_id: None,
            payment_attempts: attempts,
            failure_reason: Some("declined".to_string()),
            receipt_number: None,
            completed_at: None,
            receipt_sent_at: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn organization() -> OrganizationConfig {
        OrganizationConfig {
            name: "Yayasan Ihsan Prihatin".to_string(),
            registration_no: None,
            address: "Kuala Lumpur, Malaysia".to_string(),
            email: "info@yip.org.my".to_string(),
            phone: "+60 3-0000 0000".to_string(),
            receipt_prefix: "YIP".to_string(),
            reference_prefix: "YIP".to_string(),
            base_url: "https://donate.yip.org.my".to_string(),
        }
    }

    #[test]
    fn retry_allowed_for_open_states_under_ceiling() {
        assert!(check_retry_allowed(&donation("pending", 0), 5).is_ok());
        assert!(check_retry_allowed(&donation("failed", 4), 5).is_ok());
    }

    #[test]
    fn completed_donation_is_rejected_first() {
        // Even with attempts exhausted, the terminal state wins the refusal.
        let err = check_retry_allowed(&donation("completed", 5), 5).unwrap_err();
        assert!(matches!(err, RetryError::AlreadyCompleted { .. }));
    }

    #[test]
    fn refunded_donation_is_rejected() {
        let err = check_retry_allowed(&donation("refunded", 1), 5).unwrap_err();
        assert!(matches!(err, RetryError::AlreadyRefunded { .. }));
    }

    #[test]
    fn attempt_ceiling_is_enforced() {
        let err = check_retry_allowed(&donation("failed", 5), 5).unwrap_err();
        match err {
            RetryError::MaxAttemptsExceeded {
                attempts, limit, ..
            } => {
                assert_eq!(attempts, 5);
                assert_eq!(limit, 5);
            }
            other => panic!("expected MaxAttemptsExceeded, got {:?}", other),
        }
    }

    #[test]
    fn retry_bill_is_marked_and_trimmed() {
        let params = compose_retry_bill(
            &donation("failed", 1),
            "cat123".to_string(),
            2,
            &organization(),
        );
        assert!(params.bill_name.starts_with("Retry 2"));
        assert!(params.bill_name.chars().count() <= BILL_NAME_MAX_CHARS);
        assert!(params.bill_description.chars().count() <= BILL_DESCRIPTION_MAX_CHARS);
        assert_eq!(params.amount, 5000);
        assert_eq!(params.reference, "YIP-20260815-XYZ");
        assert_eq!(
            params.callback_url,
            "https://donate.yip.org.my/api/payments/callback"
        );
        assert!(params.validate().is_ok());
    }

    #[test]
    fn anonymous_retry_forwards_no_identity() {
        let mut anon = donation("failed", 1);
        anon.anonymous = true;
        let params = compose_retry_bill(&anon, "cat123".to_string(), 2, &organization());
        assert!(params.payor.is_none());
        let serialized = serde_json::to_string(&params).expect("params serialize");
        assert!(!serialized.contains("Aisyah"));
        assert!(!serialized.contains("aisyah@example.com"));
        assert!(!serialized.contains("+60123456789"));
    }

    #[test]
    fn named_retry_carries_payor_details() {
        let params = compose_retry_bill(
            &donation("failed", 1),
            "cat123".to_string(),
            2,
            &organization(),
        );
        let payor = params.payor.expect("named donor should have payor block");
        assert_eq!(payor.name, "Aisyah Rahman");
        assert_eq!(payor.email.as_deref(), Some("aisyah@example.com"));
    }
}
