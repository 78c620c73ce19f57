//! Donation intent
//!
//! Turns a validated donor submission into a pending donation row plus its
//! first gateway bill. The generated payment reference is the stable key the
//! rest of the lifecycle (callbacks, retries, receipts) hangs off.

use crate::config::OrganizationConfig;
use crate::database::donation_repository::DonationRepository;
use crate::database::error::DatabaseError;
use crate::database::project_repository::{Project, ProjectRepository};
use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError, ValidationError};
use crate::gateway::provider::BillingGateway;
use crate::gateway::types::{truncate_chars, CreateBillParams, PayorInfo, ANONYMOUS_PAYER_NAME};
use crate::gateway::GatewayError;
use crate::services::category::{CategoryError, CategoryService};
use crate::services::receipt::GENERAL_FUND_TITLE;
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::gateway::types::{BILL_DESCRIPTION_MAX_CHARS, BILL_NAME_MAX_CHARS};

#[derive(Debug, Error)]
pub enum IntentError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Project '{project_id}' was not found")]
    ProjectNotFound { project_id: Uuid },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<DatabaseError> for IntentError {
    fn from(err: DatabaseError) -> Self {
        IntentError::Database(err.to_string())
    }
}

impl From<CategoryError> for IntentError {
    fn from(err: CategoryError) -> Self {
        match err {
            CategoryError::Gateway(gateway) => IntentError::Gateway(gateway),
            CategoryError::Database { message } => IntentError::Database(message),
        }
    }
}

impl From<IntentError> for AppError {
    fn from(err: IntentError) -> Self {
        match err {
            IntentError::Invalid(validation) => {
                AppError::new(AppErrorKind::Validation(validation))
            }
            IntentError::ProjectNotFound { project_id } => AppError::new(AppErrorKind::Domain(
                DomainError::ProjectNotFound {
                    project_id: project_id.to_string(),
                },
            )),
            IntentError::Gateway(gateway) => gateway.into(),
            IntentError::Database(message) => AppError::new(AppErrorKind::Infrastructure(
                InfrastructureError::Database {
                    message,
                    is_retryable: false,
                },
            )),
        }
    }
}

/// Donor submission as received on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationIntent {
    pub donor_name: Option<String>,
    pub donor_email: Option<String>,
    pub donor_phone: Option<String>,
    /// Minor units (sen).
    pub amount: i64,
    pub currency: Option<String>,
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub anonymous: bool,
}

/// Intent after validation and normalization.
#[derive(Debug, Clone)]
pub struct NormalizedIntent {
    pub donor_name: String,
    pub donor_email: Option<String>,
    pub donor_phone: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub project_id: Option<Uuid>,
    pub anonymous: bool,
}

impl DonationIntent {
    pub fn validate(&self, minimum_amount: i64) -> Result<NormalizedIntent, ValidationError> {
        let donor_name = self
            .donor_name
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        let donor_name = if donor_name.is_empty() {
            if !self.anonymous {
                return Err(ValidationError::MissingField {
                    field: "donorName".to_string(),
                });
            }
            ANONYMOUS_PAYER_NAME.to_string()
        } else {
            donor_name.to_string()
        };

        if self.amount < minimum_amount {
            return Err(ValidationError::InvalidAmount {
                amount: self.amount.to_string(),
                reason: format!("minimum donation is {} minor units", minimum_amount),
            });
        }

        let currency = self
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("MYR")
            .to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidCurrency {
                currency,
                reason: "must be a three-letter ISO code".to_string(),
            });
        }

        let donor_email = normalize_optional(self.donor_email.as_deref());
        if let Some(email) = &donor_email {
            if !is_plausible_email(email) {
                return Err(ValidationError::InvalidEmail {
                    email: email.clone(),
                });
            }
        }

        Ok(NormalizedIntent {
            donor_name,
            donor_email,
            donor_phone: normalize_optional(self.donor_phone.as_deref()),
            amount: self.amount,
            currency,
            project_id: self.project_id,
            anonymous: self.anonymous,
        })
    }
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_plausible_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !value.chars().any(char::is_whitespace)
}

/// Payment reference: org prefix, dash, ten random alphanumerics.
pub fn generate_payment_reference(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("{}-{}", prefix, suffix)
}

/// Bill request for the first payment attempt.
pub fn compose_intent_bill(
    intent: &NormalizedIntent,
    reference: &str,
    category_code: String,
    project_title: Option<&str>,
    organization: &OrganizationConfig,
) -> CreateBillParams {
    let target = project_title.unwrap_or(GENERAL_FUND_TITLE);
    CreateBillParams {
        category_code,
        bill_name: truncate_chars(&format!("Donation {}", reference), BILL_NAME_MAX_CHARS),
        bill_description: truncate_chars(
            &format!("Donation {} for {}", reference, target),
            BILL_DESCRIPTION_MAX_CHARS,
        ),
        amount: intent.amount,
        reference: reference.to_string(),
        return_url: organization.return_url(reference),
        callback_url: organization.callback_url(),
        payor: PayorInfo::for_donor(
            &intent.donor_name,
            intent.donor_email.as_deref(),
            intent.donor_phone.as_deref(),
            intent.anonymous,
        ),
    }
}

/// What the donor needs to start paying.
#[derive(Debug, Clone)]
pub struct IntentOutcome {
    pub reference: String,
    pub bill_code: String,
    pub redirect_url: String,
}

pub struct IntentService {
    donations: DonationRepository,
    projects: ProjectRepository,
    categories: Arc<CategoryService>,
    gateway: Arc<dyn BillingGateway>,
    organization: OrganizationConfig,
    minimum_amount: i64,
}

impl IntentService {
    pub fn new(
        donations: DonationRepository,
        projects: ProjectRepository,
        categories: Arc<CategoryService>,
        gateway: Arc<dyn BillingGateway>,
        organization: OrganizationConfig,
        minimum_amount: i64,
    ) -> Self {
        Self {
            donations,
            projects,
            categories,
            gateway,
            organization,
            minimum_amount,
        }
    }

    /// Creates the donation row and its first gateway bill.
    ///
    /// The bill is created before the insert so the stored row either has a
    /// usable bill code or does not exist at all. Attempts start at zero;
    /// the counter tracks retries, not the initial bill.
    pub async fn create_donation(
        &self,
        intent: DonationIntent,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<IntentOutcome, IntentError> {
        let normalized = intent.validate(self.minimum_amount)?;

        let project = self.resolve_project(normalized.project_id).await?;
        let category_code = self.categories.category_for_project(project.as_ref()).await?;
        let reference = generate_payment_reference(&self.organization.reference_prefix);

        let params = compose_intent_bill(
            &normalized,
            &reference,
            category_code,
            project.as_ref().map(|p| p.title.as_str()),
            &self.organization,
        );
        let bill_code = self.gateway.create_bill(&params).await?;

        let donation = self
            .donations
            .create_donation(
                &reference,
                normalized.amount,
                &normalized.currency,
                &normalized.donor_name,
                normalized.donor_email.as_deref(),
                normalized.donor_phone.as_deref(),
                normalized.anonymous,
                normalized.project_id,
                Some(&bill_code),
                ip_address,
                user_agent,
            )
            .await?;

        info!(
            reference = %donation.payment_reference,
            bill_code = %bill_code,
            amount = donation.amount,
            anonymous = donation.anonymous,
            "donation intent created"
        );

        Ok(IntentOutcome {
            redirect_url: self.gateway.payment_url(&bill_code),
            reference: donation.payment_reference,
            bill_code,
        })
    }

    async fn resolve_project(
        &self,
        project_id: Option<Uuid>,
    ) -> Result<Option<Project>, IntentError> {
        let Some(project_id) = project_id else {
            return Ok(None);
        };
        let project = self
            .projects
            .find_by_id(project_id)
            .await?
            .ok_or(IntentError::ProjectNotFound { project_id })?;
        Ok(Some(project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> DonationIntent {
        DonationIntent {
            donor_name: Some("Aminah binti Yusof".to_string()),
            donor_email: Some("aminah@example.com".to_string()),
            donor_phone: Some("+60123456789".to_string()),
            amount: 5000,
            currency: None,
            project_id: None,
            anonymous: false,
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
    fn validate_defaults_currency_to_myr() {
        let normalized = intent().validate(100).unwrap();
        assert_eq!(normalized.currency, "MYR");
        assert_eq!(normalized.donor_name, "Aminah binti Yusof");
    }

    #[test]
    fn validate_uppercases_currency() {
        let mut request = intent();
        request.currency = Some("usd".to_string());
        assert_eq!(request.validate(100).unwrap().currency, "USD");
    }

    #[test]
    fn validate_rejects_missing_name_for_named_donor() {
        let mut request = intent();
        request.donor_name = Some("   ".to_string());
        assert!(matches!(
            request.validate(100),
            Err(ValidationError::MissingField { .. })
        ));
    }

    #[test]
    fn validate_defaults_name_for_anonymous_donor() {
        let mut request = intent();
        request.donor_name = None;
        request.anonymous = true;
        let normalized = request.validate(100).unwrap();
        assert_eq!(normalized.donor_name, ANONYMOUS_PAYER_NAME);
    }

    #[test]
    fn validate_rejects_amount_below_minimum() {
        let mut request = intent();
        request.amount = 99;
        assert!(matches!(
            request.validate(100),
            Err(ValidationError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn validate_rejects_malformed_email() {
        let mut request = intent();
        request.donor_email = Some("not-an-email".to_string());
        assert!(matches!(
            request.validate(100),
            Err(ValidationError::InvalidEmail { .. })
        ));

        let mut request = intent();
        request.donor_email = Some("a b@example.com".to_string());
        assert!(request.validate(100).is_err());
    }

    #[test]
    fn validate_rejects_bad_currency() {
        let mut request = intent();
        request.currency = Some("RINGGIT".to_string());
        assert!(matches!(
            request.validate(100),
            Err(ValidationError::InvalidCurrency { .. })
        ));
    }

    #[test]
    fn payment_reference_has_prefix_and_suffix() {
        let reference = generate_payment_reference("YIP");
        assert!(reference.starts_with("YIP-"));
        let suffix = &reference["YIP-".len()..];
        assert_eq!(suffix.len(), 10);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn intent_bill_for_anonymous_donor_has_no_payor() {
        let mut request = intent();
        request.anonymous = true;
        let normalized = request.validate(100).unwrap();

        let params = compose_intent_bill(
            &normalized,
            "YIP-TEST123456",
            "CAT1".to_string(),
            None,
            &organization(),
        );

        assert!(params.payor.is_none());
        assert!(params.bill_description.contains(GENERAL_FUND_TITLE));
        let serialized = serde_json::to_string(&params).unwrap();
        assert!(!serialized.contains("Aminah"));
    }

    #[test]
    fn intent_bill_uses_project_title() {
        let normalized = intent().validate(100).unwrap();
        let params = compose_intent_bill(
            &normalized,
            "YIP-TEST123456",
            "CAT2".to_string(),
            Some("Orphan Care Fund"),
            &organization(),
        );

        assert!(params.bill_description.contains("Orphan Care Fund"));
        assert_eq!(params.category_code, "CAT2");
        assert!(params.payor.is_some());
    }
}
