//! Payment callback reconciliation
//!
//! Turns whatever the gateway posts at us into at most one status transition
//! per donation. The database row is the arbiter: terminal states absorb
//! duplicate deliveries, and completion side effects run only after the
//! transition has been persisted. Side effects are isolated; a failing
//! email or counter update never turns a processed callback into an error.

use crate::config::OrganizationConfig;
use crate::database::donation_event_repository::{DonationEventRepository, DonationEventType};
use crate::database::donation_repository::{Donation, DonationRepository};
use crate::database::error::DatabaseError;
use crate::database::project_repository::{Project, ProjectRepository};
use crate::gateway::toyyibpay::{failure_reason, map_payment_status};
use crate::gateway::types::PaymentState;
use crate::services::callback::{parse_callback_payload, CallbackFields};
use crate::services::lifecycle::{transition, DonationStatus, LifecycleEvent, SideEffect};
use crate::services::notification::NotificationService;
use crate::services::receipt::{ReceiptError, ReceiptService};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// How many receipt numbers to try before giving up on a collision.
const RECEIPT_NUMBER_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("Missing payment reference")]
    MissingReference,

    #[error("Donation '{reference}' was not found")]
    UnknownDonation { reference: String },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<DatabaseError> for ReconciliationError {
    fn from(err: DatabaseError) -> Self {
        ReconciliationError::Database(err.to_string())
    }
}

/// What the gateway gets told about a processed callback.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub message: &'static str,
    pub status: DonationStatus,
}

/// Receipt number: prefix, four-digit year, six random alphanumerics.
pub fn generate_receipt_number(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("{}{}{}", prefix, Utc::now().format("%Y"), suffix)
}

pub struct ReconciliationService {
    donations: DonationRepository,
    projects: ProjectRepository,
    events: DonationEventRepository,
    receipts: Arc<ReceiptService>,
    notifications: Arc<NotificationService>,
    organization: OrganizationConfig,
}

impl ReconciliationService {
    pub fn new(
        donations: DonationRepository,
        projects: ProjectRepository,
        events: DonationEventRepository,
        receipts: Arc<ReceiptService>,
        notifications: Arc<NotificationService>,
        organization: OrganizationConfig,
    ) -> Self {
        Self {
            donations,
            projects,
            events,
            receipts,
            notifications,
            organization,
        }
    }

    /// Processes one gateway callback delivery end to end.
    pub async fn process_callback(
        &self,
        content_type: Option<&str>,
        body: &[u8],
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<CallbackOutcome, ReconciliationError> {
        let payload_map = parse_callback_payload(content_type, body);
        let fields = CallbackFields::from_map(&payload_map);

        // No reference, no lookup.
        let reference = fields
            .reference
            .clone()
            .ok_or(ReconciliationError::MissingReference)?;

        let donation = self
            .donations
            .find_by_reference(&reference)
            .await?
            .ok_or_else(|| ReconciliationError::UnknownDonation {
                reference: reference.clone(),
            })?;

        // Every delivery leaves a trace, before any state decision.
        let raw_payload =
            serde_json::to_value(&payload_map).unwrap_or(serde_json::Value::Null);
        self.append_event(
            &donation,
            DonationEventType::CallbackReceived,
            raw_payload,
            ip_address,
            user_agent,
        )
        .await;

        let current =
            DonationStatus::from_db_status(&donation.status).unwrap_or(DonationStatus::Pending);
        if current.is_terminal() {
            info!(reference = %reference, status = %current, "callback on settled donation ignored");
            return Ok(CallbackOutcome {
                message: "Already processed",
                status: current,
            });
        }

        let state = map_payment_status(fields.status.as_deref().unwrap_or(""));
        let event = match state {
            PaymentState::Completed => LifecycleEvent::CallbackCompleted,
            PaymentState::Failed => LifecycleEvent::CallbackFailed,
            PaymentState::Pending => LifecycleEvent::CallbackPending,
        };
        let outcome = transition(current, event);

        let mut completed_at = None;
        let mut receipt_number = None;
        let mut failure = None;
        for effect in &outcome.effects {
            match effect {
                SideEffect::AssignReceiptNumber => {
                    completed_at = Some(Utc::now());
                    receipt_number =
                        Some(generate_receipt_number(&self.organization.receipt_prefix));
                }
                SideEffect::RecordFailureReason => {
                    failure = Some(failure_reason(fields.reason.as_deref()));
                }
                _ => {}
            }
        }

        // One conditional statement carries the whole transition. Receipt
        // numbers are random, so a collision gets a fresh number and another
        // try rather than an error.
        let mut attempts_left = if receipt_number.is_some() {
            RECEIPT_NUMBER_ATTEMPTS
        } else {
            1
        };
        let updated = loop {
            let result = self
                .donations
                .apply_status_update(
                    donation.id,
                    outcome.next.to_db_status(),
                    fields.transaction_id.as_deref(),
                    completed_at,
                    receipt_number.as_deref(),
                    failure.as_deref(),
                )
                .await;

            match result {
                Ok(row) => break row,
                Err(e) if e.is_unique_violation() && receipt_number.is_some() && attempts_left > 1 =>
                {
                    attempts_left -= 1;
                    warn!(reference = %reference, "receipt number collision, regenerating");
                    receipt_number =
                        Some(generate_receipt_number(&self.organization.receipt_prefix));
                }
                Err(e) => return Err(ReconciliationError::Database(e.to_string())),
            }
        };

        let updated = match updated {
            Some(updated) => updated,
            None => {
                // A concurrent delivery settled the donation between our read
                // and the update. Report its final word.
                let fresh = self
                    .donations
                    .find_by_reference(&reference)
                    .await?
                    .ok_or_else(|| ReconciliationError::UnknownDonation {
                        reference: reference.clone(),
                    })?;
                let status = DonationStatus::from_db_status(&fresh.status)
                    .unwrap_or(DonationStatus::Pending);
                info!(reference = %reference, status = %status, "callback lost the race to a settled state");
                return Ok(CallbackOutcome {
                    message: "Already processed",
                    status,
                });
            }
        };

        self.append_event(
            &updated,
            DonationEventType::StatusUpdated,
            json!({
                "previous_status": current.to_db_status(),
                "new_status": outcome.next.to_db_status(),
                "reason": failure,
                "transaction_id": fields.transaction_id,
                "receipt_number": updated.receipt_number,
            }),
            ip_address,
            user_agent,
        )
        .await;

        info!(
            reference = %reference,
            previous_status = %current,
            new_status = %outcome.next,
            "callback reconciled"
        );

        if outcome.next == DonationStatus::Completed {
            self.run_completion_side_effects(&updated, &outcome.effects, ip_address, user_agent)
                .await;
        }

        let message = match outcome.next {
            DonationStatus::Completed => "Payment completed",
            DonationStatus::Failed => "Payment failed",
            DonationStatus::Pending => "Payment pending",
            DonationStatus::Refunded => "Already processed",
        };
        Ok(CallbackOutcome {
            message,
            status: outcome.next,
        })
    }

    /// Runs the post-completion side effects. Each is best-effort: failures
    /// are logged and recorded on the event trail, never propagated, and the
    /// already-persisted completion is never rolled back.
    async fn run_completion_side_effects(
        &self,
        donation: &Donation,
        effects: &[SideEffect],
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) {
        let project = self.load_project(donation).await;

        for effect in effects {
            match effect {
                SideEffect::IncrementProjectTotal => {
                    let Some(project_id) = donation.project_id else {
                        continue;
                    };
                    match self
                        .projects
                        .increment_raised(project_id, donation.amount)
                        .await
                    {
                        Ok(true) => {
                            info!(
                                reference = %donation.payment_reference,
                                project_id = %project_id,
                                amount = donation.amount,
                                "project raised total incremented"
                            );
                        }
                        Ok(false) => {
                            warn!(project_id = %project_id, "project missing, raised total not incremented");
                            self.record_side_effect_error(
                                donation,
                                "project_increment",
                                "project not found",
                                ip_address,
                                user_agent,
                            )
                            .await;
                        }
                        Err(e) => {
                            error!(project_id = %project_id, error = %e, "project increment failed");
                            self.record_side_effect_error(
                                donation,
                                "project_increment",
                                &e.to_string(),
                                ip_address,
                                user_agent,
                            )
                            .await;
                        }
                    }
                }
                SideEffect::NotifyAdmin => {
                    self.notifications
                        .notify_donation_completed(
                            donation,
                            project.as_ref().map(|p| p.title.as_str()),
                        )
                        .await;
                }
                SideEffect::SendReceiptEmail => {
                    match self.receipts.send_for_donation(donation).await {
                        Ok(email) => {
                            info!(reference = %donation.payment_reference, to = %email, "receipt email dispatched");
                        }
                        Err(ReceiptError::EmailMissing { .. }) => {
                            info!(reference = %donation.payment_reference, "no donor email, receipt email skipped");
                        }
                        // The receipt service has already recorded the
                        // failure on the event trail.
                        Err(e) => {
                            warn!(reference = %donation.payment_reference, error = %e, "receipt email failed");
                        }
                    }
                }
                SideEffect::AssignReceiptNumber
                | SideEffect::RecordFailureReason
                | SideEffect::ResetForRetry => {}
            }
        }
    }

    async fn load_project(&self, donation: &Donation) -> Option<Project> {
        let project_id = donation.project_id?;
        match self.projects.find_by_id(project_id).await {
            Ok(project) => project,
            Err(e) => {
                error!(project_id = %project_id, error = %e, "project lookup failed");
                None
            }
        }
    }

    async fn record_side_effect_error(
        &self,
        donation: &Donation,
        effect: &str,
        detail: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) {
        self.append_event(
            donation,
            DonationEventType::SideEffectError,
            json!({
                "effect": effect,
                "error": detail,
            }),
            ip_address,
            user_agent,
        )
        .await;
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
            error!(reference = %donation.payment_reference, error = %e, "failed to append callback event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_number_has_prefix_year_and_suffix() {
        let number = generate_receipt_number("YIP");
        let year = Utc::now().format("%Y").to_string();

        assert!(number.starts_with(&format!("YIP{}", year)));
        let suffix = &number[3 + 4..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(suffix, suffix.to_uppercase());
    }

    #[test]
    fn receipt_numbers_are_not_repeating() {
        let a = generate_receipt_number("YIP");
        let b = generate_receipt_number("YIP");
        // Six random alphanumerics; a back-to-back collision would be a bug
        // in the generator rather than bad luck.
        assert_ne!(a, b);
    }
}
