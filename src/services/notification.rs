//! Admin notifications for donation lifecycle moments

use crate::config::OrganizationConfig;
use crate::database::donation_repository::Donation;
use crate::services::mailer::{Mailer, OutboundEmail};
use crate::services::receipt::{format_amount, GENERAL_FUND_TITLE};
use std::sync::Arc;
use tracing::{info, warn};

/// A composed admin notice, independent of the delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminNotification {
    pub subject: String,
    pub html_body: String,
}

impl AdminNotification {
    /// Notice for a completed donation. Anonymous donors are reported without
    /// any identifying detail; amount, project and reference always appear.
    pub fn donation_completed(donation: &Donation, project_title: Option<&str>) -> Self {
        let amount = format_amount(donation.amount, &donation.currency);
        let project = project_title.unwrap_or(GENERAL_FUND_TITLE);

        let donor_line = if donation.anonymous {
            "<li>Donor: (anonymous)</li>".to_string()
        } else {
            format!("<li>Donor: {}</li>", donation.donor_name)
        };

        Self {
            subject: format!("Donation received: {} for {}", amount, project),
            html_body: format!(
                "<p>A donation has been completed.</p>\
                 <ul>\
                 {donor_line}\
                 <li>Amount: {amount}</li>\
                 <li>Project: {project}</li>\
                 <li>Reference: {reference}</li>\
                 <li>Attempts: {attempts}</li>\
                 </ul>",
                donor_line = donor_line,
                amount = amount,
                project = project,
                reference = donation.payment_reference,
                attempts = donation.payment_attempts,
            ),
        }
    }
}

pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
    admin_email: String,
    admin_name: String,
}

impl NotificationService {
    pub fn new(mailer: Arc<dyn Mailer>, organization: &OrganizationConfig) -> Self {
        Self {
            mailer,
            admin_email: organization.email.clone(),
            admin_name: organization.name.clone(),
        }
    }

    /// Best-effort delivery: failures are logged and swallowed so the payment
    /// flow that triggered the notice never observes them.
    pub async fn notify_donation_completed(
        &self,
        donation: &Donation,
        project_title: Option<&str>,
    ) {
        let notice = AdminNotification::donation_completed(donation, project_title);

        info!(
            reference = %donation.payment_reference,
            amount = donation.amount,
            currency = %donation.currency,
            anonymous = donation.anonymous,
            "🔔 NOTIFICATION: Donation Completed - {}", notice.subject
        );

        if !self.mailer.is_configured() {
            return;
        }

        let email = OutboundEmail {
            to: self.admin_email.clone(),
            to_name: Some(self.admin_name.clone()),
            subject: notice.subject,
            html_body: notice.html_body,
        };
        if let Err(e) = self.mailer.send(&email).await {
            warn!(reference = %donation.payment_reference, error = %e, "admin notification email failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn donation(anonymous: bool) -> Donation {
        Donation {
            id: Uuid::new_v4(),
            payment_reference: "YIP-20260815-XYZ".to_string(),
            amount: 5000,
            currency: "MYR".to_string(),
            donor_name: "Aisyah Rahman".to_string(),
            donor_email: Some("aisyah@example.com".to_string()),
            donor_phone: None,
            anonymous,
            project_id: None,
            status: "completed".to_string(),
            gateway_bill_code: Some("bill123".to_string()),
            gateway_transaction_id: Some("TXN-9".to_string()),
            payment_attempts: 1,
            failure_reason: None,
            receipt_number: Some("YIP2026ABC123".to_string()),
            completed_at: Some(Utc::now()),
            receipt_sent_at: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn named_donor_appears_in_notice() {
        let notice = AdminNotification::donation_completed(&donation(false), Some("Water Wells"));
        assert!(notice.html_body.contains("Aisyah Rahman"));
        assert!(notice.subject.contains("RM 50.00"));
        assert!(notice.subject.contains("Water Wells"));
    }

    #[test]
    fn anonymous_donor_is_never_named() {
        let notice = AdminNotification::donation_completed(&donation(true), None);
        assert!(!notice.html_body.contains("Aisyah"));
        assert!(!notice.html_body.contains("aisyah@example.com"));
        assert!(notice.html_body.contains("(anonymous)"));
        assert!(notice.subject.contains(GENERAL_FUND_TITLE));
    }

    #[test]
    fn notice_always_carries_reference_and_amount() {
        let notice = AdminNotification::donation_completed(&donation(true), None);
        assert!(notice.html_body.contains("YIP-20260815-XYZ"));
        assert!(notice.html_body.contains("RM 50.00"));
    }
}
