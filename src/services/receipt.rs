//! Donation receipt generation and delivery
//!
//! One view model feeds every receipt surface: the browser download, the
//! donor resend endpoint, and the automatic email sent when a payment
//! completes. Rendering is a trait seam so the document format can change
//! without touching delivery.

use crate::config::OrganizationConfig;
use crate::database::donation_event_repository::{DonationEventRepository, DonationEventType};
use crate::database::donation_repository::{Donation, DonationRepository};
use crate::database::error::DatabaseError;
use crate::database::project_repository::ProjectRepository;
use crate::gateway::types::ANONYMOUS_PAYER_NAME;
use crate::services::mailer::{MailError, Mailer, OutboundEmail};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Display title used when a donation is not tied to a specific project.
pub const GENERAL_FUND_TITLE: &str = "General Fund";

#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("Donation '{reference}' was not found")]
    NotFound { reference: String },

    #[error("Donation '{reference}' has not completed, no receipt exists yet")]
    NotReady { reference: String },

    #[error("Donation '{reference}' has no donor email on file")]
    EmailMissing { reference: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Mail delivery failed: {message}")]
    Mail { message: String },
}

impl From<DatabaseError> for ReceiptError {
    fn from(err: DatabaseError) -> Self {
        ReceiptError::Database {
            message: err.to_string(),
        }
    }
}

impl From<ReceiptError> for crate::error::AppError {
    fn from(err: ReceiptError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, ExternalError, InfrastructureError};

        let kind = match err {
            ReceiptError::NotFound { reference } => {
                AppErrorKind::Domain(DomainError::DonationNotFound { reference })
            }
            ReceiptError::NotReady { reference } => {
                AppErrorKind::Domain(DomainError::ReceiptNotReady { reference })
            }
            ReceiptError::EmailMissing { reference } => {
                AppErrorKind::Domain(DomainError::DonorEmailMissing { reference })
            }
            ReceiptError::Database { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message,
                    is_retryable: false,
                })
            }
            ReceiptError::Mail { message } => {
                AppErrorKind::External(ExternalError::Mail { message })
            }
        };
        AppError::new(kind)
    }
}

/// Everything a rendered receipt needs, already display-formatted.
#[derive(Debug, Clone)]
pub struct ReceiptView {
    pub receipt_number: String,
    pub donor_display_name: String,
    pub amount_display: String,
    pub currency: String,
    pub project_title: String,
    pub payment_reference: String,
    pub completed_at: DateTime<Utc>,
    pub organization: OrganizationConfig,
}

#[derive(Debug, Clone)]
pub struct RenderedReceipt {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
}

pub trait ReceiptRenderer: Send + Sync {
    fn render(&self, view: &ReceiptView) -> RenderedReceipt;
}

/// Inline-styled HTML receipt, printable and safe to send as an email body.
pub struct HtmlReceiptRenderer;

impl ReceiptRenderer for HtmlReceiptRenderer {
    fn render(&self, view: &ReceiptView) -> RenderedReceipt {
        let org = &view.organization;
        let registration_line = org
            .registration_no
            .as_deref()
            .map(|no| format!("<div class=\"muted\">Registration No: {}</div>", no))
            .unwrap_or_default();

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Receipt {number}</title>
<style>
  body {{ font-family: Georgia, serif; color: #222; max-width: 640px; margin: 2em auto; }}
  .letterhead {{ border-bottom: 3px double #1a5632; padding-bottom: 1em; }}
  .letterhead h1 {{ margin: 0; color: #1a5632; font-size: 1.4em; }}
  .muted {{ color: #666; font-size: 0.85em; }}
  h2 {{ text-align: center; letter-spacing: 0.2em; font-size: 1em; margin: 2em 0 1em; }}
  table {{ width: 100%; border-collapse: collapse; }}
  td {{ padding: 0.5em 0; border-bottom: 1px solid #eee; }}
  td.label {{ color: #666; width: 40%; }}
  .amount {{ font-size: 1.3em; font-weight: bold; color: #1a5632; }}
  .footer {{ margin-top: 2.5em; font-size: 0.85em; color: #666; text-align: center; }}
</style>
</head>
<body>
<div class="letterhead">
  <h1>{org_name}</h1>
  {registration_line}
  <div class="muted">{address}</div>
  <div class="muted">{email} &middot; {phone}</div>
</div>
<h2>OFFICIAL DONATION RECEIPT</h2>
<table>
  <tr><td class="label">Receipt No</td><td>{number}</td></tr>
  <tr><td class="label">Date</td><td>{date}</td></tr>
  <tr><td class="label">Received From</td><td>{donor}</td></tr>
  <tr><td class="label">Amount</td><td class="amount">{amount}</td></tr>
  <tr><td class="label">For</td><td>{project}</td></tr>
  <tr><td class="label">Payment Reference</td><td>{reference}</td></tr>
</table>
<div class="footer">
  Thank you for your generosity. This receipt was generated electronically
  and is valid without a signature.
</div>
</body>
</html>
"#,
            number = view.receipt_number,
            org_name = org.name,
            registration_line = registration_line,
            address = org.address,
            email = org.email,
            phone = org.phone,
            date = view.completed_at.format("%d %B %Y"),
            donor = view.donor_display_name,
            amount = view.amount_display,
            project = view.project_title,
            reference = view.payment_reference,
        );

        RenderedReceipt {
            bytes: html.into_bytes(),
            content_type: "text/html; charset=utf-8",
            filename: format!("{}.html", view.receipt_number),
        }
    }
}

/// Formats a minor-unit amount for display in major units.
pub fn format_amount(amount: i64, currency: &str) -> String {
    let symbol = match currency.to_uppercase().as_str() {
        "MYR" => "RM",
        other => return format!("{} {}.{:02}", other, amount / 100, (amount % 100).abs()),
    };
    format!("{} {}.{:02}", symbol, amount / 100, (amount % 100).abs())
}

pub struct ReceiptService {
    donations: DonationRepository,
    projects: ProjectRepository,
    events: DonationEventRepository,
    organization: OrganizationConfig,
    renderer: Arc<dyn ReceiptRenderer>,
    mailer: Arc<dyn Mailer>,
}

impl ReceiptService {
    pub fn new(
        donations: DonationRepository,
        projects: ProjectRepository,
        events: DonationEventRepository,
        organization: OrganizationConfig,
        renderer: Arc<dyn ReceiptRenderer>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            donations,
            projects,
            events,
            organization,
            renderer,
            mailer,
        }
    }

    /// Builds the receipt view for a completed donation.
    async fn build_view(&self, donation: &Donation) -> Result<ReceiptView, ReceiptError> {
        let (receipt_number, completed_at) = match (&donation.receipt_number, donation.completed_at)
        {
            (Some(number), Some(at)) => (number.clone(), at),
            _ => {
                return Err(ReceiptError::NotReady {
                    reference: donation.payment_reference.clone(),
                })
            }
        };

        let project_title = match donation.project_id {
            Some(project_id) => self
                .projects
                .find_by_id(project_id)
                .await?
                .map(|project| project.title)
                .unwrap_or_else(|| GENERAL_FUND_TITLE.to_string()),
            None => GENERAL_FUND_TITLE.to_string(),
        };

        let donor_display_name = if donation.anonymous {
            ANONYMOUS_PAYER_NAME.to_string()
        } else {
            donation.donor_name.clone()
        };

        Ok(ReceiptView {
            receipt_number,
            donor_display_name,
            amount_display: format_amount(donation.amount, &donation.currency),
            currency: donation.currency.clone(),
            project_title,
            payment_reference: donation.payment_reference.clone(),
            completed_at,
            organization: self.organization.clone(),
        })
    }

    /// Renders the downloadable receipt document for a payment reference.
    pub async fn download_by_reference(
        &self,
        reference: &str,
    ) -> Result<RenderedReceipt, ReceiptError> {
        let donation = self
            .donations
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| ReceiptError::NotFound {
                reference: reference.to_string(),
            })?;

        let view = self.build_view(&donation).await?;
        Ok(self.renderer.render(&view))
    }

    /// Emails the receipt to the donor and records the outcome on the
    /// donation's event trail. Returns the address the receipt went to.
    ///
    /// This is the single delivery path shared by the automatic send on
    /// completion and the donor-initiated resend.
    pub async fn send_for_donation(&self, donation: &Donation) -> Result<String, ReceiptError> {
        let email = donation
            .donor_email
            .clone()
            .filter(|address| !address.trim().is_empty())
            .ok_or_else(|| ReceiptError::EmailMissing {
                reference: donation.payment_reference.clone(),
            })?;

        let view = self.build_view(donation).await?;
        let rendered = self.renderer.render(&view);
        let html_body = String::from_utf8_lossy(&rendered.bytes).into_owned();

        let outcome = self
            .mailer
            .send(&OutboundEmail {
                to: email.clone(),
                to_name: if donation.anonymous {
                    None
                } else {
                    Some(donation.donor_name.clone())
                },
                subject: format!("Your donation receipt {}", view.receipt_number),
                html_body,
            })
            .await;

        match outcome {
            Ok(()) => {
                if let Err(e) = self
                    .donations
                    .mark_receipt_sent(donation.id, Utc::now())
                    .await
                {
                    error!(reference = %donation.payment_reference, error = %e, "failed to record receipt_sent_at");
                }
                self.append_event(
                    donation,
                    DonationEventType::ReceiptEmailSent,
                    json!({
                        "receipt_number": view.receipt_number,
                        "email": email,
                    }),
                )
                .await;
                info!(reference = %donation.payment_reference, receipt_number = %view.receipt_number, "receipt email sent");
                Ok(email)
            }
            Err(mail_error) => {
                self.append_event(
                    donation,
                    DonationEventType::ReceiptEmailFailed,
                    json!({
                        "receipt_number": view.receipt_number,
                        "email": email,
                        "error": mail_error.to_string(),
                    }),
                )
                .await;
                Err(map_mail_error(mail_error))
            }
        }
    }

    /// Donor-initiated resend by payment reference.
    pub async fn resend_by_reference(&self, reference: &str) -> Result<String, ReceiptError> {
        let donation = self
            .donations
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| ReceiptError::NotFound {
                reference: reference.to_string(),
            })?;

        self.send_for_donation(&donation).await
    }

    async fn append_event(
        &self,
        donation: &Donation,
        event_type: DonationEventType,
        payload: serde_json::Value,
    ) {
        if let Err(e) = self
            .events
            .append(donation.id, event_type, payload, None, None)
            .await
        {
            error!(reference = %donation.payment_reference, error = %e, "failed to append receipt event");
        }
    }
}

fn map_mail_error(err: MailError) -> ReceiptError {
    ReceiptError::Mail {
        message: err.to_string(),
    }
}
