use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::provider::BillingGateway;
use crate::gateway::types::{truncate_chars, CreateBillParams, PaymentState, ANONYMOUS_PAYER_NAME};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ToyyibPayConfig {
    /// Merchant secret key. Empty means the gateway is not configured; all
    /// billing operations then fail fast without a network call.
    pub secret_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ToyyibPayConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://toyyibpay.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ToyyibPayConfig {
    /// Missing credentials are tolerated here: the server must boot without
    /// them and report `is_configured() == false` instead.
    pub fn from_env() -> Self {
        Self {
            secret_key: std::env::var("TOYYIBPAY_SECRET_KEY").unwrap_or_default(),
            base_url: std::env::var("TOYYIBPAY_BASE_URL")
                .unwrap_or_else(|_| "https://toyyibpay.com".to_string()),
            timeout_secs: std::env::var("TOYYIBPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
        }
    }
}

pub struct ToyyibPayClient {
    config: ToyyibPayConfig,
    http: reqwest::Client,
}

impl ToyyibPayClient {
    pub fn new(config: ToyyibPayConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::ConnectionError {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> GatewayResult<Self> {
        Self::new(ToyyibPayConfig::from_env())
    }

    fn endpoint(&self, op: &str) -> String {
        format!(
            "{}/index.php/api/{}",
            self.config.base_url.trim_end_matches('/'),
            op
        )
    }

    fn secret(&self) -> GatewayResult<&str> {
        if self.config.secret_key.trim().is_empty() {
            return Err(GatewayError::NotConfigured);
        }
        Ok(&self.config.secret_key)
    }

    async fn post_form(&self, op: &str, form: &[(&str, String)]) -> GatewayResult<String> {
        let response = self
            .http
            .post(self.endpoint(op))
            .form(form)
            .send()
            .await
            .map_err(|e| GatewayError::ConnectionError {
                message: format!("gateway request failed: {}", e),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayError::UnexpectedResponse {
                message: format!("HTTP {}: {}", status, truncate_chars(&text, 200)),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl BillingGateway for ToyyibPayClient {
    fn is_configured(&self) -> bool {
        !self.config.secret_key.trim().is_empty()
    }

    async fn create_category(&self, name: &str, description: &str) -> GatewayResult<String> {
        let secret = self.secret()?.to_string();
        let form = vec![
            ("userSecretKey", secret),
            ("catname", name.to_string()),
            ("catdescription", description.to_string()),
        ];

        let text = self.post_form("createCategory", &form).await?;

        // On rejection the gateway answers 200 with a bare token such as
        // "[FALSE]" instead of the result rows.
        let rows: Vec<CategoryCreatedRow> =
            serde_json::from_str(&text).map_err(|_| GatewayError::CategoryCreateFailed {
                message: truncate_chars(&text, 200),
            })?;

        let code = rows
            .into_iter()
            .next()
            .map(|row| row.category_code)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| GatewayError::UnexpectedResponse {
                message: "category response contained no category code".to_string(),
            })?;

        info!(category_code = %code, "toyyibpay category created");
        Ok(code)
    }

    async fn create_bill(&self, params: &CreateBillParams) -> GatewayResult<String> {
        params.validate()?;
        let secret = self.secret()?.to_string();

        let (payor_info, bill_to, bill_email, bill_phone) = match &params.payor {
            Some(payor) => (
                "1".to_string(),
                payor.name.clone(),
                payor.email.clone().unwrap_or_default(),
                payor.phone.clone().unwrap_or_default(),
            ),
            None => (
                "0".to_string(),
                ANONYMOUS_PAYER_NAME.to_string(),
                String::new(),
                String::new(),
            ),
        };

        let form = vec![
            ("userSecretKey", secret),
            ("categoryCode", params.category_code.clone()),
            ("billName", params.bill_name.clone()),
            ("billDescription", params.bill_description.clone()),
            ("billPriceSetting", "1".to_string()),
            ("billPayorInfo", payor_info),
            ("billAmount", params.amount.to_string()),
            ("billReturnUrl", params.return_url.clone()),
            ("billCallbackUrl", params.callback_url.clone()),
            ("billExternalReferenceNo", params.reference.clone()),
            ("billTo", bill_to),
            ("billEmail", bill_email),
            ("billPhone", bill_phone),
            ("billPaymentChannel", "2".to_string()),
        ];

        let text = self.post_form("createBill", &form).await?;

        let rows: Vec<BillCreatedRow> =
            serde_json::from_str(&text).map_err(|_| GatewayError::BillCreateFailed {
                message: truncate_chars(&text, 200),
            })?;

        let code = rows
            .into_iter()
            .next()
            .map(|row| row.bill_code)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| GatewayError::UnexpectedResponse {
                message: "bill response contained no bill code".to_string(),
            })?;

        info!(bill_code = %code, reference = %params.reference, "toyyibpay bill created");
        Ok(code)
    }

    fn payment_url(&self, bill_code: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), bill_code)
    }
}

/// Maps a raw gateway status code or word to a canonical payment state.
///
/// Anything unrecognized, including the in-progress codes "2" and "99" and an
/// empty value, maps to `Pending`. Only an explicit success code may yield
/// `Completed`.
pub fn map_payment_status(raw: &str) -> PaymentState {
    match raw.trim().to_lowercase().as_str() {
        "1" | "success" | "paid" => PaymentState::Completed,
        "3" | "failed" | "cancelled" => PaymentState::Failed,
        _ => PaymentState::Pending,
    }
}

/// Donor-presentable failure reason for a failed payment callback.
///
/// Known gateway codes get a friendly message, unrecognized non-empty reasons
/// pass through unchanged, and a missing reason falls back to a generic one.
pub fn failure_reason(raw: Option<&str>) -> String {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return "Payment was not completed".to_string();
    }
    match raw.to_lowercase().as_str() {
        "insufficient_funds" | "insufficient funds" => {
            "Insufficient funds in the selected account".to_string()
        }
        "cancelled" | "user_cancelled" => "Payment was cancelled before completion".to_string(),
        "expired" | "session_expired" => {
            "The payment session expired before completion".to_string()
        }
        "declined" | "card_declined" => "The payment was declined by the issuing bank".to_string(),
        _ => raw.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct CategoryCreatedRow {
    #[serde(rename = "CategoryCode")]
    category_code: String,
}

#[derive(Debug, Deserialize)]
struct BillCreatedRow {
    #[serde(rename = "BillCode")]
    bill_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ToyyibPayClient {
        ToyyibPayClient::new(ToyyibPayConfig {
            secret_key: "sk_test".to_string(),
            base_url: "https://toyyibpay.com".to_string(),
            timeout_secs: 5,
        })
        .expect("client init should succeed")
    }

    fn unconfigured_client() -> ToyyibPayClient {
        ToyyibPayClient::new(ToyyibPayConfig::default()).expect("client init should succeed")
    }

    fn bill_params() -> CreateBillParams {
        CreateBillParams {
            category_code: "cat123".to_string(),
            bill_name: "Donation YIP-1".to_string(),
            bill_description: "General fund donation".to_string(),
            amount: 5000,
            reference: "YIP-1".to_string(),
            return_url: "https://donate.test/thanks".to_string(),
            callback_url: "https://donate.test/callback".to_string(),
            payor: None,
        }
    }

    #[test]
    fn configured_flag_follows_secret_key() {
        assert!(client().is_configured());
        assert!(!unconfigured_client().is_configured());
    }

    #[test]
    fn payment_url_appends_bill_code() {
        assert_eq!(
            client().payment_url("abc123"),
            "https://toyyibpay.com/abc123"
        );

        let trailing_slash = ToyyibPayClient::new(ToyyibPayConfig {
            secret_key: "sk_test".to_string(),
            base_url: "https://toyyibpay.com/".to_string(),
            timeout_secs: 5,
        })
        .expect("client init should succeed");
        assert_eq!(
            trailing_slash.payment_url("abc123"),
            "https://toyyibpay.com/abc123"
        );
    }

    #[tokio::test]
    async fn unconfigured_client_fails_before_any_network_call() {
        let result = unconfigured_client()
            .create_category("General Fund", "Donations")
            .await;
        assert!(matches!(result, Err(GatewayError::NotConfigured)));
    }

    #[tokio::test]
    async fn invalid_bill_params_fail_before_any_network_call() {
        let mut params = bill_params();
        params.amount = 50;
        let result = client().create_bill(&params).await;
        assert!(matches!(result, Err(GatewayError::InvalidParams { .. })));
    }

    #[test]
    fn status_mapping_recognizes_success_codes() {
        assert_eq!(map_payment_status("1"), PaymentState::Completed);
        assert_eq!(map_payment_status("success"), PaymentState::Completed);
        assert_eq!(map_payment_status("PAID"), PaymentState::Completed);
    }

    #[test]
    fn status_mapping_recognizes_failure_codes() {
        assert_eq!(map_payment_status("3"), PaymentState::Failed);
        assert_eq!(map_payment_status("failed"), PaymentState::Failed);
        assert_eq!(map_payment_status("Cancelled"), PaymentState::Failed);
    }

    #[test]
    fn unknown_statuses_never_map_to_completed() {
        assert_eq!(map_payment_status("2"), PaymentState::Pending);
        assert_eq!(map_payment_status("99"), PaymentState::Pending);
        assert_eq!(map_payment_status(""), PaymentState::Pending);
        assert_eq!(map_payment_status("  "), PaymentState::Pending);
        assert_eq!(map_payment_status("something-new"), PaymentState::Pending);
    }

    #[test]
    fn failure_reason_maps_known_codes() {
        assert_eq!(
            failure_reason(Some("insufficient_funds")),
            "Insufficient funds in the selected account"
        );
        assert_eq!(
            failure_reason(Some("user_cancelled")),
            "Payment was cancelled before completion"
        );
    }

    #[test]
    fn failure_reason_passes_unknown_text_through() {
        assert_eq!(
            failure_reason(Some("FPX gateway maintenance window")),
            "FPX gateway maintenance window"
        );
    }

    #[test]
    fn failure_reason_defaults_when_absent() {
        assert_eq!(failure_reason(None), "Payment was not completed");
        assert_eq!(failure_reason(Some("  ")), "Payment was not completed");
    }
}
