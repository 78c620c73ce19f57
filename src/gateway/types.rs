use crate::gateway::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Gateway-imposed limits on bill fields. Bills exceeding these are rejected
/// upstream, so they are enforced locally before any network call.
pub const BILL_NAME_MAX_CHARS: usize = 30;
pub const BILL_DESCRIPTION_MAX_CHARS: usize = 100;

/// Smallest billable amount in minor units (100 sen = RM 1.00).
pub const MIN_BILL_AMOUNT: i64 = 100;

/// Payer display name used when the donor asked to stay anonymous.
pub const ANONYMOUS_PAYER_NAME: &str = "Anonymous Donor";

/// Canonical payment state derived from a gateway status code.
///
/// Unrecognized codes map to `Pending`, never to `Completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Completed,
    Failed,
    Pending,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Completed => "completed",
            PaymentState::Failed => "failed",
            PaymentState::Pending => "pending",
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayorInfo {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl PayorInfo {
    /// Builds the payer block forwarded to the gateway. Anonymous donors
    /// yield `None`: no identity is forwarded and the checkout page must not
    /// collect payer details.
    pub fn for_donor(
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        anonymous: bool,
    ) -> Option<Self> {
        if anonymous {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            email: email.map(|v| v.to_string()),
            phone: phone.map(|v| v.to_string()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBillParams {
    pub category_code: String,
    pub bill_name: String,
    pub bill_description: String,
    /// Amount in minor units (sen).
    pub amount: i64,
    /// External reference echoed back in payment callbacks.
    pub reference: String,
    pub return_url: String,
    pub callback_url: String,
    /// `None` means the gateway collects no payer details at checkout.
    pub payor: Option<PayorInfo>,
}

impl CreateBillParams {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.category_code.trim().is_empty() {
            return Err(GatewayError::InvalidParams {
                message: "category code is required".to_string(),
                field: Some("category_code".to_string()),
            });
        }
        if self.bill_name.trim().is_empty() {
            return Err(GatewayError::InvalidParams {
                message: "bill name is required".to_string(),
                field: Some("bill_name".to_string()),
            });
        }
        if self.bill_name.chars().count() > BILL_NAME_MAX_CHARS {
            return Err(GatewayError::InvalidParams {
                message: format!("bill name exceeds {} characters", BILL_NAME_MAX_CHARS),
                field: Some("bill_name".to_string()),
            });
        }
        if self.bill_description.trim().is_empty() {
            return Err(GatewayError::InvalidParams {
                message: "bill description is required".to_string(),
                field: Some("bill_description".to_string()),
            });
        }
        if self.bill_description.chars().count() > BILL_DESCRIPTION_MAX_CHARS {
            return Err(GatewayError::InvalidParams {
                message: format!(
                    "bill description exceeds {} characters",
                    BILL_DESCRIPTION_MAX_CHARS
                ),
                field: Some("bill_description".to_string()),
            });
        }
        if self.amount < MIN_BILL_AMOUNT {
            return Err(GatewayError::InvalidParams {
                message: format!(
                    "amount must be at least {} sen (RM 1.00), got {}",
                    MIN_BILL_AMOUNT, self.amount
                ),
                field: Some("amount".to_string()),
            });
        }
        Ok(())
    }
}

/// Truncates to at most `max` characters, counting chars rather than bytes so
/// multibyte names survive the cut.
pub fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_params() -> CreateBillParams {
        CreateBillParams {
            category_code: "cat123".to_string(),
            bill_name: "Donation YIP-20260101".to_string(),
            bill_description: "General fund donation".to_string(),
            amount: 5000,
            reference: "YIP-20260101".to_string(),
            return_url: "https://donate.yip.org.my/thank-you".to_string(),
            callback_url: "https://donate.yip.org.my/api/payments/callback".to_string(),
            payor: None,
        }
    }

    #[test]
    fn valid_params_pass_validation() {
        assert!(valid_params().validate().is_ok());
    }

    #[test]
    fn missing_category_is_rejected() {
        let mut params = valid_params();
        params.category_code = "  ".to_string();
        let err = params.validate().unwrap_err();
        assert!(matches!(
            err,
            GatewayError::InvalidParams { field: Some(ref f), .. } if f == "category_code"
        ));
    }

    #[test]
    fn overlong_bill_name_is_rejected() {
        let mut params = valid_params();
        params.bill_name = "x".repeat(BILL_NAME_MAX_CHARS + 1);
        let err = params.validate().unwrap_err();
        assert!(matches!(
            err,
            GatewayError::InvalidParams { field: Some(ref f), .. } if f == "bill_name"
        ));
    }

    #[test]
    fn overlong_description_is_rejected() {
        let mut params = valid_params();
        params.bill_description = "y".repeat(BILL_DESCRIPTION_MAX_CHARS + 1);
        assert!(params.validate().is_err());
    }

    #[test]
    fn amount_below_minimum_is_rejected() {
        let mut params = valid_params();
        params.amount = 99;
        let err = params.validate().unwrap_err();
        assert!(matches!(
            err,
            GatewayError::InvalidParams { field: Some(ref f), .. } if f == "amount"
        ));
    }

    #[test]
    fn anonymous_donor_yields_no_payor_block() {
        let payor = PayorInfo::for_donor(
            "Aisyah Rahman",
            Some("aisyah@example.com"),
            Some("+60123456789"),
            true,
        );
        assert!(payor.is_none());
    }

    #[test]
    fn named_donor_payor_block_carries_contact_details() {
        let payor = PayorInfo::for_donor("Aisyah Rahman", Some("aisyah@example.com"), None, false)
            .expect("named donor should produce a payor block");
        assert_eq!(payor.name, "Aisyah Rahman");
        assert_eq!(payor.email.as_deref(), Some("aisyah@example.com"));
        assert!(payor.phone.is_none());
    }

    #[test]
    fn truncate_chars_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("donation", 30), "donation");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        // Multibyte characters must not be split mid-codepoint.
        assert_eq!(truncate_chars("ダナたちへ感謝", 3), "ダナた");
    }
}
