//! Payment gateway client for ToyyibPay-hosted bills

pub mod error;
pub mod provider;
pub mod toyyibpay;
pub mod types;

// Re-export the types most call sites need
pub use error::{GatewayError, GatewayResult};
pub use provider::BillingGateway;
pub use toyyibpay::{failure_reason, map_payment_status, ToyyibPayClient, ToyyibPayConfig};
pub use types::{CreateBillParams, PaymentState, PayorInfo};
