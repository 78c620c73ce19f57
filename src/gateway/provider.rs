use crate::gateway::error::GatewayResult;
use crate::gateway::types::CreateBillParams;
use async_trait::async_trait;

#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Whether credentials are present. Callers must check this before
    /// initiating gateway work and surface a configuration error when false.
    fn is_configured(&self) -> bool;

    /// Creates a billing category and returns its code.
    async fn create_category(&self, name: &str, description: &str) -> GatewayResult<String>;

    /// Creates a bill under an existing category and returns the bill code.
    /// Implementations validate `params` locally before any network call.
    async fn create_bill(&self, params: &CreateBillParams) -> GatewayResult<String>;

    /// Hosted checkout URL for a bill code. Pure string construction.
    fn payment_url(&self, bill_code: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockGateway;

    #[async_trait]
    impl BillingGateway for MockGateway {
        fn is_configured(&self) -> bool {
            true
        }

        async fn create_category(&self, _name: &str, _description: &str) -> GatewayResult<String> {
            Ok("cat_mock".to_string())
        }

        async fn create_bill(&self, params: &CreateBillParams) -> GatewayResult<String> {
            params.validate()?;
            Ok("bill_mock".to_string())
        }

        fn payment_url(&self, bill_code: &str) -> String {
            format!("https://gateway.test/{}", bill_code)
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn BillingGateway> = Box::new(MockGateway);
        assert!(gateway.is_configured());

        let category = gateway
            .create_category("General Fund", "Donations to the general fund")
            .await
            .expect("category creation should succeed");
        assert_eq!(category, "cat_mock");

        let bill = gateway
            .create_bill(&CreateBillParams {
                category_code: category,
                bill_name: "Donation YIP-1".to_string(),
                bill_description: "General fund donation".to_string(),
                amount: 1000,
                reference: "YIP-1".to_string(),
                return_url: "https://donate.test/thanks".to_string(),
                callback_url: "https://donate.test/callback".to_string(),
                payor: None,
            })
            .await
            .expect("bill creation should succeed");
        assert_eq!(gateway.payment_url(&bill), "https://gateway.test/bill_mock");
    }

    #[tokio::test]
    async fn mock_gateway_rejects_invalid_bill_params() {
        let gateway = MockGateway;
        let result = gateway
            .create_bill(&CreateBillParams {
                category_code: String::new(),
                bill_name: "Donation".to_string(),
                bill_description: "desc".to_string(),
                amount: 1000,
                reference: "YIP-2".to_string(),
                return_url: "https://donate.test/thanks".to_string(),
                callback_url: "https://donate.test/callback".to_string(),
                payor: None,
            })
            .await;
        assert!(result.is_err());
    }
}
