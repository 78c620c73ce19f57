//! Gateway billing category resolution

use crate::database::error::DatabaseError;
use crate::database::project_repository::Project;
use crate::database::settings_repository::SettingsRepository;
use crate::gateway::error::GatewayError;
use crate::gateway::provider::BillingGateway;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Settings key caching the gateway category code for untargeted donations.
pub const GENERAL_FUND_CATEGORY_KEY: &str = "gateway.general_fund_category";

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Database error: {message}")]
    Database { message: String },
}

impl From<DatabaseError> for CategoryError {
    fn from(err: DatabaseError) -> Self {
        CategoryError::Database {
            message: err.to_string(),
        }
    }
}

pub struct CategoryService {
    settings: SettingsRepository,
    gateway: Arc<dyn BillingGateway>,
}

impl CategoryService {
    pub fn new(settings: SettingsRepository, gateway: Arc<dyn BillingGateway>) -> Self {
        Self { settings, gateway }
    }

    /// Returns the general-fund category code, creating it at the gateway on
    /// first use and caching it in settings.
    ///
    /// Two concurrent first calls may each create a gateway category; both
    /// upsert the cache and the last write wins. The stray category is inert
    /// at the gateway, so no locking is needed here.
    pub async fn general_fund_category(&self) -> Result<String, CategoryError> {
        if let Some(code) = self.settings.get(GENERAL_FUND_CATEGORY_KEY).await? {
            if !code.trim().is_empty() {
                return Ok(code);
            }
        }

        let code = self
            .gateway
            .create_category("General Fund", "Untargeted donations to the foundation")
            .await?;
        self.settings.upsert(GENERAL_FUND_CATEGORY_KEY, &code).await?;
        info!(category_code = %code, "general fund category created and cached");
        Ok(code)
    }

    /// Category for a donation: the project's own category when it carries
    /// one, otherwise the shared general-fund category.
    pub async fn category_for_project(
        &self,
        project: Option<&Project>,
    ) -> Result<String, CategoryError> {
        if let Some(code) = project.and_then(|p| p.gateway_category_code.as_deref()) {
            if !code.trim().is_empty() {
                return Ok(code.to_string());
            }
        }
        self.general_fund_category().await
    }
}
