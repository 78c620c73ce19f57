//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::database;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy | HealthState::Degraded)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms: None,
            details,
        }
    }
}

/// Health checker for the application
///
/// The database is probed with a live query; the gateway and mailer are
/// configuration checks only, so a health poll never spends third-party
/// API quota.
#[derive(Clone)]
pub struct HealthChecker {
    db_pool: sqlx::PgPool,
    gateway_configured: bool,
    mailer_configured: bool,
}

impl HealthChecker {
    pub fn new(db_pool: sqlx::PgPool, gateway_configured: bool, mailer_configured: bool) -> Self {
        Self {
            db_pool,
            gateway_configured,
            mailer_configured,
        }
    }

    /// Perform comprehensive health check
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut overall_healthy = true;
        let mut degraded = false;

        // Check database health
        match timeout(Duration::from_secs(5), check_database_health(&self.db_pool)).await {
            Ok(db_result) => match db_result {
                Ok(response_time) => {
                    let stats = database::get_pool_stats(&self.db_pool);
                    health_status.checks.insert(
                        "database".to_string(),
                        ComponentHealth {
                            status: ComponentState::Up,
                            response_time_ms: Some(response_time),
                            details: Some(format!(
                                "pool size {}, idle {}",
                                stats.size, stats.num_idle
                            )),
                        },
                    );
                    info!("Database health check: OK ({}ms)", response_time);
                }
                Err(e) => {
                    overall_healthy = false;
                    health_status.checks.insert(
                        "database".to_string(),
                        ComponentHealth::down(Some(e.to_string())),
                    );
                    error!("Database health check failed: {}", e);
                }
            },
            Err(_) => {
                overall_healthy = false;
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth::down(Some("Timeout".to_string())),
                );
                error!("Database health check timed out");
            }
        }

        // Payment gateway credentials
        if self.gateway_configured {
            health_status
                .checks
                .insert("payment_gateway".to_string(), ComponentHealth::up(None));
        } else {
            degraded = true;
            health_status.checks.insert(
                "payment_gateway".to_string(),
                ComponentHealth::warning(Some(
                    "Gateway credentials not configured; payments disabled".to_string(),
                )),
            );
            warn!("Payment gateway is not configured");
        }

        // Mail delivery credentials
        if self.mailer_configured {
            health_status
                .checks
                .insert("mailer".to_string(), ComponentHealth::up(None));
        } else {
            degraded = true;
            health_status.checks.insert(
                "mailer".to_string(),
                ComponentHealth::warning(Some(
                    "Mail credentials not configured; receipt emails disabled".to_string(),
                )),
            );
            warn!("Mailer is not configured");
        }

        // Set overall status
        health_status.status = if !overall_healthy {
            HealthState::Unhealthy
        } else if degraded {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        health_status
    }
}

// Check database connectivity with a trivial query
pub async fn check_database_health(
    pool: &sqlx::PgPool,
) -> Result<u128, database::error::DatabaseError> {
    let start = Instant::now();
    database::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_status_creation() {
        let health_status = HealthStatus::new();
        assert!(matches!(health_status.status, HealthState::Healthy));
        assert!(health_status.checks.is_empty());
        assert!(health_status.timestamp <= chrono::Utc::now());
    }

    #[test]
    fn test_component_health_states() {
        let up_health = ComponentHealth::up(Some(100));
        assert!(matches!(up_health.status, ComponentState::Up));
        assert_eq!(up_health.response_time_ms, Some(100));

        let down_health = ComponentHealth::down(Some("Test error".to_string()));
        assert!(matches!(down_health.status, ComponentState::Down));
        assert_eq!(down_health.details, Some("Test error".to_string()));

        let warning_health = ComponentHealth::warning(Some("Not configured".to_string()));
        assert!(matches!(warning_health.status, ComponentState::Warning));
        assert_eq!(warning_health.details, Some("Not configured".to_string()));
    }

    #[test]
    fn test_degraded_still_counts_as_available() {
        let mut status = HealthStatus::new();
        status.status = HealthState::Degraded;
        assert!(status.is_healthy());

        status.status = HealthState::Unhealthy;
        assert!(!status.is_healthy());
    }
}
