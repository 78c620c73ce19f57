mod api;
mod config;
mod database;
mod error;
mod gateway;
mod health;
mod logging;
mod middleware;
mod services;

// Imports
use crate::api::donations::DonationApiState;
use crate::api::receipts::ReceiptApiState;
use crate::api::webhooks::CallbackState;
use crate::config::AppConfig;
use crate::gateway::provider::BillingGateway;
use crate::gateway::toyyibpay::ToyyibPayClient;
use crate::health::{HealthChecker, HealthStatus};
use crate::logging::init_tracing;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::middleware::rate_limit::{start_cleanup_task, RateLimiter};
use crate::services::category::CategoryService;
use crate::services::intent::IntentService;
use crate::services::mailer::{HttpMailer, Mailer};
use crate::services::notification::NotificationService;
use crate::services::receipt::{HtmlReceiptRenderer, ReceiptService};
use crate::services::reconciliation::ReconciliationService;
use crate::services::retry::RetryService;
use axum::{
    routing::{get, post},
    Json, Router,
};
use database::donation_event_repository::DonationEventRepository;
use database::donation_repository::DonationRepository;
use database::project_repository::ProjectRepository;
use database::settings_repository::SettingsRepository;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize advanced tracing
    init_tracing();

    dotenv().ok();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting YIP donation backend service"
    );

    // Load and validate configuration
    let config = AppConfig::from_env().map_err(|e| {
        error!("❌ Failed to load configuration: {}", e);
        anyhow::anyhow!(e)
    })?;
    config.server.validate().map_err(|e| anyhow::anyhow!(e))?;
    config.donations.validate().map_err(|e| anyhow::anyhow!(e))?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        organization = %config.organization.name,
        "Server configuration loaded"
    );

    // Initialize database connection pool
    info!("📊 Initializing database connection pool...");
    let db_pool = database::init_pool_from_config(&config.database)
        .await
        .map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            anyhow::anyhow!(e)
        })?;
    info!(
        max_connections = config.database.max_connections,
        "✅ Database connection pool initialized"
    );

    if config.database.run_migrations {
        info!("📊 Applying database migrations...");
        database::run_migrations(&db_pool)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        info!("✅ Database migrations applied");
    } else {
        info!("⏭️  Skipping database migrations (RUN_MIGRATIONS=false)");
    }

    // Initialize the payment gateway client
    info!("💳 Initializing payment gateway client...");
    let gateway: Arc<dyn BillingGateway> = Arc::new(ToyyibPayClient::from_env().map_err(|e| {
        error!("❌ Failed to initialize gateway client: {}", e);
        anyhow::anyhow!(e)
    })?);
    if gateway.is_configured() {
        info!("✅ Payment gateway client initialized");
    } else {
        info!("⚠️  Payment gateway credentials not set; payment operations will be refused");
    }

    // Initialize the mailer
    info!("📧 Initializing mailer...");
    let mailer_client = HttpMailer::from_env().map_err(|e| {
        error!("❌ Failed to initialize mailer: {}", e);
        anyhow::anyhow!(e)
    })?;
    let mailer_configured = mailer_client.is_configured();
    let mailer: Arc<dyn Mailer> = Arc::new(mailer_client);
    if mailer_configured {
        info!("✅ Mailer initialized");
    } else {
        info!("⚠️  Mail credentials not set; receipt emails will be skipped");
    }

    // Repositories
    let donations = DonationRepository::new(db_pool.clone());
    let projects = ProjectRepository::new(db_pool.clone());
    let events = DonationEventRepository::new(db_pool.clone());
    let settings = SettingsRepository::new(db_pool.clone());

    // Services
    info!("🧩 Wiring donation services...");
    let categories = Arc::new(CategoryService::new(settings, gateway.clone()));
    let receipts = Arc::new(ReceiptService::new(
        donations.clone(),
        projects.clone(),
        events.clone(),
        config.organization.clone(),
        Arc::new(HtmlReceiptRenderer),
        mailer.clone(),
    ));
    let notifications = Arc::new(NotificationService::new(
        mailer.clone(),
        &config.organization,
    ));
    let reconciliation = Arc::new(ReconciliationService::new(
        donations.clone(),
        projects.clone(),
        events.clone(),
        receipts.clone(),
        notifications.clone(),
        config.organization.clone(),
    ));
    let retry = Arc::new(RetryService::new(
        donations.clone(),
        projects.clone(),
        events.clone(),
        categories.clone(),
        gateway.clone(),
        config.organization.clone(),
        config.donations.max_payment_attempts,
    ));
    let intent = Arc::new(IntentService::new(
        donations.clone(),
        projects.clone(),
        categories.clone(),
        gateway.clone(),
        config.organization.clone(),
        config.donations.min_amount,
    ));
    info!("✅ Donation services wired");

    // Initialize health checker
    info!("🏥 Initializing health checker...");
    let health_checker =
        HealthChecker::new(db_pool.clone(), gateway.is_configured(), mailer_configured);
    info!("✅ Health checker initialized");

    // Retry endpoint rate limiter with background eviction
    let rate_limiter = RateLimiter::new(
        config.donations.retry_rate_limit,
        Duration::from_secs(config.donations.retry_rate_window_secs),
    );
    start_cleanup_task(rate_limiter.clone(), Duration::from_secs(60));

    // Create the application router with logging middleware
    info!("🛣️  Setting up application routes...");

    let donation_routes = Router::new()
        .route("/api/donations", post(api::donations::create_donation))
        .route("/api/donations/retry", post(api::donations::retry_donation))
        .with_state(Arc::new(DonationApiState {
            intent,
            retry,
            rate_limiter,
            trusted_origins: config.donations.trusted_origins.clone(),
        }));

    let callback_routes = Router::new()
        .route(
            "/api/payments/callback",
            post(api::webhooks::handle_payment_callback).get(api::webhooks::callback_probe),
        )
        .with_state(Arc::new(CallbackState { reconciliation }));

    let receipt_routes = Router::new()
        .route("/api/receipts/download", get(api::receipts::download_receipt))
        .route("/api/receipts/resend", post(api::receipts::resend_receipt))
        .with_state(Arc::new(ReceiptApiState { receipts }));

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(AppState { health_checker })
        .merge(donation_routes)
        .merge(callback_routes)
        .merge(receipt_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    info!("✅ Routes configured");

    // Run the server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    // Print a prominent banner with server information
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                                                              ║");
    println!("║          🚀 YIP DONATION BACKEND IS RUNNING 🚀               ║");
    println!("║                                                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║                                                              ║");
    println!(
        "║  🌐 Server Address:  http://{}                    ║",
        addr
    );
    println!("║                                                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  📡 AVAILABLE ENDPOINTS:                                     ║");
    println!("║                                                              ║");
    println!("║  GET  /                          - Service banner            ║");
    println!("║  GET  /health                    - Health check              ║");
    println!("║  GET  /health/ready              - Readiness probe           ║");
    println!("║  GET  /health/live               - Liveness probe            ║");
    println!("║  POST /api/donations             - Create donation           ║");
    println!("║  POST /api/donations/retry       - Retry payment             ║");
    println!("║  POST /api/payments/callback     - Gateway callback          ║");
    println!("║  GET  /api/receipts/download     - Download receipt          ║");
    println!("║  POST /api/receipts/resend       - Resend receipt email      ║");
    println!("║                                                              ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    info!(
        address = %addr,
        "🚀 Server listening on http://{}",
        addr
    );
    info!("✅ Server is ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");

    Ok(())
}

// Application state for the operational endpoints
#[derive(Clone)]
struct AppState {
    health_checker: HealthChecker,
}

// Handlers
async fn root() -> Json<serde_json::Value> {
    info!("📍 Root endpoint accessed");
    Json(serde_json::json!({
        "service": "YIP Donation Backend",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    info!("🏥 Health check requested");
    let health_status = state.health_checker.check_health().await;

    // Return 503 if any component is unhealthy
    if matches!(health_status.status, crate::health::HealthState::Unhealthy) {
        error!("❌ Health check failed - service unhealthy");
        Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        info!("✅ Health check passed");
        Ok(Json(health_status))
    }
}

/// Readiness probe - checks if the service is ready to accept traffic
async fn readiness(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    info!("🔍 Readiness probe requested");
    // Readiness checks all dependencies
    let result = health(axum::extract::State(state)).await;
    if result.is_ok() {
        info!("✅ Readiness check passed");
    } else {
        error!("❌ Readiness check failed");
    }
    result
}

/// Liveness probe - checks if the service is alive (basic check)
async fn liveness() -> Result<&'static str, (axum::http::StatusCode, String)> {
    info!("💓 Liveness probe requested");
    // Liveness just checks if the service is running
    Ok("OK")
}
