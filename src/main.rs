use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seller_leads_api::config::Config;
use seller_leads_api::crm_client::CrmClient;
use seller_leads_api::delivery::DeliveryOrchestrator;
use seller_leads_api::handlers::AppState;
use seller_leads_api::intake::Intake;
use seller_leads_api::phone_verification::{LookupApiClient, PhoneLookup, PhoneVerifier};
use seller_leads_api::rate_limit::GovernorRateLimiter;
use seller_leads_api::router::build_router;
use seller_leads_api::sheets_client::SheetsClient;
use seller_leads_api::webhook_client::WebhookClient;

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Rate limiter and phone verification cache.
/// - Destination clients (webhook, spreadsheet, CRM).
/// - HTTP routes and middleware.
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seller_leads_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let rate_limiter = Arc::new(GovernorRateLimiter::new(
        config.rate_limit_requests,
        config.rate_limit_window,
    ));
    tracing::info!(
        "Rate limiter initialized ({} requests per {:?} per IP)",
        config.rate_limit_requests,
        config.rate_limit_window
    );
    {
        // Ensure that the rate limiter state does not grow unbounded
        let limiter = rate_limiter.clone();
        let every = config.rate_limit_window;
        tokio::spawn(async move {
            limiter.clean_state(every).await;
        });
    }

    let lookup: Option<Arc<dyn PhoneLookup>> = match config.phone_lookup {
        Some(ref lookup_config) => {
            let client = LookupApiClient::new(lookup_config)?;
            tracing::info!("✓ Phone lookup client initialized: {}", lookup_config.base_url);
            Some(Arc::new(client))
        }
        None => None,
    };
    let verifier = PhoneVerifier::new(lookup, config.phone_cache_ttl);
    tracing::info!(
        "Phone verification cache initialized ({:?} TTL, 10k capacity)",
        config.phone_cache_ttl
    );

    // Build the delivery orchestrator from whichever destinations are configured
    let retry_policy = config.retry_policy();
    let mut orchestrator = DeliveryOrchestrator::new();
    if let Some(ref webhook) = config.webhook {
        orchestrator = orchestrator.with_webhook(Arc::new(WebhookClient::new(webhook)?), retry_policy);
        tracing::info!("✓ Webhook destination initialized");
    }
    if let Some(ref sheets) = config.sheets {
        orchestrator = orchestrator.with_spreadsheet(Arc::new(SheetsClient::new(sheets)?));
        tracing::info!("✓ Spreadsheet destination initialized: tab {}", sheets.tab);
    }
    if let Some(ref crm) = config.crm {
        orchestrator = orchestrator.with_crm(Arc::new(CrmClient::new(crm)?), retry_policy);
        tracing::info!("✓ CRM destination initialized: {}", crm.base_url);
    }

    // Build application state
    let port = config.port;
    let app_state = Arc::new(AppState {
        config,
        rate_limiter,
        intake: Intake::new(verifier, Arc::new(orchestrator)),
    });

    let app = build_router(app_state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
