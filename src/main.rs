use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use billing_scheduler::billing::clients::{
    CatalogClient, InventoryClient, RatingClient, RecordStoreClient,
};
use billing_scheduler::billing::{scheduler, BillingOrchestrator, OrchestratorSettings};
use billing_scheduler::config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let inventory = Arc::new(InventoryClient::new(
        http.clone(),
        config::INVENTORY_BASE_URL.clone(),
    ));
    let catalog = Arc::new(CatalogClient::new(
        http.clone(),
        config::CATALOG_BASE_URL.clone(),
    ));
    let store = Arc::new(RecordStoreClient::new(
        http.clone(),
        config::RECORD_STORE_BASE_URL.clone(),
    ));
    let rating = Arc::new(RatingClient::new(http, config::RATING_BASE_URL.clone()));

    let orchestrator = Arc::new(BillingOrchestrator::new(
        inventory,
        catalog,
        store,
        rating,
        OrchestratorSettings {
            usage_delay_days: *config::USAGE_SETTLEMENT_DELAY_DAYS,
            page_size: *config::FETCH_PAGE_SIZE,
            months_back: *config::CATCHUP_MONTHS_BACK,
        },
    ));

    let interval = Duration::from_secs(*config::BILLING_SCAN_INTERVAL_SECS);
    info!(interval_secs = interval.as_secs(), "billing scheduler started");
    let handle = scheduler::spawn(orchestrator, interval);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    handle.abort();
    Ok(())
}
