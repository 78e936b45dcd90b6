use std::time::Duration;

use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shared_config::AppConfig;
use timeslot_cell::services::expiry::ExpirySweepService;

const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting time slot expiry sweeper");

    let config = AppConfig::from_env();
    let sweep_service = ExpirySweepService::new(&config);

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        interval.tick().await;

        match sweep_service.sweep(None).await {
            Ok(expired) => info!("Sweep finished, {} slots expired", expired),
            // The sweep is idempotent; a failed run is retried next tick.
            Err(e) => error!("Sweep failed: {}", e),
        }
    }
}
