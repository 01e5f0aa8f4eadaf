//! AirSales Seller process.
//!
//! Sells seats with a pool of workers until every flight is sold out or the
//! Manager calls the sale off. Start it first, then start the Manager.

use airsales_core::SellerConfig;
use airsales_runtime::{MetricsRecorder, SellerProcess};
use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "seller=info,airsales_core=info,airsales_runtime=info,airsales_ipc=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SellerConfig::from_env();
    info!(
        flights = config.flights,
        first_class_seats = config.first_class_seats,
        economy_seats = config.economy_seats,
        workers = config.workers,
        control_addr = %config.ipc.control_addr,
        "Starting seller"
    );

    let metrics = if config.metrics {
        Some(MetricsRecorder::install()?)
    } else {
        None
    };

    let seller = SellerProcess::start(config)
        .await
        .context("failed to start seller")?;

    let arbiter = seller.arbiter();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping sales");
            arbiter.cancel();
        }
    });

    let stat = seller.run().await.context("seller failed")?;
    info!(%stat, "Seller finished");

    if let Some(rendered) = metrics.as_ref().and_then(MetricsRecorder::render) {
        debug!("Final metrics:\n{rendered}");
    }

    Ok(())
}
