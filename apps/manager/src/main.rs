//! AirSales Manager process.
//!
//! Watches the Seller's published statistics and ends the sale on
//! departure, on reaching the revenue threshold, or when the Seller reports
//! that every flight is sold out.

use airsales_core::ManagerConfig;
use airsales_runtime::{ManagerProcess, MetricsRecorder};
use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "manager=info,airsales_core=info,airsales_runtime=info,airsales_ipc=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ManagerConfig::from_env();
    info!(
        control_addr = %config.ipc.control_addr,
        departure_secs = config.departure_secs,
        revenue_threshold = config.revenue_threshold,
        "Starting manager"
    );

    let metrics = if config.metrics {
        Some(MetricsRecorder::install()?)
    } else {
        None
    };

    let manager = ManagerProcess::start(config)
        .await
        .context("failed to attach to the seller (is it running?)")?;

    let arbiter = manager.arbiter();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            arbiter.cancel();
        }
    });

    let stat = manager.run().await.context("manager failed")?;
    info!(%stat, "Manager finished");

    if let Some(rendered) = metrics.as_ref().and_then(MetricsRecorder::render) {
        debug!("Final metrics:\n{rendered}");
    }

    Ok(())
}
