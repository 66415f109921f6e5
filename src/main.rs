#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use std::sync::Arc;

use postroom::config::Config;
use postroom::services::{Mailer, QueueHandler};
use postroom::transport::log::LogTransport;
use postroom::workers::DeliveryWorker;
use postroom::{storage, telemetry};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    telemetry::init(&config.telemetry);

    let pool = storage::init_pool(&config.database_url).await?;
    storage::migrate(&pool).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let handler = Arc::new(QueueHandler::new(pool, &config.queue));
    let mailer = Arc::new(Mailer::new(
        handler,
        Arc::new(LogTransport),
        config.template.template(),
        &config.queue,
        &config.delivery,
    ));

    tracing::info!(
        database = %config.database_url,
        interval_secs = config.delivery.worker_interval_secs,
        max_attempts = config.queue.max_sending_attempts(),
        "postroom worker started"
    );

    DeliveryWorker::new(mailer, config.delivery.worker_interval_secs).run(shutdown_rx).await;

    Ok(())
}
