use std::sync::Arc;
use std::time::Duration;

use common::{
    storage::{content_store::ContentStore, store::StorageManager},
    utils::config::get_config,
};
use extraction_pipeline::{
    extractor::ExtractionEngine, resolver::PlanResolver, run_extractor_loop, runtime::DockerCli,
};
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let storage = StorageManager::new(&config).await?;
    let store = ContentStore::new(storage);

    let resolver = PlanResolver::from_config(&config)?;
    let runtime = Arc::new(DockerCli::new(
        config.docker_platform_support,
        Duration::from_secs(config.docker_timeout_secs),
    ));
    let engine = ExtractionEngine::new(store, runtime);

    tracing::info!("Starting extractor process");
    run_extractor_loop(
        resolver,
        engine,
        Duration::from_secs(config.poll_interval_secs),
        shutdown_signal(),
    )
    .await?;
    Ok(())
}

/// Flips to true on ctrl-c so the loop can park in `Stopped`.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(true);
            }
            // Keep the sender alive so the loop never sees a closed channel.
            Err(_) => std::future::pending::<()>().await,
        }
    });
    rx
}
