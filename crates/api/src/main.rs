use anyhow::Context;
use tracing::{info, warn};

use indexq_api::app::{self, services, SharedEngine};
use indexq_api::forwarder::{self, IndexForwarder};
use indexq_infra::jobs::{ConsumerConfig, ConsumerLoop, QueueConfig};

fn main() -> anyhow::Result<()> {
    indexq_observability::init();

    let config = QueueConfig::from_env();
    let engine = services::build_engine(&config).context("failed to set up queue store")?;

    if !engine.test_connection() {
        warn!("queue store not reachable at startup; consumer will keep retrying");
    }

    // The blocking HTTP client must be created outside the async runtime.
    let consumer_config = ConsumerConfig::from(&config);
    let consumer = match std::env::var("INDEXER_URL").ok().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            let indexer = IndexForwarder::new(url, forwarder::DEFAULT_REQUEST_TIMEOUT)
                .context("failed to build indexer client")?;
            info!(indexer = %indexer.url(), "forwarding jobs to indexer");
            ConsumerLoop::new(engine.clone(), consumer_config, move |job| indexer.forward(job))
        }
        None => {
            warn!("INDEXER_URL not set; jobs will only be logged");
            ConsumerLoop::new(engine.clone(), consumer_config, forwarder::log_job)
        }
    };
    // Nothing of this queue runs yet, so whatever sits in processing was
    // orphaned by a previous run.
    if let Err(e) = consumer.recover_in_flight() {
        warn!(error = %e, "could not recover jobs left in processing");
    }
    let consumer = consumer.spawn().context("failed to spawn consumer thread")?;

    let addr = std::env::var("INDEXQ_ADMIN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let served = runtime.block_on(serve(&addr, engine));

    info!("stopping consumer");
    consumer.shutdown();
    served
}

async fn serve(addr: &str, engine: SharedEngine) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app::build_app(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("admin server failed")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
