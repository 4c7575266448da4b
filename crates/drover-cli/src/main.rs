//! drover: runs the batch consumer against a local in-memory subscription.
//!
//! Messages are handled by the Azure OpenAI embeddings handler when
//! `OPENAI_ENDPOINT` is set, otherwise by a simulated handler.

mod config;
mod simulated;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use drover_core::app::Consumer;
use drover_core::impls::{EmbeddingHandler, InMemoryMessageSource};
use drover_core::observability::describe_metrics;
use drover_core::ports::MessageHandler;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Cli;
use crate::simulated::SimulatedHandler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let options = cli.to_options()?;
    match cli.metrics_listener() {
        Some(addr) => {
            PrometheusBuilder::new().with_http_listener(addr).install()?;
            describe_metrics();
            info!(%addr, "serving prometheus metrics");
        }
        None => info!("METRICS_PORT not set, metrics are not exported"),
    }

    info!(
        topic = %cli.topic_name,
        subscription = %cli.subscription_name,
        "starting consumer"
    );

    let source = Arc::new(InMemoryMessageSource::new());
    for i in 0..cli.seed_messages {
        let id = source
            .send_json(&serde_json::json!({ "text": format!("Sample message {i}") }))
            .await;
        info!(message_id = %id, "seeded message");
    }

    let handler: Arc<dyn MessageHandler> = match cli.embedding_config()? {
        Some(config) => {
            info!(url = %config.url(), "using embeddings handler");
            Arc::new(EmbeddingHandler::new(config)?)
        }
        None => {
            info!(
                failures = cli.simulated_failures,
                "OPENAI_ENDPOINT not set, using simulated handler"
            );
            Arc::new(SimulatedHandler::new(cli.simulated_failures))
        }
    };

    let consumer = Consumer::new(source.clone(), handler, options);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumer_task = tokio::spawn(consumer.run(shutdown_rx));

    let finished = tokio::select! {
        joined = &mut consumer_task => Some(joined),
        () = shutdown_signal() => None,
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            info!("shutdown signal received, finishing current batch");
            // ignore send error: the consumer may already have stopped
            let _ = shutdown_tx.send(true);
            consumer_task.await
        }
    };

    let counts = source.counts().await;
    info!(counts = %serde_json::to_string(&counts)?, "subscription state");

    if let Err(err) = joined? {
        error!(error = %err, "consumer failed");
        return Err(err.into());
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
