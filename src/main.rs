use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use inbox_digest::api::digest_routes;
use inbox_digest::config::{DigestConfig, log_dir_from_env};
use inbox_digest::digest::{Orchestrator, OrchestratorConfig, RunState};
use inbox_digest::error::Result;
use inbox_digest::llm::create_provider;
use inbox_digest::mail::create_source;
use inbox_digest::scheduler::{Scheduler, spawn_digest_ticker};
use inbox_digest::store::create_store;
use inbox_digest::summarize::LlmSummarizer;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the process environment still applies.
    let _ = dotenvy::dotenv();

    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Initialize tracing (stderr, plus daily files when DIGEST_LOG_DIR is set)
    let (file_layer, _log_guard) = match log_dir_from_env() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-digest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    let config = DigestConfig::from_env()?;
    let grace = config.shutdown_grace();

    eprintln!("📬 Inbox Digest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   HTTP: http://0.0.0.0:{}", config.http_port);

    // ── Adapters (any failure here is fatal) ───────────────────────────
    let mail = create_source(&config.mail)?;
    let llm = create_provider(&config.llm)?;
    let summarizer = Arc::new(LlmSummarizer::new(llm));
    let store = create_store(&config.store).await?;
    eprintln!("   Mail: {}  Store: {}", mail.name(), store.name());

    // ── Orchestrator + Scheduler ───────────────────────────────────────
    let orchestrator = Arc::new(Orchestrator::new(
        mail,
        summarizer,
        store,
        OrchestratorConfig {
            adapter_timeout: config.adapter_timeout,
        },
    ));
    let scheduler = Scheduler::new(orchestrator);

    let ticker = if config.scheduler.enabled {
        eprintln!(
            "   Scheduler: every {}s",
            config.scheduler.interval.as_secs()
        );
        Some(spawn_digest_ticker(
            scheduler.clone(),
            config.scheduler.interval,
        ))
    } else {
        eprintln!("   Scheduler: disabled (manual trigger only)");
        None
    };

    // ── HTTP trigger surface ───────────────────────────────────────────
    let app = digest_routes(scheduler.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    tracing::info!(port = config.http_port, "Trigger server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    // ── Drain in-flight runs ───────────────────────────────────────────
    if let Some(ticker) = ticker
        && !ticker.shutdown(grace).await
    {
        tracing::warn!("Scheduled run abandoned at shutdown");
    }
    // A manual run whose client went away, or a tick run past its grace,
    // may still hold the slot.
    let drained = tokio::time::timeout(grace, async {
        while scheduler.run_state() == RunState::Running {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Digest run still in progress at exit");
    }

    tracing::info!("Inbox Digest stopped");
    Ok(())
}
