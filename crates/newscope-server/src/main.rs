//! Newscope daemon: pipeline loops plus the HTTP API in one process.
//!
//! Startup wires the store, the LLM provider, and the worker loops into
//! a single cancellable runtime, then serves the API until Ctrl+C or
//! SIGTERM. Configuration, store, or bind failures exit non-zero.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use newscope_core::classify::worker::ClassificationLoop;
use newscope_core::classify::{Classifier, LlmClassifier};
use newscope_core::config::Config;
use newscope_core::extract::worker::ExtractionLoop;
use newscope_core::extract::ReadabilityExtractor;
use newscope_core::fetch::processor::FeedProcessor;
use newscope_core::fetch::FeedFetcher;
use newscope_core::llm::openai_compat::OpenAiCompatProvider;
use newscope_core::llm::LlmProvider;
use newscope_core::preference::{FeedbackTracker, PreferenceMaintainer};
use newscope_core::scheduler::{run_cleanup_loop, run_fetch_scheduler, Runtime};
use newscope_core::storage;
use newscope_server::state::AppState;

/// Timeout for outbound feed document fetches.
const FEED_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Capacity of the feedback and on-demand extraction channels.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Newscope: a self-hosted personalized news curator.
#[derive(Parser)]
#[command(name = "newscope", version, about)]
struct Cli {
    /// Path to the configuration file (default: ~/.newscope/config.yaml).
    #[arg(long)]
    config: Option<String>,

    /// Override the listen address from the config.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = match Config::load_and_validate(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            for error in &errors {
                tracing::error!("{error}");
            }
            anyhow::bail!("invalid configuration ({} error(s))", errors.len());
        }
    };
    let listen = cli.listen.unwrap_or_else(|| config.server.listen.clone());

    let pool = storage::init_db(&config.database)
        .await
        .context("failed to initialize database")?;
    tracing::info!(dsn = %config.database.dsn, "Store ready");

    let provider = Arc::new(
        OpenAiCompatProvider::new(
            &config.llm.endpoint,
            &config.llm.api_key,
            &config.llm.model,
            config.llm.timeout(),
        )
        .context("failed to build LLM client")?,
    );
    if let Err(e) = provider.health_check().await {
        tracing::warn!(error = %e, "LLM health check failed; classification will retry at runtime");
    }
    let classifier: Arc<dyn Classifier> =
        Arc::new(LlmClassifier::new(provider, &config.llm));

    let (feedback_tx, feedback_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (extract_tx, extract_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let preference = storage::settings::load_preference_summary(&pool).await?;
    let tracker = Arc::new(FeedbackTracker::new(
        config.llm.classification.preference_summary_threshold,
        preference.updates_since_last_summary,
    ));

    let retry = config.schedule.retry_policy();
    let poll_interval = config.schedule.update_interval();
    let mut runtime = Runtime::new();

    let processor = Arc::new(FeedProcessor::new(
        pool.clone(),
        FeedFetcher::new(FEED_FETCH_TIMEOUT, &config.extraction.user_agent)
            .context("failed to build feed fetcher")?,
        retry.clone(),
    ));
    runtime.spawn(
        "fetch-scheduler",
        run_fetch_scheduler(
            pool.clone(),
            processor,
            config.schedule.clone(),
            runtime.cancel_token(),
        ),
    );

    if config.extraction.enabled {
        let extractor = Arc::new(
            ReadabilityExtractor::new(
                config.extraction.timeout(),
                &config.extraction.user_agent,
                &config.extraction.fallback_url,
                config.extraction.include_images,
                config.extraction.include_links,
            )
            .context("failed to build article extractor")?,
        );
        let extraction = ExtractionLoop::new(
            pool.clone(),
            extractor,
            config.extraction.clone(),
            retry.clone(),
        );
        let cancel = runtime.cancel_token();
        runtime.spawn(
            "extraction",
            extraction.run(extract_rx, poll_interval, cancel),
        );
    } else {
        tracing::info!("Extraction disabled; items classify from feed fields");
    }

    let classification = ClassificationLoop::new(
        pool.clone(),
        classifier.clone(),
        config.llm.classification.clone(),
        config.extraction.enabled,
        retry.clone(),
    );
    let cancel = runtime.cancel_token();
    runtime.spawn("classification", async move {
        classification.run(poll_interval, cancel).await;
    });

    let maintainer = PreferenceMaintainer::new(
        pool.clone(),
        classifier,
        tracker,
        config.llm.classification.feedback_examples,
        retry,
    );
    let cancel = runtime.cancel_token();
    runtime.spawn("preference-maintainer", async move {
        maintainer.run(feedback_rx, cancel).await;
    });

    runtime.spawn(
        "cleanup",
        run_cleanup_loop(pool.clone(), config.schedule.clone(), runtime.cancel_token()),
    );

    let state = Arc::new(AppState {
        db: pool,
        config,
        feedback_tx,
        extract_tx,
        started_at: std::time::Instant::now(),
    });
    let router = newscope_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    tracing::info!(listen = %listen, "Newscope listening");

    let cancel = runtime.cancel_token();
    runtime.spawn("http-server", async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    runtime.run_until_shutdown().await;
    Ok(())
}
