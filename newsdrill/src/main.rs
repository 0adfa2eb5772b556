/*
newsdrill - single-binary main.rs
Runs the curation worker and the delivery scheduler, and serves the Telegram webhook,
all inside the same process.
*/

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use common::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::select;
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::{init_db_pool, run_migrations};
use newsdrill::curation::CurationService;
use newsdrill::ingestion::RssFeedSource;
use newsdrill::llm::{self, ProviderChain};
use newsdrill::notify::{NotificationChannel, TelegramChannel};
use newsdrill::scheduler::{DeliveryScheduler, SchedulerSettings};
use newsdrill::storage::Store;
use newsdrill::vocabulary::VocabularyService;
use newsdrill::webhook::{launch_webhook_server, WebhookState};

#[derive(Parser, Debug)]
#[command(name = "newsdrill", about = "News curation, delivery scheduler and Telegram webhook")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable background workers (serve the webhook only)
    #[arg(long)]
    no_worker: bool,

    /// Run workers only (do not bind the HTTP server)
    #[arg(long)]
    worker_only: bool,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run one curation cycle and exit
    #[arg(long)]
    fetch_once: bool,

    /// Register the webhook at `[server] public_url` and exit
    #[arg(long)]
    set_webhook: bool,

    /// Remove the webhook registration and exit
    #[arg(long)]
    delete_webhook: bool,

    /// Generate vocabulary entries for these words or text, add them and exit
    #[arg(long, value_name = "TEXT")]
    add_words: Option<String>,

    /// Vocabulary book used with --add-words
    #[arg(long, value_name = "NAME", default_value = "Default")]
    book: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");
    let override_path = if let Some(p) = args.config.clone() {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = match Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let db_pool = match init_db_pool(&config.database.path).await {
        Ok(p) => p,
        Err(e) => {
            error!(%e, db_path = %config.database.path, "failed to initialize database pool");
            return Err(e);
        }
    };
    run_migrations(&db_pool).await?;
    info!("DB migrations completed");
    let store = Store::new(db_pool);

    let offset = config.scheduler.utc_offset();
    let providers = llm::build_providers(&config.providers);
    if providers.is_empty() {
        warn!("No AI provider credential found; curation and vocabulary generation are disabled");
    } else {
        info!("AI providers in fallback order: {}", providers.names().join(" -> "));
    }

    if args.fetch_once {
        let worker = curation_worker(&store, &providers, &config)?;
        worker.run_once().await?;
        return Ok(());
    }

    if let Some(text) = args.add_words.as_deref() {
        let vocab = VocabularyService::new(store.clone(), providers.clone(), offset);
        let added = vocab.add_from_text(&args.book, text).await?;
        info!("Added {} words to {}", added, args.book);
        return Ok(());
    }

    let telegram = match TelegramChannel::from_config(&config.telegram.clone().unwrap_or_default()) {
        Ok(channel) => Some(Arc::new(channel)),
        Err(e) => {
            warn!("Telegram channel disabled: {:#}", e);
            None
        }
    };

    if args.set_webhook || args.delete_webhook {
        let channel = telegram.context("Telegram is not configured")?;
        if args.delete_webhook {
            channel.delete_webhook().await?;
        }
        if args.set_webhook {
            let public_url = config
                .server
                .as_ref()
                .and_then(|s| s.public_url.as_deref())
                .context("[server] public_url is required to register the webhook")?;
            channel.set_webhook(public_url).await?;
        }
        return Ok(());
    }

    let shutdown_notify = Arc::new(Notify::new());
    let settings = SchedulerSettings::from_config(&config.scheduler)?;

    let mut handles = Vec::new();
    if !args.no_worker {
        info!("Spawning curation worker");
        let worker = curation_worker(&store, &providers, &config)?;
        let shutdown = shutdown_notify.clone();
        handles.push(tokio::spawn(async move { worker.run(shutdown).await }));

        match &telegram {
            Some(channel) => {
                info!("Spawning delivery scheduler");
                let channel: Arc<dyn NotificationChannel> = channel.clone();
                let scheduler = DeliveryScheduler::load(store.clone(), channel, settings.clone()).await?;
                let shutdown = shutdown_notify.clone();
                handles.push(tokio::spawn(scheduler.run(shutdown)));
            }
            None => warn!("Delivery scheduler not started: no notification channel"),
        }
    } else {
        info!("Background workers disabled via CLI (--no-worker)");
    }

    match (&telegram, args.worker_only) {
        (Some(channel), false) => {
            let state = WebhookState {
                store: store.clone(),
                channel: channel.clone(),
                token: channel.token().to_string(),
                drill_size: settings.batch_size,
                offset,
                started_at: Utc::now(),
            };
            info!("Launching webhook HTTP server");
            if let Err(e) = launch_webhook_server(state, &config.server.clone().unwrap_or_default()).await {
                error!(%e, "Rocket server failed");
            }
        }
        _ => {
            if !args.worker_only {
                warn!("Webhook server not started: no notification channel");
            }
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            info!("ctrl-c received");
        }
    }

    info!("Notifying workers to shutdown");
    shutdown_notify.notify_waiters();

    for handle in handles {
        match tokio::time::timeout(Duration::from_secs(20), handle).await {
            Ok(Ok(())) => info!("worker exited cleanly"),
            Ok(Err(join_err)) => error!(%join_err, "worker task panicked"),
            Err(_) => info!("Timed out waiting for worker to exit; continuing shutdown"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn curation_worker(store: &Store, providers: &ProviderChain, config: &Config) -> Result<CurationWorker> {
    let curation = &config.curation;
    let service = CurationService::new(store.clone(), providers.clone(), config.scheduler.utc_offset())
        .with_batch_size(curation.batch_size.unwrap_or(newsdrill::curation::DEFAULT_BATCH_SIZE));
    Ok(CurationWorker {
        service,
        source: RssFeedSource::new(curation.fetch_timeout_seconds.unwrap_or(30))?,
        feeds: curation.feeds_or_default(),
        pause: Duration::from_secs(curation.category_pause_seconds.unwrap_or(2)),
        interval: Duration::from_secs(curation.fetch_interval_minutes.unwrap_or(60).max(1) * 60),
    })
}

/// Periodic fetch + curate job: runs immediately, then every `interval`
struct CurationWorker {
    service: CurationService,
    source: RssFeedSource,
    feeds: Vec<common::FeedConfig>,
    pause: Duration,
    interval: Duration,
}

impl CurationWorker {
    async fn run_once(&self) -> Result<usize> {
        self.service.run_cycle(&self.source, &self.feeds, self.pause).await
    }

    async fn run(self, shutdown_notify: Arc<Notify>) {
        info!(
            "curation worker: {} feeds, every {} minutes",
            self.feeds.len(),
            self.interval.as_secs() / 60
        );
        loop {
            if let Err(e) = self.run_once().await {
                error!("curation worker: cycle failed: {:#}", e);
            }

            select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown_notify.notified() => {
                    info!("curation worker: shutdown requested, exiting loop");
                    break;
                }
            }
        }
    }
}
