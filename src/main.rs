use std::sync::Arc;
use std::time::Duration;

use lens_relay::config::Config;
use lens_relay::dispatch::Dispatcher;
use lens_relay::dispatch::idempotency::IdempotencyGate;
use lens_relay::dispatch::warn::WarnThrottle;
use lens_relay::gateway::{ChatGateway, HttpVisionGateway, SlackGateway, VisionGateway};
use lens_relay::pipeline::ImageProcessor;
use lens_relay::server::{AppState, build_router};
use lens_relay::store::{CredentialStore, KvStore, LibSqlStore, MemoryStore};
use lens_relay::worker::{JobQueue, WorkerPool};

/// Interval between expired-ledger sweeps.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    let kv: Arc<dyn KvStore> = match &config.store_path {
        Some(path) => {
            let store = Arc::new(LibSqlStore::open(path).await?);
            let _purge_handle = LibSqlStore::spawn_purge_task(Arc::clone(&store), PURGE_INTERVAL);
            store
        }
        None => {
            tracing::warn!(
                "Using the in-memory ledger: markers die with the process and \
                 are not shared across instances"
            );
            Arc::new(MemoryStore::new())
        }
    };

    let chat: Arc<dyn ChatGateway> = Arc::new(SlackGateway::new(
        config.bot_token.clone(),
        config.http_timeout,
    )?);
    let vision: Arc<dyn VisionGateway> = Arc::new(HttpVisionGateway::new(
        config.inference_url.clone(),
        config.http_timeout,
    )?);

    let processor = Arc::new(ImageProcessor::new(
        Arc::clone(&chat),
        Arc::clone(&vision),
        config.reply_format,
    ));
    let queue: Arc<dyn JobQueue> = Arc::new(WorkerPool::start(
        config.worker_count,
        config.queue_capacity,
        processor,
        Arc::clone(&chat),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        config.bot_user_id.clone(),
        IdempotencyGate::new(Arc::clone(&kv), config.dedup_ttl),
        WarnThrottle::new(Arc::clone(&kv), config.warn_ttl, config.warn_scope),
        CredentialStore::new(Arc::clone(&kv)),
        Arc::clone(&chat),
        queue,
        config.templates.clone(),
    ));

    let app = build_router(AppState { dispatcher }, config.request_timeout);

    tracing::info!(
        addr = %config.bind_addr,
        format = ?config.reply_format,
        workers = config.worker_count,
        queue = config.queue_capacity,
        "lens-relay listening"
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
