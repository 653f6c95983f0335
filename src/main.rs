use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use relaymux_thinking::ThoughtSignatureEngine;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use relaymux::cache::PromptCacheSimulator;
use relaymux::config::CONFIG;
use relaymux::db::{CallLogRecorder, CredentialStore, UsageTracker};
use relaymux::pool::AccountPool;
use relaymux::server::{self, AppState};
use relaymux::token::{AuthSessionRegistry, TokenManager};
use relaymux::Orchestrator;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Background auto-refresh cadence is §5's "own schedule, cancellable at
/// shutdown"; ttl/capacity for the thinking-signature cache mirror the
/// teacher's own default construction site since spec.md leaves both unset.
const SIGNATURE_CACHE_TTL_SECS: u64 = 3600;
const SIGNATURE_CACHE_CAPACITY: u64 = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_level(true).with_target(false))
        .init();

    let store = CredentialStore::connect(&CONFIG.database_url).await?;
    let call_log = CallLogRecorder::new(store.pool().clone());
    let pool = AccountPool::new(store.clone(), call_log);

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let tokens = TokenManager::new(store.clone(), http.clone());
    let cache = Arc::new(PromptCacheSimulator::new(CONFIG.cache_ttl_seconds, CONFIG.max_cache_entries));
    let usage = UsageTracker::new(store.pool().clone());
    let signatures = Arc::new(ThoughtSignatureEngine::new(SIGNATURE_CACHE_TTL_SECS, SIGNATURE_CACHE_CAPACITY));
    let auth_sessions = Arc::new(AuthSessionRegistry::new());

    let orchestrator = Orchestrator::new(
        pool.clone(),
        tokens.clone(),
        cache,
        usage.clone(),
        http,
        signatures,
    );

    let state = AppState {
        orchestrator,
        store,
        pool,
        tokens: tokens.clone(),
        usage,
        auth_sessions,
        base_url: CONFIG.base_url.clone().unwrap_or_default(),
    };

    let shutdown = CancellationToken::new();
    let refresh_task = CONFIG.enable_auto_refresh.then(|| {
        tokio::spawn(auto_refresh_loop(tokens, shutdown.clone()))
    });

    let app = server::router(state);
    let addr = CONFIG.listen_addr();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "relaymux listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Some(task) = refresh_task {
        let _ = task.await;
    }
    info!("relaymux shut down gracefully");
    Ok(())
}

/// §5 background token-refresh task: runs on its own interval, independent
/// of request traffic, and stops cleanly when `token` is cancelled.
async fn auto_refresh_loop(tokens: TokenManager, token: CancellationToken) {
    let period = Duration::from_secs(CONFIG.token_refresh_interval_hours.max(1) * 3600);
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                if let Err(err) = tokens.refresh_all_enabled().await {
                    warn!(error = %err, "background token refresh sweep failed");
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
