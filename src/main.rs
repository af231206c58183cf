use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reply_relay::classifier::RuleSet;
use reply_relay::config::RelayConfig;
use reply_relay::dispatch::{BackoffConfig, Dispatcher, DispatcherConfig, HttpPoster};
use reply_relay::ledger::{DedupeLedger, JsonStore};
use reply_relay::server::{AppState, build_router};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reply_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env().expect("configuration");

    let rules = RuleSet::load(&config.rules_path).expect("rules file");
    tracing::info!(count = rules.len(), path = %config.rules_path.display(), "Loaded rules");

    let store = Arc::new(JsonStore::open(&config.ledger_dir).expect("ledger directory"));
    let ledger = Arc::new(DedupeLedger::new(store));

    let poster = HttpPoster::new(
        config.api_base_url.clone(),
        config.api_token.clone(),
        config.request_timeout,
    )
    .expect("HTTP client");

    let dispatcher = Arc::new(Dispatcher::new(
        ledger.clone(),
        poster,
        DispatcherConfig {
            queue_capacity: config.queue_capacity,
            posts_per_tick: config.posts_per_tick,
            backoff: BackoffConfig::DEFAULT,
        },
    ));

    // The dispatch loop is the sole queue consumer; ingestion only enqueues.
    let cancel = CancellationToken::new();
    let dispatch_task = {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        let interval = config.tick_interval;
        tokio::spawn(async move {
            dispatcher.run(interval, cancel).await;
        })
    };

    let app_state = AppState::new(config.webhook_secret.as_bytes(), rules, ledger, dispatcher);
    let app = build_router(app_state);

    tracing::info!("listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await.unwrap();

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .unwrap();

    cancel.cancel();
    dispatch_task.await.ok();
}
