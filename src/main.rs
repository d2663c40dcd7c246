use actix::prelude::*;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_cache::actors::{component, HealthMonitorActor, HealthStatus, UpdateHealth};
use order_cache::cache::OrderCache;
use order_cache::config::Config;
use order_cache::http::{self, AppState};
use order_cache::ingest::IngestPipeline;
use order_cache::messaging::{DeadLetterPublisher, FailurePolicy, OrderSubscriber, RedpandaClient};
use order_cache::metrics::Metrics;
use order_cache::restore::{warm_cache, RestoreOutcome};
use order_cache::store::{self, OrderStore, PgOrderStore};
use order_cache::utils::{retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, RetryConfig};

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_cache=debug")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        http_addr = %config.http_addr,
        topic = %config.orders_topic,
        group = %config.consumer_group,
        policy = %config.failure_policy,
        "Starting order cache service"
    );

    // === 1. PostgreSQL ===
    tracing::info!("Connecting to PostgreSQL...");
    let pool = retry_with_backoff(RetryConfig::startup(), |_attempt| {
        store::connect(
            &config.database_url,
            config.database_max_connections,
            config.store_timeout,
        )
    })
    .await
    .into_result()?;

    let pg_store = PgOrderStore::new(pool, config.store_timeout);
    pg_store.ensure_schema().await?;
    let order_store: Arc<dyn OrderStore> = Arc::new(pg_store);

    // === 2. Metrics and health ===
    let metrics = Arc::new(Metrics::new()?);

    let dead_letter = match config.failure_policy {
        FailurePolicy::DeadLetter => {
            let breaker = CircuitBreaker::new("dead_letter", CircuitBreakerConfig::default());
            let client = RedpandaClient::new(&config.kafka_brokers, breaker)?;
            Some(Arc::new(DeadLetterPublisher::new(client, config.dead_letter_topic.clone())))
        }
        FailurePolicy::Drop | FailurePolicy::Redeliver => None,
    };

    let mut monitor = HealthMonitorActor::new();
    if let Some(publisher) = &dead_letter {
        monitor = monitor.with_dead_letter(publisher.clone(), metrics.clone());
    }
    let health = monitor.start();

    // === 3. Restore cache before serving ===
    let cache = Arc::new(OrderCache::new());
    match warm_cache(order_store.as_ref(), &cache).await {
        RestoreOutcome::Warm { restored } => {
            metrics.record_restore(restored, cache.len());
            health.do_send(UpdateHealth::new(component::STORE, HealthStatus::Healthy));
        }
        RestoreOutcome::Degraded { error } => {
            metrics.record_restore(0, cache.len());
            health.do_send(
                UpdateHealth::new(
                    component::STORE,
                    HealthStatus::Degraded("cache not warm".to_string()),
                )
                .with_details(error.to_string()),
            );
        }
    }

    // === 4. Subscriber ===
    let pipeline = Arc::new(IngestPipeline::new(
        order_store.clone(),
        cache.clone(),
        metrics.clone(),
    ));
    let subscriber = OrderSubscriber::new(
        &config,
        pipeline,
        dead_letter,
        metrics.clone(),
        health.clone(),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = actix::spawn(subscriber.run(shutdown_rx));

    // === 5. HTTP ===
    let state = AppState {
        cache,
        metrics,
        health,
    };
    let served = http::server(config.http_addr, state)?.await;

    tracing::info!("HTTP server stopped, shutting down subscriber");
    let _ = shutdown_tx.send(true);
    if let Err(e) = consumer.await {
        tracing::error!(error = %e, "Subscriber task failed");
    }

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
