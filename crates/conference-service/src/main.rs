//! Conference Service
//!
//! Entry point. Wires Postgres, Redis and the call-control client into the
//! handlers, then runs the delay-queue worker and the bridge-event
//! subscriber until shutdown.

use common::secret::{redacted_endpoint, ExposeSecret};
use conference_service::config::Config;
use conference_service::handlers::{ConferenceHandler, ConferencecallHandler, HealthCheckSettings};
use conference_service::models::{Conference, Conferencecall};
use conference_service::observability::metrics::init_metrics_recorder;
use conference_service::observability::{MetricsSink, PrometheusMetrics};
use conference_service::redis::{RedisCache, RedisDelayQueue, RedisEventPublisher};
use conference_service::relay::EventRelay;
use conference_service::repositories::{
    EntityCache, PgConferenceRepository, PgConferencecallRepository, Store,
};
use conference_service::services::{HttpCallControl, SystemClock};
use conference_service::tasks::{
    start_bridge_event_subscriber, start_delay_queue_worker, TaskDispatcher,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.log_filter.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting Conference Service");
    info!(config = ?config, "Configuration loaded successfully");

    let metrics_addr: SocketAddr = config.metrics_bind_address.parse().map_err(|e| {
        error!("Invalid metrics bind address: {}", e);
        e
    })?;
    init_metrics_recorder(metrics_addr).map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;
    let metrics: Arc<dyn MetricsSink> = Arc::new(PrometheusMetrics);

    info!(
        endpoint = %redacted_endpoint(config.database.url.expose_secret()),
        "Connecting to database..."
    );
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(config.database.url.expose_secret())
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            e
        })?;
    info!("Database connection established");

    let (redis_client, redis_conn) =
        conference_service::redis::connect(config.redis.url.expose_secret()).await?;
    info!("Redis connection established");

    let cache = RedisCache::new(redis_conn.clone());
    let conference_cache: Arc<dyn EntityCache<Conference>> = Arc::new(cache.clone());
    let conferencecall_cache: Arc<dyn EntityCache<Conferencecall>> = Arc::new(cache);
    let clock = Arc::new(SystemClock);

    let store = Arc::new(Store::new(
        Arc::new(PgConferenceRepository::new(db_pool.clone(), metrics.clone())),
        Arc::new(PgConferencecallRepository::new(db_pool, metrics.clone())),
        conference_cache,
        conferencecall_cache,
        clock.clone(),
    ));

    let call_control = Arc::new(HttpCallControl::new(
        config.call_control_url.clone(),
        metrics.clone(),
    )?);
    let publisher = Arc::new(RedisEventPublisher::new(
        redis_conn.clone(),
        config.events_channel.clone(),
    ));
    let delay_queue = Arc::new(RedisDelayQueue::new(redis_conn));

    let conference_handler = Arc::new(ConferenceHandler::new(
        store.clone(),
        call_control.clone(),
        publisher.clone(),
        delay_queue.clone(),
        metrics.clone(),
    ));
    let conferencecall_handler = Arc::new(ConferencecallHandler::new(
        store,
        conference_handler.clone(),
        call_control,
        publisher,
        delay_queue.clone(),
        metrics,
        clock,
        HealthCheckSettings::from(&config),
    ));

    let dispatcher = Arc::new(TaskDispatcher::new(
        conference_handler,
        conferencecall_handler.clone(),
    ));
    let relay = Arc::new(EventRelay::new(conferencecall_handler));

    let cancel_token = CancellationToken::new();

    let worker = tokio::spawn(start_delay_queue_worker(
        delay_queue,
        dispatcher,
        config.delay_queue_poll_interval,
        cancel_token.clone(),
    ));
    let subscriber = tokio::spawn(start_bridge_event_subscriber(
        redis_client,
        config.bridge_events_channel.clone(),
        relay,
        cancel_token.clone(),
    ));

    info!("Conference Service running");
    shutdown_signal().await;

    cancel_token.cancel();
    for (name, handle) in [("delay_queue_worker", worker), ("bridge_events", subscriber)] {
        if let Err(e) = handle.await {
            error!(task = name, "Background task ended abnormally: {}", e);
        }
    }

    info!("Conference Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
