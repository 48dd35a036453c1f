// ============================================================================
// Consumer Worker - identity directory commands
// ============================================================================
//
// Consumes directory commands from Redis Streams and applies them to
// PostgreSQL. One endpoint per command type, each processing one message
// at a time.
//
// Startup:
// 1. Config, tracing
// 2. Redis, PostgreSQL (+ migrations)
// 3. Resilience pipelines, dedup store, error-event sink, liveness
// 4. Report STARTING, create queues, start endpoints, report IDLE
// 5. Serve /health and /metrics
//
// Shutdown (SIGTERM / Ctrl-C):
// - receive loops stop after their current delivery
// - the process liveness key is removed
//
// ============================================================================

use anyhow::{Context, Result};
use identity_config::{Config, LogFormat};
use identity_redis::RedisClient;
use identity_shared::consumer::{
    CommandHandler, ErrorEventSink, MessageConsumer, TransportErrorEventSink,
};
use identity_shared::deduplication::{DeduplicationStore, PgProcessedMessageRepository};
use identity_shared::endpoints::{default_endpoints, Endpoint, EndpointDefinition, EndpointRunner};
use identity_shared::handlers::{
    CreateOrUpdateGroupHandler, CreateOrUpdateUserHandler, DeleteGroupHandler, DeleteUserHandler,
    DirectoryRepository, HealthCheckHandler, PgDirectoryRepository,
};
use identity_shared::health::{self, HealthState};
use identity_shared::liveness::{LivenessNotifier, RedisLivenessStore};
use identity_shared::resilience::ResiliencePipeline;
use identity_shared::telemetry::{MetricsTelemetry, Telemetry};
use identity_shared::transport::{MessageTransport, RedisStreamsTransport};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Everything an endpoint runner shares with the others
struct Services {
    config: Arc<Config>,
    dedup: Arc<DeduplicationStore>,
    telemetry: Arc<dyn Telemetry>,
    error_sink: Arc<dyn ErrorEventSink>,
    transport: Arc<dyn MessageTransport>,
    notifier: Arc<LivenessNotifier>,
}

impl Services {
    fn endpoint<H: CommandHandler>(&self, handler: H) -> Arc<dyn Endpoint> {
        let definition = EndpointDefinition::for_command::<H::Command>(&self.config.bus);
        let consumer = MessageConsumer::new(
            self.config.consumer_name.clone(),
            Arc::new(handler),
            self.dedup.clone(),
            self.telemetry.clone(),
            self.error_sink.clone(),
        );
        Arc::new(EndpointRunner::new(
            definition,
            Arc::new(consumer),
            self.transport.clone(),
            self.notifier.clone(),
            self.config.bus.receive_block,
        ))
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(config.logging.rust_log.clone());
    match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown..."),
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received, initiating graceful shutdown..."),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler, waiting for Ctrl-C only");
                tokio::signal::ctrl_c().await.ok();
                info!("SIGINT received, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, initiating graceful shutdown...");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env()?);
    init_tracing(&config);

    info!("=== Identity Consumer Worker Starting ===");
    info!("Consumer: {}", config.consumer_name);
    info!("Consumer group: {}", config.bus.consumer_group);
    info!("Connecting to Redis at: {}", config.redis_url_safe());

    let redis = RedisClient::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis");

    info!("Connecting to database...");
    let db_pool = identity_db::create_pool(&config.database_url, &config.db)
        .await
        .context("Failed to connect to database")?;
    identity_db::run_migrations(&db_pool).await?;
    info!("Connected to database");

    let full_pipeline = Arc::new(ResiliencePipeline::full("database", &config.resilience));
    let publish_pipeline = Arc::new(ResiliencePipeline::publish_only(
        "publish",
        &config.resilience,
    ));

    let notifier = Arc::new(LivenessNotifier::new(
        Arc::new(RedisLivenessStore::new(redis.clone())),
        config.liveness.clone(),
    ));
    let transport: Arc<dyn MessageTransport> = Arc::new(RedisStreamsTransport::new(
        redis.clone(),
        &config.bus,
        notifier.identity(),
    ));
    let dedup = Arc::new(DeduplicationStore::new(
        Arc::new(PgProcessedMessageRepository::new(db_pool.clone())),
        full_pipeline.clone(),
    ));
    let error_sink: Arc<dyn ErrorEventSink> = Arc::new(TransportErrorEventSink::new(
        transport.clone(),
        publish_pipeline,
        config.bus.error_event_queue.clone(),
    ));

    notifier
        .set_starting()
        .await
        .context("Failed to report STARTING")?;

    for definition in default_endpoints(&config.bus) {
        transport.ensure_queue(&definition.queue).await?;
    }
    transport.ensure_queue(&config.bus.error_event_queue).await?;

    let directory: Arc<dyn DirectoryRepository> =
        Arc::new(PgDirectoryRepository::new(db_pool.clone(), full_pipeline));
    let services = Services {
        config: config.clone(),
        dedup,
        telemetry: Arc::new(MetricsTelemetry::new()),
        error_sink,
        transport,
        notifier: notifier.clone(),
    };
    let endpoints = vec![
        services.endpoint(CreateOrUpdateUserHandler::new(directory.clone())),
        services.endpoint(DeleteUserHandler::new(directory.clone())),
        services.endpoint(CreateOrUpdateGroupHandler::new(directory.clone())),
        services.endpoint(DeleteGroupHandler::new(directory)),
        services.endpoint(HealthCheckHandler),
    ];

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut receive_loops = Vec::new();
    for endpoint in endpoints {
        info!(
            queue = %endpoint.definition().queue,
            message_type = endpoint.definition().message_type,
            "Starting endpoint"
        );
        receive_loops.extend(endpoint.spawn(shutdown_rx.clone()));
    }

    notifier.set_idle().await.context("Failed to report IDLE")?;

    let app = health::router(Arc::new(HealthState {
        db_pool,
        redis,
    }));
    let addr = format!("0.0.0.0:{}", config.health_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind health listener on {}", addr))?;
    info!("Health and metrics listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Health server failed")?;

    shutdown_tx.send(true).ok();
    for handle in receive_loops {
        if let Err(e) = handle.await {
            error!(error = %e, "Receive loop panicked");
        }
    }

    if let Err(e) = notifier.stop().await {
        error!(error = %e, "Failed to remove liveness key");
    }
    info!("Consumer worker stopped gracefully");
    Ok(())
}
