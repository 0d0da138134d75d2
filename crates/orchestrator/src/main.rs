//! Saga orchestrator entry point.

use std::error::Error;
use std::sync::Arc;

use chrono::Utc;
use messaging::{ConsumerManager, Producer, TopicRegistry};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::config::Config;
use orchestrator::routes::sagas::AppState;
use saga::{SagaOrchestrator, register_handlers, required_topics};
use saga_store::{InMemorySagaStore, PostgresSagaStore, SagaStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env()?;
    orchestrator::telemetry::init_tracing(&config);
    let metrics_handle = orchestrator::telemetry::init_metrics()?;

    match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PostgresSagaStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL saga store");
            run(config, store, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, sagas are kept in memory only");
            run(config, InMemorySagaStore::new(), metrics_handle).await
        }
    }
}

async fn run<S: SagaStore + 'static>(
    config: Config,
    store: S,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    let cancel = CancellationToken::new();
    let manager = ConsumerManager::new();
    let (producer, topics) = messaging_stack(&config)?;

    let orchestrator = Arc::new(SagaOrchestrator::new(
        Arc::new(store),
        producer,
        config.settings(),
    ));
    register_handlers(&manager, &orchestrator).await;

    // Commands that were in flight and outcomes that were never sent when
    // the last process stopped.
    match orchestrator.resend_stale(Utc::now()).await {
        Ok(resent) => tracing::info!(resent, "startup recovery finished"),
        Err(e) => tracing::error!(error = %e, "startup recovery failed"),
    }
    match orchestrator.resend_outcomes().await {
        Ok(resent) => tracing::info!(resent, "startup outcome recovery finished"),
        Err(e) => tracing::error!(error = %e, "startup outcome recovery failed"),
    }

    let mut tasks = spawn_consumers(&config, &topics, &manager, &cancel).await?;
    tasks.push(tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        let interval = config.sweep_interval();
        async move { orchestrator.run_sweeper(interval, cancel).await }
    }));

    let app = orchestrator::create_app(Arc::new(AppState { orchestrator }), metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting saga orchestrator");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown({
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    () = shutdown_signal() => {}
                    () = cancel.cancelled() => {}
                }
            }
        })
        .await?;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "background task panicked");
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[cfg(feature = "kafka")]
fn messaging_stack(config: &Config) -> Result<(Producer, Arc<TopicRegistry>), BoxError> {
    let topics = Arc::new(TopicRegistry::from_env(required_topics())?);
    let broker = messaging::broker::KafkaBroker::new(&config.kafka_config()?)?;
    tracing::info!(topics = topics.len(), "resolved Kafka topics");
    Ok((Producer::new(Arc::new(broker), Arc::clone(&topics)), topics))
}

#[cfg(not(feature = "kafka"))]
fn messaging_stack(_config: &Config) -> Result<(Producer, Arc<TopicRegistry>), BoxError> {
    tracing::warn!("built without Kafka support, messages stay in process");
    let topics = Arc::new(TopicRegistry::identity(required_topics()));
    let broker = Arc::new(messaging::InMemoryBroker::new());
    Ok((Producer::new(broker, Arc::clone(&topics)), topics))
}

#[cfg(feature = "kafka")]
async fn spawn_consumers(
    config: &Config,
    topics: &TopicRegistry,
    manager: &ConsumerManager,
    cancel: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, BoxError> {
    let kafka = config.kafka_config()?;
    let mut tasks = Vec::new();
    for topic_name in manager.topics().await {
        tasks.push(messaging::broker::spawn_consumer(
            &kafka,
            topics,
            &topic_name,
            manager.clone(),
            cancel.clone(),
        )?);
    }
    Ok(tasks)
}

#[cfg(not(feature = "kafka"))]
async fn spawn_consumers(
    _config: &Config,
    _topics: &TopicRegistry,
    _manager: &ConsumerManager,
    _cancel: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, BoxError> {
    Ok(Vec::new())
}
