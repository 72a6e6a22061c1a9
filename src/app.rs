//! Process wiring.
//!
//! [`FeedApp`] builds every component once from [`AppConfig`] and hands the
//! shared handles to each loop explicitly. Shutdown runs in a fixed order:
//!
//! 1. cancel the root token (server stops accepting, worker, live consumer
//!    and sweeper stop taking new work)
//! 2. stop the hub, closing every live connection
//! 3. close the broker

use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::auth::JwtTokenValidator;
use crate::adapters::broker::{AmqpBroker, AmqpConfig, InMemoryBroker, InMemoryBrokerConfig};
use crate::adapters::events::{EventBusConfig, InProcessEventBus};
use crate::adapters::http::{api_router, FeedHandlers};
use crate::adapters::memory::{
    InMemoryAudienceResolver, InMemoryFeedJobRepository, InMemoryFeedStore,
};
use crate::adapters::postgres::{
    run_migrations, PostgresAudienceResolver, PostgresFeedJobRepository, PostgresFeedStore,
};
use crate::adapters::websocket::{DirectBroadcastHandler, LiveConnectionHub, LiveEventConsumer, WebSocketState};
use crate::application::fanout::{
    AudienceSampler, FanoutScheduler, FixedPriorityClassifier, PostCreatedHandler,
    PriorityClassifier, PriorityWeights, RandomPriorityClassifier, RandomSampler,
};
use crate::application::feed::{GetFeedHandler, PublishPostHandler};
use crate::application::worker::{FeedMaterializer, MaterializationWorker, StaleJobSweeper};
use crate::config::{
    AppConfig, BrokerBackend, BrokerConfig, ConfigError, DatabaseConfig, FanoutConfig,
    PriorityPolicy, StorageBackend, ValidationError,
};
use crate::domain::feed::Priority;
use crate::domain::foundation::DomainError;
use crate::ports::{
    AudienceResolver, BrokerError, FeedJobRepository, FeedStore, LiveEventChannel,
    MessageBroker, TaskQueue,
};

/// Startup and shutdown failures.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// One broker seen through each of its port traits.
#[derive(Clone)]
pub struct BrokerHandles {
    pub tasks: Arc<dyn TaskQueue>,
    pub live: Arc<dyn LiveEventChannel>,
    pub control: Arc<dyn MessageBroker>,
}

impl BrokerHandles {
    pub fn new<B: MessageBroker + 'static>(broker: Arc<B>) -> Self {
        Self {
            tasks: broker.clone(),
            live: broker.clone(),
            control: broker,
        }
    }

    /// Connects the backend selected in `config`.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, AppError> {
        match config.backend {
            BrokerBackend::Memory => {
                let broker = InMemoryBroker::with_config(
                    InMemoryBrokerConfig::default().with_max_redeliveries(config.max_redeliveries),
                );
                Ok(Self::new(Arc::new(broker)))
            }
            BrokerBackend::Amqp => {
                let amqp = AmqpConfig {
                    url: config.url.clone(),
                    exchange: config.exchange.clone(),
                    task_queue: config.task_queue.clone(),
                    message_ttl: config.message_ttl(),
                    prefetch: config.prefetch,
                    pool_size: config.pool_size,
                };
                let broker = AmqpBroker::connect(amqp).await?;
                Ok(Self::new(Arc::new(broker)))
            }
        }
    }
}

/// Connection graph for the memory backend, seeded from `memory_connections`.
fn memory_audience(config: &DatabaseConfig) -> Result<InMemoryAudienceResolver, AppError> {
    let resolver = InMemoryAudienceResolver::new();
    let pairs = config.memory_connection_pairs()?;
    if pairs.is_empty() {
        tracing::warn!("No memory_connections configured; posts will reach no one");
    }
    for (a, b) in pairs {
        resolver.connect(&a, b);
    }
    Ok(resolver)
}

/// Storage and broker handles the pipeline runs on.
#[derive(Clone)]
pub struct Infrastructure {
    pub store: Arc<dyn FeedStore>,
    pub jobs: Arc<dyn FeedJobRepository>,
    pub audience: Arc<dyn AudienceResolver>,
    pub broker: BrokerHandles,
}

impl Infrastructure {
    /// Opens storage and broker connections as configured.
    pub async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        let broker = BrokerHandles::connect(&config.broker).await?;

        match config.database.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                Ok(Self {
                    store: Arc::new(InMemoryFeedStore::new()),
                    jobs: Arc::new(InMemoryFeedJobRepository::new()),
                    audience: Arc::new(memory_audience(&config.database)?),
                    broker,
                })
            }
            StorageBackend::Postgres => {
                let db = &config.database;
                let pool = PgPoolOptions::new()
                    .min_connections(db.min_connections)
                    .max_connections(db.max_connections)
                    .acquire_timeout(db.acquire_timeout())
                    .idle_timeout(db.idle_timeout())
                    .connect(&db.url)
                    .await?;

                if db.run_migrations {
                    run_migrations(&pool).await?;
                    tracing::info!("Database migrations applied");
                }

                Ok(Self {
                    store: Arc::new(PostgresFeedStore::new(pool.clone())),
                    jobs: Arc::new(PostgresFeedJobRepository::new(pool.clone())),
                    audience: Arc::new(PostgresAudienceResolver::new(pool)),
                    broker,
                })
            }
        }
    }
}

/// The assembled service.
pub struct FeedApp {
    config: AppConfig,
    infra: Infrastructure,
    bus: Arc<InProcessEventBus>,
    hub: Arc<LiveConnectionHub>,
    scheduler: Arc<FanoutScheduler>,
    worker: Arc<MaterializationWorker>,
    sweeper: Arc<StaleJobSweeper>,
    live_consumer: Arc<LiveEventConsumer>,
    router: Router,
}

impl FeedApp {
    /// Connects infrastructure and wires the service.
    pub async fn build(config: AppConfig) -> Result<Self, AppError> {
        let infra = Infrastructure::connect(&config).await?;
        Self::with_infrastructure(config, infra)
    }

    /// Wires the service on top of already constructed infrastructure.
    pub fn with_infrastructure(config: AppConfig, infra: Infrastructure) -> Result<Self, AppError> {
        let bus = Arc::new(InProcessEventBus::with_config(EventBusConfig::default()));
        let hub = Arc::new(LiveConnectionHub::new(config.hub.outbound_capacity));

        let scheduler = Arc::new(
            FanoutScheduler::new(
                infra.audience.clone(),
                infra.broker.tasks.clone(),
                infra.broker.live.clone(),
            )
            .with_sampler(sampler(&config.fanout))
            .with_classifier(classifier(&config.fanout)?)
            .with_max_audience(config.fanout.max_audience_per_post),
        );
        PostCreatedHandler::register(scheduler.clone(), bus.as_ref());

        if config.hub.broadcast_on_post {
            tracing::info!("Direct broadcast of new posts enabled");
            DirectBroadcastHandler::new_shared(hub.clone()).register(bus.as_ref());
        }

        let materializer = Arc::new(FeedMaterializer::new(
            infra.store.clone(),
            infra.jobs.clone(),
        ));
        let worker = Arc::new(MaterializationWorker::with_concurrency(
            infra.broker.tasks.clone(),
            materializer,
            config.worker.concurrency,
        ));
        let sweeper = Arc::new(
            StaleJobSweeper::new(infra.jobs.clone())
                .with_timeout(config.worker.stale_job_timeout())
                .with_interval(config.worker.sweep_interval()),
        );
        let live_consumer = Arc::new(LiveEventConsumer::new(
            infra.broker.live.clone(),
            hub.clone(),
        ));

        let feed = FeedHandlers::new(
            Arc::new(GetFeedHandler::new(infra.store.clone())),
            Arc::new(PublishPostHandler::new(bus.clone())),
        );
        let router = api_router(
            feed,
            WebSocketState::new(hub.clone()),
            &config.hub.path,
            Arc::new(JwtTokenValidator::new(&config.auth.jwt_secret)),
        );

        Ok(Self {
            config,
            infra,
            bus,
            hub,
            scheduler,
            worker,
            sweeper,
            live_consumer,
            router,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn bus(&self) -> Arc<InProcessEventBus> {
        self.bus.clone()
    }

    pub fn hub(&self) -> Arc<LiveConnectionHub> {
        self.hub.clone()
    }

    pub fn scheduler(&self) -> Arc<FanoutScheduler> {
        self.scheduler.clone()
    }

    pub fn worker(&self) -> Arc<MaterializationWorker> {
        self.worker.clone()
    }

    pub fn infrastructure(&self) -> &Infrastructure {
        &self.infra
    }

    /// Runs the loops selected by `server.role` until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        let role = self.config.server.role;
        tracing::info!(?role, "Starting feed fanout service");

        let mut loops: Vec<JoinHandle<()>> = Vec::new();

        if role.runs_worker() {
            let worker = self.worker.clone();
            let token = shutdown.clone();
            loops.push(tokio::spawn(async move {
                if let Err(e) = worker.run(token).await {
                    tracing::error!(error = %e, "Materialization worker exited");
                }
            }));

            let sweeper = self.sweeper.clone();
            let token = shutdown.clone();
            loops.push(tokio::spawn(async move { sweeper.run(token).await }));
        }

        let mut server: Option<JoinHandle<std::io::Result<()>>> = None;
        if role.serves_api() {
            let consumer = self.live_consumer.clone();
            let token = shutdown.clone();
            loops.push(tokio::spawn(async move {
                if let Err(e) = consumer.run(token).await {
                    tracing::error!(error = %e, "Live event consumer exited");
                }
            }));

            let addr = self.config.server.socket_addr()?;
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(%addr, path = %self.config.hub.path, "HTTP server listening");

            let router = self.router.clone();
            let token = shutdown.clone();
            server = Some(tokio::spawn(async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await
            }));
        }

        let mut failure: Option<AppError> = None;
        let mut server_exited = false;
        match server.as_mut() {
            Some(handle) => {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    result = handle => {
                        failure = server_failure(result);
                        server_exited = true;
                    }
                }
            }
            None => shutdown.cancelled().await,
        }
        if server_exited {
            server = None;
            shutdown.cancel();
        }

        tracing::info!("Shutting down");

        // Open sockets keep the graceful shutdown waiting until the hub closes them.
        self.hub.stop().await;

        if let Some(handle) = server {
            if let Some(e) = server_failure(handle.await) {
                failure.get_or_insert(e);
            }
        }
        for handle in loops {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Background loop panicked");
            }
        }

        // Fan-out started before shutdown still owns broker channels.
        self.scheduler.drain().await;

        if let Err(e) = self.infra.broker.control.close().await {
            tracing::warn!(error = %e, "Broker close failed");
        }

        tracing::info!("Shutdown complete");
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn server_failure(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Option<AppError> {
    match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "HTTP server failed");
            Some(AppError::Io(e))
        }
        Err(e) => {
            tracing::error!(error = %e, "HTTP server task panicked");
            Some(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            )))
        }
    }
}

fn sampler(config: &FanoutConfig) -> Arc<dyn AudienceSampler> {
    Arc::new(RandomSampler::from_seed(config.seed))
}

fn classifier(config: &FanoutConfig) -> Result<Arc<dyn PriorityClassifier>, AppError> {
    let classifier: Arc<dyn PriorityClassifier> = match config.priority_policy {
        PriorityPolicy::Fixed => {
            let priority = Priority::new(config.fixed_priority).map_err(DomainError::from)?;
            Arc::new(FixedPriorityClassifier(priority))
        }
        PriorityPolicy::Random => {
            // Separate stream from the sampler so seeded runs stay uncorrelated.
            let seed = config.seed.map(|s| s.wrapping_add(1));
            Arc::new(RandomPriorityClassifier::from_seed(seed).with_weights(PriorityWeights {
                high: config.high_weight,
                medium: config.medium_weight,
                low: config.low_weight,
            }))
        }
    };
    Ok(classifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn memory_infra() -> Infrastructure {
        Infrastructure {
            store: Arc::new(InMemoryFeedStore::new()),
            jobs: Arc::new(InMemoryFeedJobRepository::new()),
            audience: Arc::new(InMemoryAudienceResolver::new()),
            broker: BrokerHandles::new(Arc::new(InMemoryBroker::new())),
        }
    }

    #[tokio::test]
    async fn wiring_registers_fanout_handler_only_by_default() {
        use crate::domain::feed::EventKind;

        let app = FeedApp::with_infrastructure(AppConfig::in_memory(SECRET), memory_infra()).unwrap();
        assert_eq!(app.bus().handler_count(EventKind::PostCreated), 1);
        assert_eq!(app.scheduler().max_audience_per_post(), 100);
    }

    #[tokio::test]
    async fn broadcast_on_post_adds_the_direct_handler() {
        use crate::domain::feed::EventKind;

        let mut config = AppConfig::in_memory(SECRET);
        config.hub.broadcast_on_post = true;
        let app = FeedApp::with_infrastructure(config, memory_infra()).unwrap();
        assert_eq!(app.bus().handler_count(EventKind::PostCreated), 2);
    }

    #[tokio::test]
    async fn memory_backend_seeds_configured_connections() {
        use crate::domain::foundation::UserId;

        let mut config = AppConfig::in_memory(SECRET);
        config.database.memory_connections = "alice:bob,alice:carol".to_string();
        let infra = Infrastructure::connect(&config).await.unwrap();

        let alice = infra
            .audience
            .connections_of(&UserId::new("alice").unwrap())
            .await
            .unwrap();
        assert_eq!(alice, vec!["bob".to_string(), "carol".to_string()]);
    }

    #[test]
    fn malformed_memory_connections_fail_wiring() {
        let config = DatabaseConfig {
            backend: StorageBackend::Memory,
            memory_connections: "alice".to_string(),
            ..Default::default()
        };
        assert!(matches!(memory_audience(&config), Err(AppError::Validation(_))));
    }

    #[test]
    fn fixed_policy_rejects_out_of_range_priority() {
        let config = FanoutConfig {
            priority_policy: PriorityPolicy::Fixed,
            fixed_priority: 9,
            ..Default::default()
        };
        assert!(matches!(classifier(&config), Err(AppError::Domain(_))));
    }

    #[tokio::test]
    async fn run_stops_hub_and_broker_on_cancel() {
        let mut config = AppConfig::in_memory(SECRET);
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;

        let app = FeedApp::with_infrastructure(config, memory_infra()).unwrap();
        let hub = app.hub();
        let token = CancellationToken::new();
        let handle = {
            let token = token.clone();
            tokio::spawn(async move { app.run(token).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(hub.is_running());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!hub.is_running());
    }

    #[tokio::test]
    async fn worker_role_does_not_bind_a_listener() {
        use crate::config::ServiceRole;

        let mut config = AppConfig::in_memory(SECRET);
        config.server.role = ServiceRole::Worker;
        // Would fail to parse if the API side tried to bind.
        config.server.host = "not an address".to_string();

        let app = FeedApp::with_infrastructure(config, memory_infra()).unwrap();
        let token = CancellationToken::new();
        let handle = {
            let token = token.clone();
            tokio::spawn(async move { app.run(token).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
