//! hearthroute — entry point for the orchestrator HTTP server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hearthroute::config::OrchestratorConfig;
use hearthroute::database::{DatabaseConfig, DatabaseConnection, DatabasePath};
use hearthroute::orchestrator::invoker::AgentInvokerImpl;
use hearthroute::orchestrator::llm_client::{HttpEmbeddingClient, HttpLlmClient};
use hearthroute::orchestrator::prompt_cache::PromptCacheImpl;
use hearthroute::orchestrator::registry::{InProcessAgentRegistry, RegistryServiceLocator};
use hearthroute::orchestrator::router::RouterExecutorImpl;
use hearthroute::orchestrator::session_store::{InMemorySessionStore, SqliteSessionStore};
use hearthroute::orchestrator::traits::{
    AgentRegistry, EventSink, PromptCache, SessionStore, TracingEventSink,
};
use hearthroute::orchestrator::{NoopMetricsCollector, WorkflowDependencies, WorkflowDriver};
use hearthroute::server::{self, AppState};
use hearthroute::wire::{AgentCapabilities, AgentCard, PreferredTransport};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hearthroute=info".parse()?),
        )
        .init();

    let config = match std::env::var("HEARTHROUTE_ENV").as_deref() {
        Ok("production") => OrchestratorConfig::production(),
        _ => OrchestratorConfig::development(),
    };
    config.validate().context("invalid orchestrator configuration")?;

    info!(
        request_timeout_ms = config.request_timeout_ms.as_u64(),
        cache_enabled = config.cache_enabled,
        persistence = config.enable_persistence,
        "starting hearthroute"
    );

    // Agents register themselves against the registry out of process (remote
    // transport) or are wired in by an embedder ahead of `create_router`;
    // this binary boots an empty registry.
    let db = if config.enable_persistence {
        let path = config
            .storage_path
            .clone()
            .context("enable_persistence set without a storage_path")?;
        let db_path = DatabasePath::new(path)?;
        let db_config = DatabaseConfig::new(db_path);
        let connection = DatabaseConnection::initialize(db_config)
            .await
            .context("failed to initialize SQLite database")?;
        Some(connection)
    } else {
        None
    };

    let store: Arc<dyn SessionStore> = match &db {
        Some(connection) => Arc::new(SqliteSessionStore::new(connection.clone())),
        None => Arc::new(InMemorySessionStore::new()),
    };

    let registry: Arc<dyn AgentRegistry> = Arc::new(InProcessAgentRegistry::new());
    let invoker = Arc::new(AgentInvokerImpl::new());
    invoker.set_service_locator(Arc::new(RegistryServiceLocator::new(registry.clone())));

    let embedder = Arc::new(HttpEmbeddingClient::new(config.embedding_endpoint.clone()));
    let cache: Arc<dyn PromptCache> = match &db {
        Some(connection) => Arc::new(
            PromptCacheImpl::with_persistence(
                embedder,
                config.cache_max_entries,
                config.cache_similarity_threshold,
                connection.clone(),
            )
            .await
            .context("failed to hydrate prompt cache from storage")?,
        ),
        None => Arc::new(PromptCacheImpl::new(
            embedder,
            config.cache_max_entries,
            config.cache_similarity_threshold,
        )),
    };

    let llm = Arc::new(HttpLlmClient::new(config.llm_endpoint.clone()));
    let router = Arc::new(RouterExecutorImpl::new(
        cache.clone(),
        llm,
        config.router_confidence_floor,
        config.cache_admission_confidence,
        config.fallback_agent.clone(),
        config.cache_enabled,
    ));

    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let metrics = Arc::new(NoopMetricsCollector);

    let driver = Arc::new(WorkflowDriver::new(
        config.clone(),
        WorkflowDependencies {
            store: store.clone(),
            registry: registry.clone(),
            router,
            invoker,
            cache: cache.clone(),
            events,
            metrics,
        },
    ));

    let card = Arc::new(AgentCard {
        name: "hearthroute".to_string(),
        description: "Multi-agent orchestrator for natural-language home-automation requests"
            .to_string(),
        url: "http://localhost:8080".to_string(),
        preferred_transport: PreferredTransport::Jsonrpc,
        capabilities: AgentCapabilities {
            streaming: false,
            push_notifications: false,
            state_transition_history: true,
        },
        default_input_modes: vec!["text".to_string()],
        default_output_modes: vec!["text".to_string()],
        skills: vec![],
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let state = AppState { driver, store, registry, cache, card };
    let app = server::create_router(state);

    let listener = TcpListener::bind("0.0.0.0:8080").await?;
    info!("listening on http://0.0.0.0:8080");

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    server::serve_with_graceful_shutdown(listener, app, shutdown).await?;

    info!("hearthroute shutting down gracefully");
    Ok(())
}
