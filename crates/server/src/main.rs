//! CKD agent server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ckd_agent::{build_domain_agents, AgentRegistry, RemoteAgentAdapter, RouterAgent};
use ckd_config::{load_settings, Settings};
use ckd_core::LanguageModel;
use ckd_llm::{LanguageModelAdapter, OllamaBackend, OllamaConfig};
use ckd_rag::{AsyncOllamaEmbedder, HybridEngine, HybridEngineConfig, VectorDistance, VectorStore, VectorStoreConfig};
use ckd_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("CKD_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ckd-server");
    tracing::info!(environment = ?config.environment, "configuration loaded");

    init_metrics();
    tracing::info!("Prometheus metrics available at /metrics");

    let persistence = if config.persistence.enabled {
        match init_persistence(&config).await {
            Ok(layer) => {
                tracing::info!(hosts = ?config.persistence.scylla_hosts, "ScyllaDB persistence initialized");
                Some(Arc::new(layer))
            }
            Err(e) => {
                tracing::error!("Failed to initialize ScyllaDB: {e}. Continuing without persistence.");
                None
            }
        }
    } else {
        tracing::info!("persistence disabled, sessions are in-memory only");
        None
    };

    let llm_config = OllamaConfig::from(&config.llm);
    let llm_backend = OllamaBackend::new(llm_config)?;
    let llm: Arc<dyn LanguageModel> = Arc::new(LanguageModelAdapter::new(llm_backend, 8192));

    let rag = if config.rag.enabled {
        match init_rag(&config).await {
            Ok(engine) => {
                tracing::info!(endpoint = %config.rag.qdrant_endpoint, "RAG retrieval initialized");
                Some(Arc::new(engine))
            }
            Err(e) => {
                tracing::warn!("Failed to initialize RAG: {e}. Domain agents will run without retrieval.");
                None
            }
        }
    } else {
        tracing::info!("RAG disabled");
        None
    };

    let embedder = Arc::new(AsyncOllamaEmbedder::default_qwen3());

    let registry = Arc::new(AgentRegistry::new());
    if let Some(engine) = &rag {
        for agent in build_domain_agents(engine.clone(), embedder.clone(), llm.clone()) {
            registry.register(agent);
        }
    }

    for (agent_type, remote_config) in &config.remote_agents.by_agent_type {
        let adapter_config = (agent_type.as_str(), remote_config, &config.policy).into();
        match RemoteAgentAdapter::new(adapter_config) {
            Ok(adapter) => {
                registry.register(Arc::new(adapter));
                tracing::info!(agent_type, "remote agent registered");
            }
            Err(e) => tracing::warn!(agent_type, error = %e, "failed to register remote agent"),
        }
    }

    let router = Arc::new(RouterAgent::new(
        registry.clone(),
        llm.clone(),
        config.llm.classifier_max_tokens,
        config.llm.synthesis_overhead_tokens,
    ));

    let port = config.server.port;
    let state = AppState::new(config, registry, router, llm, rag, persistence);

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(feature = "telemetry")]
fn init_tracing(config: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ckd_server={},tower_http=debug", config.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &config.observability.otlp_endpoint {
        if config.observability.tracing_enabled {
            match opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(otlp_endpoint))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
            {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    subscriber.with(fmt_layer).with(otel_layer).init();
                    return;
                }
                Err(e) => eprintln!("Failed to initialize OpenTelemetry: {e}. Falling back."),
            }
        }
    }
    subscriber.with(fmt_layer).init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ckd_server={},tower_http=debug", config.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

async fn init_persistence(config: &Settings) -> Result<ckd_persistence::PersistenceLayer, ckd_persistence::PersistenceError> {
    let scylla_config = ckd_persistence::ScyllaConfig {
        hosts: config.persistence.scylla_hosts.clone(),
        keyspace: config.persistence.keyspace.clone(),
        replication_factor: config.persistence.replication_factor,
    };
    ckd_persistence::init(scylla_config).await
}

async fn init_rag(config: &Settings) -> Result<HybridEngine, ckd_rag::RagError> {
    let vs_config = VectorStoreConfig {
        endpoint: config.rag.qdrant_endpoint.clone(),
        collection: "ckd_documents".to_string(),
        vector_dim: 1024,
        distance: VectorDistance::Cosine,
        api_key: config.rag.qdrant_api_key.clone(),
    };
    let store = VectorStore::new(vs_config).await?;
    store.ensure_collection().await?;

    let engine_config = HybridEngineConfig::from(&config.rag);
    Ok(HybridEngine::new(engine_config, Arc::new(store)))
}
