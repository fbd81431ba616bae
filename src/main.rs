use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelgraph_api::{
    api::{cors_layer, create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, PgMetadataStore, RedisBackend, ResultCache},
    services::{
        providers::{
            encoder::HttpTextEncoder,
            qdrant::{create_qdrant_client, QdrantContentSearch, QdrantVectorIndex},
        },
        EmbeddingStore, EngineSettings, ExperimentAssigner, RetrievalEngine,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let timeout = config.dependency_timeout();

    // Metadata
    let pool = create_pool(&config.database_url, timeout)?;
    let metadata = PgMetadataStore::new(pool);
    if let Err(e) = metadata.ping().await {
        tracing::warn!(error = %e, "Metadata store unreachable at startup");
    }

    // Result cache; every call misses while Redis is unreachable
    let redis = RedisBackend::new(create_redis_client(&config.redis_url)?);
    if let Err(e) = redis.ping().await {
        tracing::warn!(error = %e, "Redis unreachable at startup, serving uncached until it is up");
    }
    let cache = ResultCache::new(Arc::new(redis), timeout);

    // Vector search
    let qdrant = Arc::new(create_qdrant_client(&config.qdrant_url, timeout)?);
    let index = QdrantVectorIndex::new(qdrant.clone(), config.qdrant_collection.clone());
    let encoder = HttpTextEncoder::new(
        config.encoder_url.clone(),
        config.encoder_model.clone(),
        config.encoder_api_key.clone(),
        timeout,
    )?;
    let content = QdrantContentSearch::new(
        qdrant,
        config.qdrant_content_collection.clone(),
        Arc::new(encoder),
    );

    // User embeddings; the service starts without them and answers cold-start requests
    let embeddings = Arc::new(EmbeddingStore::new());
    if let Err(e) = embeddings.load(&config.embeddings_path).await {
        tracing::warn!(
            path = %config.embeddings_path,
            error = %e,
            "User embeddings not loaded, known-user requests will be rejected"
        );
    }

    let engine = RetrievalEngine::new(
        embeddings,
        Arc::new(index),
        Arc::new(metadata),
        cache,
        ExperimentAssigner::new(config.ab_testing_enabled),
        EngineSettings {
            cache_ttl: config.cache_ttl(),
            dependency_timeout: timeout,
            content_seed_limit: config.content_seed_limit,
        },
    )
    .with_content_search(Arc::new(content));

    let state = AppState::new(Arc::new(engine), config.embeddings_path.clone());
    let app = create_router(state).layer(cors_layer(&config.cors_origins));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
