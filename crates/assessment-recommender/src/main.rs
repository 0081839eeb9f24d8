mod config;
mod error;
mod http;
mod server;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{Config, EmbedderKind};
use error::AppError;
use recommender_core::catalog::Catalog;
use recommender_core::embedding::{FastEmbedder, HashEmbedder, TextEmbedder};
use recommender_core::service::{Recommender, SharedRecommender};
use server::AssessmentRecommenderServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for MCP JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting assessment-recommender");

    let config = Config::from_env()?;
    info!(
        catalog_path = %config.catalog_path.display(),
        shortlist_size = config.ranker.shortlist_size,
        result_limit = config.ranker.result_limit,
        embedding_model = config.embedding_model_name(),
        "configuration loaded"
    );

    if let Some(addr) = config.http_addr.clone() {
        return serve_http(&addr, &config).await;
    }

    let recommender = SharedRecommender::ready(build_recommender(&config).await?);
    let server = AssessmentRecommenderServer::new(recommender);

    if let Some(addr) = config.mcp_tcp_addr.as_deref() {
        let listener = TcpListener::bind(addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                tracing::info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                tracing::info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}

/// Bind first, then load the catalog and model while `/health` already answers. A failed
/// initialization ends the process.
async fn serve_http(addr: &str, config: &Config) -> anyhow::Result<()> {
    let recommender = SharedRecommender::new();
    let listener = TcpListener::bind(addr).await?;
    info!(listen_addr = %addr, "HTTP server listening, recommender warming up");

    let app = http::router(recommender.clone());
    let serve = async move { axum::serve(listener, app).await };
    tokio::pin!(serve);

    tokio::select! {
        built = build_recommender(config) => {
            recommender.install(built?)?;
            info!("recommender ready");
        }
        served = &mut serve => {
            served?;
            return Ok(());
        }
    }

    serve.await?;
    Ok(())
}

async fn build_recommender(config: &Config) -> Result<Recommender, AppError> {
    let catalog = Arc::new(Catalog::load(&config.catalog_path)?);

    let embedder: Arc<dyn TextEmbedder> = match config.embedder {
        EmbedderKind::FastEmbed => {
            info!(
                model = config.fastembed.model.name(),
                "initializing embedding model (may download on first run)"
            );
            Arc::new(FastEmbedder::new(config.fastembed.clone()).await?)
        }
        EmbedderKind::Hash => Arc::new(HashEmbedder::new(config.hash_dimensions)?),
    };
    info!(model = embedder.model_id(), "embedding model ready");

    Ok(Recommender::new(catalog, embedder, config.ranker)?)
}
