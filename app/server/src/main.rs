mod routes;

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;

use tally_rag::{RagEngine, TallyConfig};

use crate::routes::{router, AppState};

const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = TallyConfig::load().map_err(|e| anyhow!("Failed to load config: {}", e))?;
    let engine = RagEngine::new(config).context("Failed to initialize RAG engine")?;
    let app = router(AppState {
        engine: Arc::new(engine),
    });

    let addr = std::env::var("TALLY_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("tally-rag API listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
