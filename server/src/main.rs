use std::{net::SocketAddr, sync::Arc};

use llm_core::{CompletionService, LlmClient, LlmSettings};
use server::{build_router, config::ServerConfig, store::MemoryStore, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tts_core::{synthesizer_from_settings, TtsSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting spirit chat server...");

    let llm_settings = LlmSettings::from_env();
    info!(
        "LLM: {:?} model={} at {}",
        llm_settings.provider, llm_settings.model, llm_settings.base_url
    );
    let llm: Arc<dyn CompletionService> = Arc::new(LlmClient::new(llm_settings)?);

    let tts = TtsSettings::from_env()
        .map(synthesizer_from_settings)
        .transpose()?;
    if tts.is_some() {
        info!("Speech synthesis enabled");
    } else {
        warn!("Speech synthesis disabled, replies will stream text only");
    }

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, turn_timeout={}s",
        config.port, config.rate_limit_per_minute, config.turn_timeout_secs
    );

    let state = AppState::new(Arc::new(MemoryStore::new()), llm, tts, config.clone());
    let app = build_router(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
