pub mod config;
pub mod conversations;
pub mod error;
pub mod metrics;
pub mod sessions;
pub mod store;
pub mod stream;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use llm_core::CompletionService;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use tts_core::SpeechSynthesizer;

use crate::config::ServerConfig;
use crate::metrics::TurnMetrics;
use crate::store::Storage;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub llm: Arc<dyn CompletionService>,
    /// `None` when speech is disabled; turns then carry text only.
    pub tts: Option<Arc<dyn SpeechSynthesizer>>,
    pub metrics: Arc<TurnMetrics>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Storage>,
        llm: Arc<dyn CompletionService>,
        tts: Option<Arc<dyn SpeechSynthesizer>>,
        config: ServerConfig,
    ) -> Self {
        Self {
            store,
            llm,
            tts,
            metrics: Arc::new(TurnMetrics::new()),
            config,
        }
    }
}

pub async fn health_check() -> &'static str {
    "ok"
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set or empty, allowing all origins (development mode)");
        base.allow_origin(tower_http::cors::Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(tower_http::cors::AllowOrigin::list(origins))
    }
}

/// Build the HTTP application: routes under `/api` plus health and metrics.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    // Global key: every client shares one budget, which also works behind proxies.
    // One request is replenished every 60_000 / rate milliseconds.
    let per_minute = config.rate_limit_per_minute.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond((60_000 / u64::from(per_minute)).max(1))
            .burst_size(per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(cors_layer(&config))
        .into_inner();

    let api = Router::new()
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).patch(sessions::update_session),
        )
        .route("/sessions/{id}/generate", post(sessions::generate_session_spirit))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/conversations/{id}",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route("/conversations/{id}/messages", post(stream::send_message));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state);

    Ok(app)
}
