use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use scamtrap_core::config::EngineConfig;
use scamtrap_core::engine::AnalysisEngine;

mod auth;
mod error;
mod gemini;
mod middleware;
mod routes;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Scamtrap API",
        version = "0.1.0",
        description = "Scam detection and honeypot engagement for text and voice messages."
    ),
    paths(
        routes::health::health_check,
        routes::analyze::analyze_text,
        routes::analyze::analyze_audio,
    ),
    components(schemas(
        HealthResponse,
        routes::analyze::AnalyzeTextRequest,
        scamtrap_core::error::ApiError,
        scamtrap_core::response::AnalysisResponse,
        scamtrap_core::response::OperationMode,
        scamtrap_core::response::EvidenceLevel,
        scamtrap_core::response::HoneypotReport,
        scamtrap_core::entities::ExtractedEntities,
        scamtrap_core::ssf::SsfProfile,
        scamtrap_core::oracle::ScamType,
        scamtrap_core::oracle::VoiceSignals,
        scamtrap_core::honeypot::TerminationReason,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_key",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new("x-api-key"),
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scamtrap_api=debug,scamtrap_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let gemini_api_key =
        std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");
    let oracle = Arc::new(gemini::GeminiClient::new(gemini_api_key));

    let engine = Arc::new(AnalysisEngine::new(
        oracle.clone(),
        oracle,
        EngineConfig::from_env(),
    ));

    let app_state = state::AppState {
        engine,
        auth: Arc::new(auth::ApiKeyAuth::from_env()),
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(
            routes::analyze::text_router()
                .layer(middleware::rate_limit::analyze_text_layer())
                .layer(axum::middleware::from_fn_with_state(
                    app_state.clone(),
                    auth::require_api_key,
                )),
        )
        .merge(
            routes::analyze::audio_router()
                .layer(middleware::rate_limit::analyze_audio_layer())
                .layer(axum::middleware::from_fn_with_state(
                    app_state.clone(),
                    auth::require_api_key,
                )),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Scamtrap API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
