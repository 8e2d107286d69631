pub mod error;
pub mod handlers;
pub mod session;

use crate::adapters::{ComputeStudioProvider, OauthClient};
use crate::config::Settings;
use crate::core::StitchEngine;
use crate::domain::model::MetaParameters;
use crate::utils::error::Result;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use session::{PendingStates, SessionManager};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub struct AppState {
    pub settings: Settings,
    pub engine: StitchEngine<ComputeStudioProvider>,
    pub oauth: OauthClient,
    pub sessions: SessionManager,
    pub pending_states: PendingStates,
}

/// 所有下游客戶端共用同一個 reqwest::Client
pub fn build_state(settings: Settings) -> Result<Arc<AppState>> {
    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()?;

    let provider = ComputeStudioProvider::new(http.clone(), &settings.cs_base_url);
    let engine = StitchEngine::new(
        provider,
        MetaParameters {
            year: settings.meta_year,
        },
    );
    let oauth = OauthClient::new(
        http,
        &settings.cs_base_url,
        settings.client_id.clone(),
        settings.client_secret.clone(),
        settings.redirect_uri(),
    );

    Ok(Arc::new(AppState {
        sessions: SessionManager::new(&settings.secret_key),
        pending_states: PendingStates::new(settings.oauth_state_ttl()),
        engine,
        oauth,
        settings,
    }))
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings
        .cors_origins()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("⚠️ Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings);
    let timeout = state.settings.request_timeout();
    let redirect_path = state.settings.redirect_uri_path.clone();

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/connect/", get(handlers::connect))
        .route(&redirect_path, get(handlers::oauth2_access))
        .route("/me/", get(handlers::me))
        .route("/create/", post(handlers::create_simulations))
        .route(
            "/inputs/{owner}/{title}/{model_pk}/",
            get(handlers::inputs_status),
        )
        .route("/sim/{owner}/{title}/{model_pk}/", get(handlers::sim))
        .with_state(state)
        .layer(cors)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr = settings.listen_addr()?;
    let state = build_state(settings)?;
    let router = app_router(state);

    tracing::info!("📡 Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
