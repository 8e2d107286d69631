use crate::domain::model::{AppId, AppResponse, InputsStatus, RawParamSet, User, UserWithToken};
use crate::server::error::{ApiError, ApiResult};
use crate::server::session::{set_session_cookie, CurrentUser};
use crate::server::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::header::SET_COOKIE,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectConfig {
    pub authorization_uri: String,
    pub state: String,
}

pub async fn connect(State(state): State<Arc<AppState>>) -> ApiResult<Json<ConnectConfig>> {
    let oauth_state = state.pending_states.issue();
    let authorization_uri = state.oauth.authorization_uri(&oauth_state)?;
    tracing::debug!("Issued OAuth state ({} pending)", state.pending_states.len());
    Ok(Json(ConnectConfig {
        authorization_uri,
        state: oauth_state,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AccessParams {
    pub code: String,
    pub state: String,
}

/// OAuth callback：換取 token、查詢使用者、寫入 session cookie 後導回前端
pub async fn oauth2_access(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AccessParams>,
) -> ApiResult<Response> {
    if !state.pending_states.consume(&params.state) {
        tracing::warn!("⚠️ Rejected unknown or expired OAuth state");
        return Err(ApiError::Unauthenticated);
    }

    let oauth_response = state.oauth.exchange_code(&params.code).await?;
    let user = state.oauth.me(&oauth_response.access_token).await?;
    let token = oauth_response.into_token();
    let max_age = (token.expires_at - Utc::now()).num_seconds();

    let user = UserWithToken { user, token };
    let session = state.sessions.issue(&user)?;
    tracing::info!("🔑 {} connected", user.user.username);

    let cookie = set_session_cookie(&session, max_age, state.settings.secure_cookies());
    Ok((
        [(SET_COOKIE, cookie)],
        Redirect::to(&state.settings.frontend_url),
    )
        .into_response())
}

pub async fn me(State(state): State<Arc<AppState>>, user: CurrentUser) -> ApiResult<Json<User>> {
    Ok(Json(state.oauth.me(user.access_token()).await?))
}

pub async fn create_simulations(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    payload: Result<Json<RawParamSet>, JsonRejection>,
) -> ApiResult<Json<Vec<AppResponse>>> {
    let Json(params) = payload?;
    tracing::info!("🚀 {} requested a new stitch", user.username());
    let outcome = state
        .engine
        .create_simulations(&params, Some(user.access_token()))
        .await?;
    Ok(Json(outcome.into_responses(&state.settings.cs_base_url)))
}

pub async fn inputs_status(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((owner, title, model_pk)): Path<(String, String, u64)>,
) -> ApiResult<Json<InputsStatus>> {
    let app = AppId::new(owner, title);
    let inputs = state
        .engine
        .get_inputs(&app, model_pk, Some(user.access_token()))
        .await?;
    Ok(Json(inputs))
}

pub async fn sim(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((owner, title, model_pk)): Path<(String, String, u64)>,
) -> ApiResult<Json<Value>> {
    let app = AppId::new(owner, title);
    let detail = state
        .engine
        .get_sim(&app, model_pk, Some(user.access_token()))
        .await?;
    Ok(Json(detail))
}
