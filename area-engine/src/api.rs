//! HTTP API.
//!
//! Thin translation layer: resolves the caller from the bearer token,
//! calls the Area service or the token lifecycle, and maps [`AreaError`]
//! to status codes.

use crate::areas::{AreaPatch, AreaService, ServiceCatalog};
use crate::dispatch::WorkerStatus;
use crate::oauth::{MobileToken, TokenLifecycle};
use area::auth::{authenticate, authenticate_optional, extract_bearer_token, TokenError};
use area::session::SessionIssuer;
use area::store::{Area, AreaResult, NewArea};
use area::AreaError;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub areas: Arc<AreaService>,
    pub tokens: Arc<TokenLifecycle>,
    pub sessions: Arc<dyn SessionIssuer>,
}

#[derive(Deserialize)]
pub struct StartQuery {
    pub scope: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Serialize)]
pub struct AuthorizationUrlResponse {
    pub authorization_url: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Serialize)]
pub struct ConnectedServicesResponse {
    pub services: Vec<String>,
}

/// An Area with the live state of its worker.
#[derive(Serialize)]
pub struct AreaView {
    #[serde(flatten)]
    pub area: Area,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerStatus>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ---------------------------------------------------------------------------
// Services and OAuth
// ---------------------------------------------------------------------------

async fn list_services(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<ServiceCatalog>>, AppError> {
    Ok(Json(state.areas.services()?))
}

async fn oauth_start(
    State(state): State<Arc<ApiState>>,
    Path(service): Path<String>,
    Query(query): Query<StartQuery>,
    headers: HeaderMap,
) -> Result<Json<AuthorizationUrlResponse>, AppError> {
    let caller = authenticate_optional(&headers, state.sessions.as_ref())?;
    let authorization_url =
        state
            .tokens
            .build_authorization_url(&service, query.scope.as_deref(), caller)?;
    Ok(Json(AuthorizationUrlResponse { authorization_url }))
}

async fn oauth_callback(
    State(state): State<Arc<ApiState>>,
    Path(service): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = state
        .tokens
        .complete_callback(&service, &query.code, &query.state)
        .await?;
    Ok(Json(TokenResponse { token }))
}

async fn oauth_mobile(
    State(state): State<Arc<ApiState>>,
    Path(service): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MobileToken>,
) -> Result<Json<TokenResponse>, AppError> {
    let caller_token = match extract_bearer_token(&headers) {
        Ok(token) => Some(token),
        Err(TokenError::Missing) => None,
        Err(e) => return Err(AreaError::Unauthorized(e.to_string()).into()),
    };
    let token = state
        .tokens
        .exchange_mobile_token(&service, body, caller_token.as_deref())
        .await?;
    Ok(Json(TokenResponse { token }))
}

async fn disconnect_service(
    State(state): State<Arc<ApiState>>,
    Path(service): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let user_id = authenticate(&headers, state.sessions.as_ref())?;
    state.tokens.disconnect(user_id, &service)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn connected_services(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<ConnectedServicesResponse>, AppError> {
    let user_id = authenticate(&headers, state.sessions.as_ref())?;
    let services = state.tokens.connected_services(user_id)?;
    Ok(Json(ConnectedServicesResponse { services }))
}

// ---------------------------------------------------------------------------
// Areas
// ---------------------------------------------------------------------------

async fn list_areas(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Area>>, AppError> {
    let user_id = authenticate(&headers, state.sessions.as_ref())?;
    Ok(Json(state.areas.list(user_id)?))
}

async fn create_area(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<NewArea>,
) -> Result<(StatusCode, Json<Area>), AppError> {
    let user_id = authenticate(&headers, state.sessions.as_ref())?;
    let area = state.areas.create(user_id, &body)?;
    Ok((StatusCode::CREATED, Json(area)))
}

async fn get_area(
    State(state): State<Arc<ApiState>>,
    Path(area_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<AreaView>, AppError> {
    let user_id = authenticate(&headers, state.sessions.as_ref())?;
    let area = state.areas.get(user_id, area_id)?;
    let engine = state.areas.engine();
    Ok(Json(AreaView {
        running: engine.is_running(area_id),
        worker: engine.status(area_id).await,
        area,
    }))
}

async fn update_area(
    State(state): State<Arc<ApiState>>,
    Path(area_id): Path<i64>,
    headers: HeaderMap,
    Json(patch): Json<AreaPatch>,
) -> Result<Json<Area>, AppError> {
    let user_id = authenticate(&headers, state.sessions.as_ref())?;
    Ok(Json(state.areas.update(user_id, area_id, patch)?))
}

async fn delete_area(
    State(state): State<Arc<ApiState>>,
    Path(area_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let user_id = authenticate(&headers, state.sessions.as_ref())?;
    state.areas.delete(user_id, area_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn area_results(
    State(state): State<Arc<ApiState>>,
    Path(area_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Vec<AreaResult>>, AppError> {
    let user_id = authenticate(&headers, state.sessions.as_ref())?;
    Ok(Json(state.areas.results(user_id, area_id)?))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

pub struct AppError(AreaError);

impl From<AreaError> for AppError {
    fn from(e: AreaError) -> Self {
        AppError(e)
    }
}

pub fn status_for(e: &AreaError) -> StatusCode {
    match e {
        AreaError::Validation(_) => StatusCode::BAD_REQUEST,
        AreaError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AreaError::NotFound(_) => StatusCode::NOT_FOUND,
        AreaError::AlreadyExists(_) => StatusCode::CONFLICT,
        AreaError::UpstreamAuth(_) => StatusCode::BAD_GATEWAY,
        AreaError::TransientUpstream(_) => StatusCode::SERVICE_UNAVAILABLE,
        AreaError::Configuration(_) | AreaError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(status = %status, error = %self.0, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/services", get(list_services))
        .route("/api/services/:service/oauth/start", get(oauth_start))
        .route("/api/services/:service/oauth/callback", get(oauth_callback))
        .route("/api/services/:service/oauth/mobile", post(oauth_mobile))
        .route(
            "/api/services/:service/connection",
            delete(disconnect_service),
        )
        .route("/api/me/services", get(connected_services))
        .route("/api/areas", get(list_areas).post(create_area))
        .route(
            "/api/areas/:id",
            get(get_area).patch(update_area).delete(delete_area),
        )
        .route("/api/areas/:id/results", get(area_results))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}
