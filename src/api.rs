//! HTTP API endpoints.
//!
//! Participant routes identify the caller through the `x-user-id` header. Admin routes sit
//! behind HTTP Basic auth and drive the status machine and winner reveals.

use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{self, AuthConfig, Caller};
use crate::error::{GameError, GameResult};
use crate::state::AppState;
use crate::store::snapshot::StoreSnapshot;
use crate::types::*;
use crate::ws;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub access_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub game: Game,
    pub participant: GameParticipant,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickRequest {
    pub category_id: CategoryId,
    pub nomination_id: NominationId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub game_id: GameId,
    pub players: Vec<LeaderboardPlayer>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: GameStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerRequest {
    pub nomination_id: NominationId,
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Join a game with its access code.
///
/// POST /api/games/join
pub async fn join_game(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Json(req): Json<JoinRequest>,
) -> GameResult<Json<JoinResponse>> {
    let (game, participant) = state.join_game_by_code(&user.id, &req.access_code).await?;
    Ok(Json(JoinResponse { game, participant }))
}

/// POST /api/games/{gameId}/picks
pub async fn submit_pick(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(game_id): Path<GameId>,
    Json(req): Json<PickRequest>,
) -> GameResult<Json<Pick>> {
    let pick = state
        .submit_pick(&user.id, &game_id, &req.category_id, &req.nomination_id)
        .await?;
    Ok(Json(pick))
}

/// Current standings as seen by the caller. Only participants may look.
///
/// GET /api/games/{gameId}/leaderboard
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(game_id): Path<GameId>,
) -> GameResult<Json<LeaderboardResponse>> {
    if state
        .store
        .find_participant(&user.id, &game_id)
        .await?
        .is_none()
    {
        return Err(GameError::NotAParticipant);
    }

    let players = state.leaderboard(&game_id, Some(&user.id)).await?;
    Ok(Json(LeaderboardResponse { game_id, players }))
}

/// POST /api/admin/games/{gameId}/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<GameId>,
    Json(req): Json<StatusRequest>,
) -> GameResult<Json<Game>> {
    let game = state.transition_game_status(&game_id, req.status).await?;
    Ok(Json(game))
}

/// PUT /api/admin/categories/{categoryId}/winner
pub async fn mark_winner(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<CategoryId>,
    Json(req): Json<WinnerRequest>,
) -> GameResult<Json<Category>> {
    let category = state
        .mark_category_winner(&category_id, &req.nomination_id)
        .await?;
    Ok(Json(category))
}

/// DELETE /api/admin/categories/{categoryId}/winner
pub async fn clear_winner(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<CategoryId>,
) -> GameResult<Json<Category>> {
    let category = state.clear_category_winner(&category_id).await?;
    Ok(Json(category))
}

/// Export every store record as JSON.
///
/// GET /api/admin/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> GameResult<Json<StoreSnapshot>> {
    Ok(Json(state.export_snapshot().await?))
}

/// Replace every store record with the uploaded snapshot.
///
/// POST /api/admin/state/import
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<StoreSnapshot>,
) -> GameResult<Json<serde_json::Value>> {
    state.import_snapshot(snapshot).await.inspect_err(|e| {
        tracing::error!(error = %e, "State import failed");
    })?;
    Ok(Json(serde_json::json!({ "imported": true })))
}

/// All routes, without the outer trace/CORS layers
pub fn router(state: Arc<AppState>, auth_config: Arc<AuthConfig>) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/games/{game_id}/status", post(update_status))
        .route(
            "/api/admin/categories/{category_id}/winner",
            put(mark_winner).delete(clear_winner),
        )
        .route("/api/admin/state/export", get(export_state))
        .route("/api/admin/state/import", post(import_state))
        .layer(middleware::from_fn_with_state(
            auth_config,
            auth::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .route("/api/games/join", post(join_game))
        .route("/api/games/{game_id}/picks", post(submit_pick))
        .route("/api/games/{game_id}/leaderboard", get(get_leaderboard))
        .merge(admin_routes)
        .with_state(state)
}
