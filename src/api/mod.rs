// HTTP API routes (players, matches, leaderboards, history).

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Json, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::calendar::CalendarWindow;
use crate::db::Database;
use crate::elo::RatingPolicy;
use crate::error::LadderError;
use crate::leaderboard::leaderboard;
use crate::metrics;
use crate::players;
use crate::recorder::MatchRecorder;
use crate::reports;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreatePlayerRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateMatchRequest {
    pub player_a_id: i64,
    pub player_b_id: i64,
    pub games_a: i32,
    pub games_b: i32,
    /// Defaults to the time of the request.
    pub played_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct RecentMatchesParams {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct RangeParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct WeeklyParams {
    pub date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct MonthlyParams {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub recorder: Arc<MatchRecorder>,
    pub calendar: CalendarWindow,
}

impl AppState {
    pub fn new(db: Arc<Database>, policy: Arc<dyn RatingPolicy>, calendar: CalendarWindow) -> Self {
        let recorder = Arc::new(MatchRecorder::new(db.clone(), policy, calendar));
        Self {
            db,
            recorder,
            calendar,
        }
    }
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn internal_error(e: sqlx::Error) -> impl IntoResponse {
    tracing::error!("Database error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn error_response(e: LadderError) -> Response {
    let status = match &e {
        LadderError::Validation(_) => StatusCode::BAD_REQUEST,
        LadderError::NotFound(_) => StatusCode::NOT_FOUND,
        LadderError::Conflict(_) => StatusCode::CONFLICT,
        LadderError::Storage(source) => {
            tracing::error!("Database error: {source}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, &e.to_string()).into_response()
}

/// Malformed request bodies keep axum's status but use the JSON error shape.
fn rejection_response(rejection: JsonRejection) -> Response {
    json_error(rejection.status(), &rejection.body_text()).into_response()
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        // Players
        .route("/api/players", get(list_players).post(create_player))
        .route("/api/players/{id}", get(get_player_profile))
        // Matches
        .route("/api/matches", get(list_matches).post(create_match))
        // Standings
        .route("/api/ratings", get(current_ratings))
        .route("/api/leaderboard", get(range_leaderboard))
        .route("/api/leaderboard/weekly", get(weekly_leaderboard))
        .route("/api/leaderboard/monthly", get(monthly_leaderboard))
        // History
        .route("/api/history/weeks", get(week_winners))
        .route("/api/history/months", get(monthly_champions))
        .route("/api/history/cups", get(cups_leaderboard))
        .layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let started = Instant::now();

    let response = next.run(req).await;

    metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .observe(started.elapsed().as_secs_f64());
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    response
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "ladder-backend" }))
}

async fn get_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Player handlers ───────────────────────────────────────────────────

async fn list_players(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.list_players().await {
        Ok(players) => (StatusCode::OK, Json(json!(players))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn create_player(
    State(state): State<AppState>,
    body: Result<Json<CreatePlayerRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    match players::create_player(&state.db, &req.name).await {
        Ok(player) => (StatusCode::CREATED, Json(json!(player))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_player_profile(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match players::player_profile(&state.db, id).await {
        Ok(profile) => (StatusCode::OK, Json(json!(profile))).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Match handlers ────────────────────────────────────────────────────

async fn list_matches(
    State(state): State<AppState>,
    Query(params): Query<RecentMatchesParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let matches = reports::recent_matches(&state.db, limit).await;
    (StatusCode::OK, Json(json!(matches)))
}

async fn create_match(
    State(state): State<AppState>,
    body: Result<Json<CreateMatchRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let played_at = req.played_at.unwrap_or_else(Utc::now);
    match state
        .recorder
        .record_match(req.player_a_id, req.player_b_id, req.games_a, req.games_b, played_at)
        .await
    {
        Ok(m) => (StatusCode::CREATED, Json(json!({ "match": m }))).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Standings handlers ────────────────────────────────────────────────

async fn current_ratings(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(reports::current_ratings(&state.db).await))
}

async fn range_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> impl IntoResponse {
    metrics::LEADERBOARD_QUERIES_TOTAL
        .with_label_values(&["range"])
        .inc();
    Json(json!(leaderboard(&state.db, params.start, params.end).await))
}

async fn weekly_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<WeeklyParams>,
) -> impl IntoResponse {
    let date = params.date.unwrap_or_else(Utc::now);
    let board = reports::weekly_leaderboard(&state.db, &state.calendar, date).await;
    Json(json!({
        "week": state.calendar.week_label(date),
        "start": state.calendar.week_start(date),
        "end": state.calendar.week_end(date),
        "players": board,
    }))
}

async fn monthly_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<MonthlyParams>,
) -> impl IntoResponse {
    let (this_year, this_month) = state.calendar.year_month(Utc::now());
    let year = params.year.unwrap_or(this_year);
    let month = params.month.unwrap_or(this_month);
    match reports::monthly_leaderboard(&state.db, &state.calendar, year, month).await {
        Ok(board) => (
            StatusCode::OK,
            Json(json!({
                "month": format!("{year}-{month:02}"),
                "players": board,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ── History handlers ──────────────────────────────────────────────────

async fn week_winners(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(
        reports::week_winners_history(&state.db, &state.calendar).await
    ))
}

async fn monthly_champions(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(
        reports::monthly_champions_history(&state.db, &state.calendar).await
    ))
}

async fn cups_leaderboard(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(
        reports::cups_leaderboard(&state.db, &state.calendar).await
    ))
}
