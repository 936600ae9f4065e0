//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::engine_error_response;
use crate::web::state::AppState;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate, Utc};
use reading_tracker_core::domain::{
    Award, BookProgressState, DailyActivityRecord, ProgressUpdateOutcome, StreakStats,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        update_progress_handler,
        streak_stats_handler,
        record_minutes_handler,
        health_handler,
    ),
    components(
        schemas(
            UpdateProgressRequest,
            UpdateProgressResponse,
            BookStateResponse,
            AwardResponse,
            StreakStatsResponse,
            RecordMinutesRequest,
            DailyActivityResponse,
            HealthResponse,
        )
    ),
    tags(
        (name = "Reading Tracker API", description = "Reading progress, daily activity and streaks.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct UpdateProgressRequest {
    /// A percentage (0-100) or a page number, depending on how the book is tracked.
    pub progress: i32,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct BookStateResponse {
    pub book_id: Uuid,
    pub progress: i32,
    pub progress_type: String,
    pub is_current: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<BookProgressState> for BookStateResponse {
    fn from(state: BookProgressState) -> Self {
        Self {
            book_id: state.book_id,
            progress: state.progress,
            progress_type: state.progress_type.to_string(),
            is_current: state.is_current,
            finished_at: state.finished_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AwardResponse {
    pub id: Uuid,
    pub name: String,
    pub awarded_at: DateTime<Utc>,
}

impl From<Award> for AwardResponse {
    fn from(award: Award) -> Self {
        Self {
            id: award.id,
            name: award.name,
            awarded_at: award.awarded_at,
        }
    }
}

/// The response payload sent after a progress update.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct UpdateProgressResponse {
    pub book_state: BookStateResponse,
    pub newly_awarded_badges: Vec<AwardResponse>,
    pub pages_delta: i32,
    pub newly_finished: bool,
    /// Present when the book was saved but the daily totals and goals were not.
    pub aggregation_error: Option<String>,
}

impl From<ProgressUpdateOutcome> for UpdateProgressResponse {
    fn from(outcome: ProgressUpdateOutcome) -> Self {
        Self {
            book_state: outcome.book_state.into(),
            newly_awarded_badges: outcome
                .newly_awarded_badges
                .into_iter()
                .map(AwardResponse::from)
                .collect(),
            pages_delta: outcome.pages_delta,
            newly_finished: outcome.newly_finished,
            aggregation_error: outcome.aggregation_error,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct StreakStatsResponse {
    pub current_streak: u32,
    pub longest_streak: u32,
}

impl From<StreakStats> for StreakStatsResponse {
    fn from(stats: StreakStats) -> Self {
        Self {
            current_streak: stats.current_streak,
            longest_streak: stats.longest_streak,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RecordMinutesRequest {
    pub minutes: i32,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DailyActivityResponse {
    pub day: NaiveDate,
    pub minutes_read: i32,
    pub pages_read: i32,
}

impl From<DailyActivityRecord> for DailyActivityResponse {
    fn from(record: DailyActivityRecord) -> Self {
        Self {
            day: record.day,
            minutes_read: record.minutes_read,
            pages_read: record.pages_read,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// How progress updates treat aggregate failures: `atomic` or `best_effort`.
    pub consistency: String,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Record a new progress value for a book in the user's library.
#[utoipa::path(
    put,
    path = "/books/{book_id}/progress",
    request_body = UpdateProgressRequest,
    responses(
        (status = 200, description = "Progress saved", body = UpdateProgressResponse),
        (status = 400, description = "Progress out of range"),
        (status = 401, description = "Missing or malformed x-user-id header"),
        (status = 404, description = "Book not found in the user's library"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("book_id" = Uuid, Path, description = "The book to update."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn update_progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(book_id): Path<Uuid>,
    Json(req): Json<UpdateProgressRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let outcome = app_state
        .engine
        .update_progress(user_id, book_id, req.progress)
        .await
        .map_err(|e| {
            error!("Failed to update progress for book {}: {:?}", book_id, e);
            engine_error_response(&e)
        })?;

    if let Some(reason) = &outcome.aggregation_error {
        warn!("Progress for book {} saved with stale totals: {}", book_id, reason);
    }

    Ok((StatusCode::OK, Json(UpdateProgressResponse::from(outcome))))
}

/// Current and longest reading streaks for the user.
#[utoipa::path(
    get,
    path = "/stats/streaks",
    responses(
        (status = 200, description = "Streak statistics", body = StreakStatsResponse),
        (status = 401, description = "Missing or malformed x-user-id header"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn streak_stats_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let stats = app_state
        .engine
        .get_streak_stats(user_id)
        .await
        .map_err(|e| {
            error!("Failed to compute streaks: {:?}", e);
            engine_error_response(&e)
        })?;

    Ok(Json(StreakStatsResponse::from(stats)))
}

/// Add reading time to today's activity.
#[utoipa::path(
    post,
    path = "/activity/minutes",
    request_body = RecordMinutesRequest,
    responses(
        (status = 200, description = "Today's updated activity", body = DailyActivityResponse),
        (status = 400, description = "Minutes must be positive"),
        (status = 401, description = "Missing or malformed x-user-id header"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn record_minutes_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<RecordMinutesRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let daily = app_state
        .engine
        .record_reading_minutes(user_id, req.minutes)
        .await
        .map_err(|e| {
            error!("Failed to record reading minutes: {:?}", e);
            engine_error_response(&e)
        })?;

    Ok(Json(DailyActivityResponse::from(daily)))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        consistency: state.config.consistency.to_string(),
    })
}
