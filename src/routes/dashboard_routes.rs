use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::middleware::auth_context::AuthContext;
use crate::models::{ApiOk, AppState};
use crate::views::{self, Dashboard};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/dashboard", get(dashboard))
}

#[derive(Serialize)]
pub struct HealthData {
    pub ok: bool,
}

pub async fn health() -> Json<ApiOk<HealthData>> {
    Json(ApiOk::new(HealthData { ok: true }))
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    /// Caller's calendar date. Wins over `tz_offset_minutes`.
    pub today: Option<NaiveDate>,
    /// Caller's UTC offset, used to derive "today" from the engine clock.
    pub tz_offset_minutes: Option<i32>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<DashboardQuery>,
) -> Result<Json<ApiOk<Dashboard>>, ApiError> {
    let now = state.engine.now();

    let today = match (q.today, q.tz_offset_minutes) {
        (Some(d), _) => d,
        (None, Some(mins)) => {
            let offset = mins
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| {
                    ApiError::BadRequest(
                        "VALIDATION_ERROR",
                        "tz_offset_minutes must be within +/- 1439".into(),
                    )
                })?;
            now.with_timezone(&offset).date_naive()
        }
        (None, None) => now.date_naive(),
    };

    let books = state.engine.snapshot();
    let board = views::build_dashboard(&books, auth.actor(), today, now, state.engine.config());
    Ok(Json(ApiOk::new(board)))
}
