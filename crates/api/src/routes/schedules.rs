//! Schedule introspection routes.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::scheduler::ScheduleEntry;
use crate::state::AppState;

/// GET /schedules -- every live timer with its original expression, the
/// resolved expression that actually fires, and the next firing time.
async fn list_schedules(State(state): State<AppState>) -> Json<Vec<ScheduleEntry>> {
    Json(state.scheduler.entries().await)
}

/// Mount schedule routes under `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/schedules", get(list_schedules))
}
