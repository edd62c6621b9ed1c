pub mod health;
pub mod runs;
pub mod schedules;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /profiles/{id}/runs   POST  trigger a run
/// /runs/{id}            GET   run status
/// /runs/{id}/cancel     POST  cancel a running run
/// /schedules            GET   live timers with next firing times
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(runs::router())
        .merge(schedules::router())
}
