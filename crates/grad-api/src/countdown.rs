use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;

use grad_types::countdown::countdown;

use crate::state::AppState;

pub async fn get_countdown(State(state): State<AppState>) -> impl IntoResponse {
    Json(countdown(
        state.countdown_start,
        state.countdown_target,
        Utc::now(),
    ))
}
