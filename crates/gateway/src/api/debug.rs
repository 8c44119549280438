//! `/debug/tasks` introspection endpoints: a raw view of the scheduler's
//! persisted queue, for operators diagnosing a stuck task.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    let mut tasks = state.private.tasks.list().await;
    tasks.sort_by_key(|t| t.next_run_at);
    Json(tasks)
}

pub async fn update_tasks(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.update();
    StatusCode::NO_CONTENT
}
