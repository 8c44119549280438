//! `/form_geometry`, `/update_all_courses`, `/test_form` endpoints (§4.5).

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use lockbox_domain::models::{CachedFormGeometry, FormFillingTest, FormGeometryEntry, TaskKind, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FormGeometryRequest {
    pub url: String,
    #[serde(default)]
    pub grab_screenshot: bool,
}

#[derive(Serialize)]
pub struct FormGeometryResponse {
    pub pending: bool,
    pub geometry: Option<Vec<FormGeometryEntry>>,
    pub auth_required: Option<bool>,
    pub screenshot_file_id: Option<String>,
    pub response_status: Option<u16>,
    pub error: Option<String>,
}

impl From<&CachedFormGeometry> for FormGeometryResponse {
    fn from(entry: &CachedFormGeometry) -> Self {
        Self {
            pending: entry.geometry.is_none() && entry.error.is_none(),
            geometry: entry.geometry.clone(),
            auth_required: entry.auth_required,
            screenshot_file_id: entry.screenshot_file_id.clone(),
            response_status: entry.response_status,
            error: entry.error.clone(),
        }
    }
}

pub async fn request_form_geometry(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(body): Json<FormGeometryRequest>,
) -> impl IntoResponse {
    let _ = body.grab_screenshot; // screenshots are always captured; kept for API compatibility.

    if let Some(existing) = state.private.find_form_geometry_by_url(&body.url).await {
        return Json(FormGeometryResponse::from(&existing));
    }

    let entry = CachedFormGeometry::pending(body.url, Some(user.token.clone()));
    let entry = state.private.form_geometry.insert(entry).await;
    state
        .scheduler
        .create_task(TaskKind::GetFormGeometry, None, Some(user.token), Some(entry.id.to_string()))
        .await;
    Json(FormGeometryResponse::from(&entry))
}

/// `POST /update_all_courses`: enqueues a populate-courses task for every
/// user with complete credentials, `update_courses_batch_size` at a time,
/// `update_courses_interval_seconds` apart — returns immediately, the batches
/// trickle out in the background.
pub async fn update_all_courses(State(state): State<AppState>) -> impl IntoResponse {
    let owners: Vec<String> = state
        .private
        .users
        .list()
        .await
        .into_iter()
        .filter(|u| u.login.is_some() && u.encrypted_password.is_some())
        .map(|u| u.token)
        .collect();

    let batch_size = state.config.update_courses_batch_size.max(1) as usize;
    let interval = std::time::Duration::from_secs(state.config.update_courses_interval_seconds);

    tokio::spawn(async move {
        for batch in owners.chunks(batch_size) {
            for owner in batch {
                state.scheduler.create_task(TaskKind::PopulateCourses, None, Some(owner.clone()), None).await;
            }
            tokio::time::sleep(interval).await;
        }
    });

    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
pub struct TestFormRequest {
    pub test_setup_id: Uuid,
}

pub async fn test_form(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(body): Json<TestFormRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if state.shared.courses.get(&body.test_setup_id).await.is_none() {
        return Err(ApiError::bad_request("test_setup_id does not reference a known course"));
    }

    let test = FormFillingTest::new(body.test_setup_id, Some(user.token.clone()));
    let test = state.shared.form_filling_tests.insert(test).await;
    state
        .scheduler
        .create_task(TaskKind::TestFillForm, None, Some(user.token), Some(test.id.to_string()))
        .await;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "test_id": test.id }))))
}
