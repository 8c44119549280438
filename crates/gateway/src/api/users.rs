//! `/user` and `/user/*` endpoints (§4.5).

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use lockbox_domain::models::{TaskKind, User};
use lockbox_portal::select_school;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::state::AppState;
use crate::time::next_window_occurrence;

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub login: Option<String>,
}

#[derive(Serialize)]
pub struct CreateUserResponse {
    pub token: String,
}

pub async fn create_user(State(state): State<AppState>, Json(body): Json<CreateUserRequest>) -> impl IntoResponse {
    let mut user = User::new(generate_token());
    user.login = body.login;
    let user = state.private.users.insert(user).await;
    (StatusCode::CREATED, Json(CreateUserResponse { token: user.token }))
}

#[derive(Deserialize, Default)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub grade: Option<i32>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials_changed = body.login.is_some() || body.password.is_some();

    if let Some(login) = body.login {
        user.login = Some(login);
    }
    if let Some(active) = body.active {
        user.active = active;
    }
    if let Some(grade) = body.grade {
        user.grade = Some(grade);
    }
    if let Some(first_name) = body.first_name {
        user.first_name = Some(first_name);
    }
    if let Some(last_name) = body.last_name {
        user.last_name = Some(last_name);
    }

    let new_password = match &body.password {
        Some(plaintext) => Some(state.vault.encrypt(plaintext).map_err(|e| ApiError::Internal(e.to_string()))?),
        None => None,
    };
    if let Some(encrypted) = &new_password {
        user.encrypted_password = Some(encrypted.clone());
    }

    if credentials_changed {
        let (Some(login), Some(encrypted)) = (user.login.clone(), user.encrypted_password.clone()) else {
            return Err(ApiError::conflict("both login and password are required once either is set"));
        };
        let password = state.vault.decrypt(&encrypted).map_err(|e| ApiError::Internal(e.to_string()))?;

        let probe = async {
            let session = state.portal.login(&login, &password).await?;
            let identity = session.identity().await?;
            let schools = session.schools().await?;
            select_school(&schools, state.config.school)?;
            Ok::<_, lockbox_domain::Error>(identity)
        }
        .await;

        match probe {
            Ok(identity) => {
                user.email = identity.email.or(user.email);
                user.first_name = identity.first_name.or(user.first_name);
                user.last_name = identity.last_name.or(user.last_name);
                user.grade = identity.grade.or(user.grade);
            }
            Err(e) => return Err(ApiError::bad_request(format!("portal rejected the new credentials: {e}"))),
        }
    }

    let updated = state.private.users.insert(user).await;

    if credentials_changed {
        state.scheduler.create_task(TaskKind::PopulateCourses, None, Some(updated.token.clone()), None).await;
    }
    if updated.active && updated.login.is_some() && updated.encrypted_password.is_some() {
        let has_fill_form_task = state
            .private
            .tasks
            .list()
            .await
            .into_iter()
            .any(|t| t.kind == TaskKind::FillForm && t.owner.as_deref() == Some(updated.token.as_str()));
        if !has_fill_form_task {
            let run_at = next_window_occurrence(state.config.fill_form_run_time);
            state.scheduler.create_task(TaskKind::FillForm, Some(run_at), Some(updated.token.clone()), None).await;
        }
    }

    Ok(Json(to_public_view(&updated)))
}

#[derive(Serialize)]
pub struct PublicUserView {
    pub login: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub grade: Option<i32>,
    pub active: bool,
    pub credentials_set: bool,
    pub errors: Vec<lockbox_domain::models::FailureEvent>,
    pub last_fill_form_result: Option<lockbox_domain::models::FillFormResult>,
}

fn to_public_view(user: &User) -> PublicUserView {
    PublicUserView {
        login: user.login.clone(),
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        grade: user.grade,
        active: user.active,
        credentials_set: user.login.is_some() && user.encrypted_password.is_some(),
        errors: user.errors.clone(),
        last_fill_form_result: user.last_fill_form_result.clone(),
    }
}

pub async fn get_user(Extension(user): Extension<User>) -> impl IntoResponse {
    Json(to_public_view(&user))
}

pub async fn delete_user(State(state): State<AppState>, Extension(user): Extension<User>) -> impl IntoResponse {
    if let Some(result) = &user.last_fill_form_result {
        if let Some(id) = &result.form_screenshot_id {
            let _ = state.blobs.delete(id).await;
        }
        if let Some(id) = &result.confirmation_screenshot_id {
            let _ = state.blobs.delete(id).await;
        }
    }
    state.private.users.delete(&user.token).await;
    StatusCode::NO_CONTENT
}

pub async fn delete_user_error(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(error_id): Path<Uuid>,
) -> impl IntoResponse {
    state.private.remove_failure_event(&user.token, error_id).await;
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
pub struct CoursesResponse {
    pub courses: Vec<Uuid>,
    pub pending: bool,
}

pub async fn get_user_courses(Extension(user): Extension<User>) -> impl IntoResponse {
    Json(CoursesResponse { pending: user.courses.is_none(), courses: user.courses.unwrap_or_default() })
}

pub async fn update_user_courses(State(state): State<AppState>, Extension(user): Extension<User>) -> Result<impl IntoResponse, ApiError> {
    if user.login.is_none() || user.encrypted_password.is_none() {
        return Err(ApiError::conflict("user has no stored credentials"));
    }
    state.scheduler.create_task(TaskKind::PopulateCourses, None, Some(user.token), None).await;
    Ok(StatusCode::NO_CONTENT)
}
