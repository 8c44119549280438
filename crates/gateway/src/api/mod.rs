pub mod auth;
pub mod debug;
pub mod error;
pub mod forms;
pub mod users;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Builds the full API router. Routes split into **public** (`POST /user`
/// only — creating an account has no token to present yet) and
/// **protected** (every other endpoint, gated behind the bearer-token
/// middleware in [`auth`]).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/user", post(users::create_user));

    let protected = Router::new()
        .route("/user", axum::routing::patch(users::update_user))
        .route("/user", get(users::get_user))
        .route("/user", delete(users::delete_user))
        .route("/user/error/:id", delete(users::delete_user_error))
        .route("/user/courses", get(users::get_user_courses))
        .route("/user/courses/update", post(users::update_user_courses))
        .route("/form_geometry", post(forms::request_form_geometry))
        .route("/update_all_courses", post(forms::update_all_courses))
        .route("/test_form", post(forms::test_form))
        .route("/debug/tasks", get(debug::list_tasks))
        .route("/debug/tasks/update", post(debug::update_tasks))
        .route_layer(middleware::from_fn_with_state(state, auth::require_user_token));

    public.merge(protected)
}
