//! API authentication middleware.
//!
//! There is no separate admin secret: the bearer token a caller presents
//! *is* a User's own 64-hex `token` (§3). The matched [`User`] is attached to
//! the request as an extension so downstream handlers don't re-look it up.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lockbox_domain::models::User;

use crate::api::error::ApiError;
use crate::state::AppState;

pub async fn require_user_token(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let Some(user) = state.private.users.get(&provided.to_string()).await else {
        return ApiError::BadToken.into_response();
    };

    req.extensions_mut().insert::<User>(user);
    next.run(req).await
}
