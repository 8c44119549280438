//! Per-user task: classifies every question on a form page without filling
//! anything in, for the `/form_geometry` API flow (§4.2, §4.3.2).

use lockbox_domain::models::{CachedFormGeometry, FormGeometryEntry, Task};
use uuid::Uuid;

use crate::scheduler::{HandlerResult, TaskError};
use crate::state::AppState;

/// How long a finished geometry result stays around before its cleanup task
/// removes it (§4.2: "15 minutes later").
const TTL_MINUTES: i64 = 15;

pub async fn run(state: &AppState, task: &Task) -> HandlerResult {
    let argument = task.argument.as_deref().ok_or_else(|| TaskError::fatal("get-form-geometry task missing argument"))?;
    let geometry_id: Uuid = argument.parse().map_err(|e| TaskError::fatal(format!("bad geometry id {argument:?}: {e}")))?;

    let Some(entry) = state.private.form_geometry.get(&geometry_id).await else {
        return Ok(None);
    };

    let credentials = match &entry.requested_by {
        Some(owner) => match state.private.users.get(owner).await {
            Some(user) => {
                let (Some(login), Some(encrypted)) = (user.login.clone(), user.encrypted_password.clone()) else {
                    return finish_with_error(state, geometry_id, "requesting user has no stored credentials").await;
                };
                let password = match state.vault.decrypt(&encrypted) {
                    Ok(p) => p,
                    Err(e) => return finish_with_error(state, geometry_id, &format!("decrypting stored password: {e}")).await,
                };
                lockbox_browser::Credentials { email: user.email.unwrap_or_default(), login, password }
            }
            None => return finish_with_error(state, geometry_id, "requesting user no longer exists").await,
        },
        None => return finish_with_error(state, geometry_id, "geometry request has no owning user").await,
    };

    match state.browser.get_form_geometry(&entry.url, &credentials).await {
        Ok(outcome) => {
            let screenshot_id = state.blobs.insert(outcome.screenshot).await.map_err(TaskError::from)?;
            let geometry: Vec<FormGeometryEntry> =
                outcome.fields.into_iter().map(|f| FormGeometryEntry { index: f.index, title: f.title, kind: f.kind }).collect();
            state
                .private
                .form_geometry
                .update(&geometry_id, |g| {
                    g.geometry = Some(geometry);
                    g.auth_required = Some(outcome.auth_required);
                    g.screenshot_file_id = Some(screenshot_id);
                    g.response_status = Some(200);
                })
                .await;
        }
        Err(e) => {
            return finish_with_error(state, geometry_id, &e.to_string()).await;
        }
    }

    schedule_cleanup(state, geometry_id).await;
    Ok(None)
}

async fn finish_with_error(state: &AppState, geometry_id: Uuid, message: &str) -> HandlerResult {
    state
        .private
        .form_geometry
        .update(&geometry_id, |g: &mut CachedFormGeometry| {
            g.error = Some(message.to_string());
            g.response_status = Some(500);
        })
        .await;
    schedule_cleanup(state, geometry_id).await;
    Ok(None)
}

async fn schedule_cleanup(state: &AppState, geometry_id: Uuid) {
    state
        .scheduler
        .create_task(
            lockbox_domain::models::TaskKind::RemoveOldFormGeometry,
            Some(chrono::Utc::now() + chrono::Duration::minutes(TTL_MINUTES)),
            None,
            Some(geometry_id.to_string()),
        )
        .await;
}
