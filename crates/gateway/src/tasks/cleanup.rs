//! Ownerless one-shot cleanup tasks: each is scheduled by its sibling task
//! (get-form-geometry, test-fill-form) with the target document's id as its
//! argument, and simply deletes it (plus any owned screenshot) on arrival.

use lockbox_domain::models::Task;
use uuid::Uuid;

use crate::scheduler::{HandlerResult, TaskError};
use crate::state::AppState;

pub async fn remove_old_form_geometry(state: &AppState, task: &Task) -> HandlerResult {
    let argument = task.argument.as_deref().ok_or_else(|| TaskError::fatal("remove-old-form-geometry task missing argument"))?;
    let id: Uuid = argument.parse().map_err(|e| TaskError::fatal(format!("bad geometry id {argument:?}: {e}")))?;

    if let Some(entry) = state.private.form_geometry.get(&id).await {
        if let Some(screenshot_id) = entry.screenshot_file_id {
            let _ = state.blobs.delete(&screenshot_id).await;
        }
    }
    state.private.form_geometry.delete(&id).await;
    Ok(None)
}

pub async fn remove_old_test_results(state: &AppState, task: &Task) -> HandlerResult {
    let argument = task.argument.as_deref().ok_or_else(|| TaskError::fatal("remove-old-test-results task missing argument"))?;
    let id: Uuid = argument.parse().map_err(|e| TaskError::fatal(format!("bad test result id {argument:?}: {e}")))?;

    if let Some(test) = state.shared.form_filling_tests.get(&id).await {
        if let Some(result) = test.fill_result {
            if let Some(screenshot_id) = result.form_screenshot_id {
                let _ = state.blobs.delete(&screenshot_id).await;
            }
            if let Some(screenshot_id) = result.confirmation_screenshot_id {
                let _ = state.blobs.delete(&screenshot_id).await;
            }
        }
    }
    state.shared.form_filling_tests.delete(&id).await;
    Ok(None)
}
