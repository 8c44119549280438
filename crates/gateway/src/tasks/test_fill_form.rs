//! Per-user task, specific course config: like fill-form but against a
//! FormFillingTest's named course, always a dry run, writing its result back
//! into the shared FormFillingTest instead of the owning user (§4.2).

use chrono::Local;
use lockbox_browser::{BrowserError, Credentials, FormComponent};
use lockbox_domain::models::{FailureEvent, FailureKind, FillFormResult, FillFormResultStatus, Task};
use uuid::Uuid;

use crate::scheduler::{HandlerResult, TaskError};
use crate::state::AppState;
use crate::tasks::context;
use crate::tasks::fill_form::to_field_value;

/// How long a finished test result stays around before its cleanup task
/// removes it (§4.2: "after 6 hours").
const TTL_HOURS: i64 = 6;

pub async fn run(state: &AppState, task: &Task) -> HandlerResult {
    let argument = task.argument.as_deref().ok_or_else(|| TaskError::fatal("test-fill-form task missing argument"))?;
    let test_id: Uuid = argument.parse().map_err(|e| TaskError::fatal(format!("bad test id {argument:?}: {e}")))?;

    let Some(mut test) = state.shared.form_filling_tests.get(&test_id).await else {
        return Ok(None);
    };
    test.in_progress = true;
    state.shared.form_filling_tests.update(&test_id, |t| t.in_progress = true).await;

    let Some(course) = state.shared.courses.get(&test.course_config).await else {
        return finish(state, test_id, Some(FailureKind::Config), "test-fill-form course configuration no longer exists", None).await;
    };
    let Some(form_url) = course.form_url.clone() else {
        return finish(state, test_id, Some(FailureKind::Config), "course has no form URL", Some(course.id)).await;
    };
    let Some(form_id) = course.form_config else {
        return finish(state, test_id, Some(FailureKind::Config), "course has no form template", Some(course.id)).await;
    };
    let Some(form) = state.shared.forms.get(&form_id).await else {
        return finish(state, test_id, Some(FailureKind::Config), "course references a missing form template", Some(course.id)).await;
    };

    let user = match &test.requested_by {
        Some(owner) => state.private.users.get(owner).await,
        None => None,
    };
    let Some(user) = user else {
        return finish(state, test_id, Some(FailureKind::Internal), "test requester no longer exists", Some(course.id)).await;
    };
    let (Some(login), Some(encrypted)) = (user.login.clone(), user.encrypted_password.clone()) else {
        return finish(state, test_id, Some(FailureKind::BadUserInfo), "requester has no stored credentials", Some(course.id)).await;
    };
    let password = match state.vault.decrypt(&encrypted) {
        Ok(p) => p,
        Err(e) => return finish(state, test_id, Some(FailureKind::Internal), &format!("decrypting stored password: {e}"), Some(course.id)).await,
    };

    let today = Local::now().date_naive();
    let day_cycle = state.current_day.get().map(|d| d.to_string()).unwrap_or_default();
    let ctx = context::build(&user, None, &course, None, today, &day_cycle);

    let mut components = Vec::with_capacity(form.sub_fields.len());
    for field in &form.sub_fields {
        match lockbox_fieldexpr::interpret(&field.target_value, &ctx) {
            Ok(value) => match to_field_value(field.kind, &value) {
                Some(field_value) => components.push(FormComponent {
                    index: field.index_on_page,
                    expected_title: field.expected_label_segment.clone().unwrap_or_default(),
                    kind: field.kind,
                    value: field_value,
                    critical: field.critical,
                }),
                None if field.critical => {
                    return finish(
                        state,
                        test_id,
                        Some(FailureKind::FormFilling),
                        &format!("field {} expression produced the wrong type", field.index_on_page),
                        Some(course.id),
                    )
                    .await;
                }
                None => tracing::warn!(field = field.index_on_page, "non-critical field expression produced the wrong type; skipping"),
            },
            Err(e) if field.critical => {
                return finish(state, test_id, Some(FailureKind::FormFilling), &format!("field {} expression failed: {e}", field.index_on_page), Some(course.id)).await;
            }
            Err(e) => tracing::warn!(field = field.index_on_page, error = %e, "non-critical field expression failed; skipping"),
        }
    }

    let credentials = Credentials { email: user.email.clone().unwrap_or_default(), login, password };

    match state.browser.fill_form(&form_url, &credentials, &components, true).await {
        Ok(outcome) => {
            let pre = state.blobs.insert(outcome.screenshot_pre).await.map_err(TaskError::from)?;
            persist_success(state, test_id, course.id, pre).await;
        }
        Err(BrowserError::PossibleFail { message, screenshot }) => {
            let screenshot_id = state.blobs.insert(screenshot).await.map_err(TaskError::from)?;
            persist_possible_failure(state, test_id, course.id, message, screenshot_id).await;
        }
        Err(e) => {
            return finish(state, test_id, Some(FailureKind::FormFilling), &e.to_string(), Some(course.id)).await;
        }
    }

    schedule_cleanup(state, test_id).await;
    Ok(None)
}

async fn persist_success(state: &AppState, test_id: Uuid, course_id: Uuid, screenshot_id: String) {
    state
        .shared
        .form_filling_tests
        .update(&test_id, |t| {
            t.in_progress = false;
            t.is_finished = true;
            t.time_executed = Some(chrono::Utc::now());
            t.fill_result = Some(FillFormResult {
                result: FillFormResultStatus::SubmitDisabled,
                time_logged: chrono::Utc::now(),
                course: Some(course_id),
                form_screenshot_id: Some(screenshot_id.clone()),
                confirmation_screenshot_id: Some(screenshot_id),
            });
        })
        .await;
    schedule_cleanup(state, test_id).await;
}

async fn persist_possible_failure(state: &AppState, test_id: Uuid, course_id: Uuid, message: String, screenshot_id: String) {
    state
        .shared
        .form_filling_tests
        .update(&test_id, |t| {
            t.in_progress = false;
            t.is_finished = true;
            t.time_executed = Some(chrono::Utc::now());
            t.errors.push(FailureEvent::new(FailureKind::FormFilling, message));
            t.fill_result = Some(FillFormResult {
                result: FillFormResultStatus::PossibleFailure,
                time_logged: chrono::Utc::now(),
                course: Some(course_id),
                form_screenshot_id: Some(screenshot_id),
                confirmation_screenshot_id: None,
            });
        })
        .await;
}

async fn finish(state: &AppState, test_id: Uuid, failure_kind: Option<FailureKind>, message: &str, course_id: Option<Uuid>) -> HandlerResult {
    state
        .shared
        .form_filling_tests
        .update(&test_id, |t| {
            t.in_progress = false;
            t.is_finished = true;
            t.time_executed = Some(chrono::Utc::now());
            if let Some(kind) = failure_kind {
                t.errors.push(FailureEvent::new(kind, message.to_string()));
            }
            t.fill_result = Some(FillFormResult {
                result: FillFormResultStatus::Failure,
                time_logged: chrono::Utc::now(),
                course: course_id,
                form_screenshot_id: None,
                confirmation_screenshot_id: None,
            });
        })
        .await;
    schedule_cleanup(state, test_id).await;
    Ok(None)
}

async fn schedule_cleanup(state: &AppState, test_id: Uuid) {
    state
        .scheduler
        .create_task(
            lockbox_domain::models::TaskKind::RemoveOldTestResults,
            Some(chrono::Utc::now() + chrono::Duration::hours(TTL_HOURS)),
            None,
            Some(test_id.to_string()),
        )
        .await;
}

