//! Per-user daily task: resolves today's async course, evaluates its form's
//! field expressions, drives the browser to fill and submit, and records the
//! outcome. See §4.2/§4.3 for the full decision sequence this mirrors.

use chrono::Local;
use lockbox_browser::{BrowserError, Credentials, FieldValue, FillFormOutcome, FormComponent};
use lockbox_domain::models::{Course, FailureEvent, FailureKind, FillFormResult, FillFormResultStatus, Task, User};
use lockbox_fieldexpr::Value;
use lockbox_portal::{select_school, PortalIdentity, TimetableItem};

use crate::scheduler::{HandlerResult, TaskError};
use crate::state::AppState;
use crate::tasks::context;
use crate::time::tomorrow_in_window;

struct Resolved {
    course: Course,
    portal_identity: Option<PortalIdentity>,
    timetable_item: Option<TimetableItem>,
}

pub async fn run(state: &AppState, task: &Task) -> HandlerResult {
    let owner = task.owner.clone().ok_or_else(|| TaskError::fatal("fill-form task missing owner"))?;
    let Some(user) = state.private.users.get(&owner).await else {
        return Ok(None);
    };
    if !(user.active && user.login.is_some() && user.encrypted_password.is_some()) {
        return Ok(None);
    }
    let login = user.login.clone().expect("checked above");
    let encrypted = user.encrypted_password.clone().expect("checked above");

    let password = match state.vault.decrypt(&encrypted) {
        Ok(p) => p,
        Err(e) => {
            lockbox_domain::trace::TraceEvent::VaultDecryptFailed { user_token_prefix: &owner[..8.min(owner.len())] }.emit();
            record_failure(state, &owner, FailureKind::Internal, format!("decrypting stored password: {e}")).await;
            return Ok(None);
        }
    };

    let resolved = match resolve_via_portal(state, &login, &password).await {
        PortalResolution::Found(r) => Some(r),
        PortalResolution::NoAsyncCourseToday => None,
        PortalResolution::Unreachable => match resolve_from_stored(state, &user).await {
            StoredResolution::Found(r) => Some(r),
            StoredResolution::NoAsyncCourseToday => None,
            StoredResolution::CurrentDayUnknown => {
                return retry_or_give_up(state, task, "current day is unknown; waiting for check-day".to_string());
            }
        },
    };

    let Some(Resolved { course, portal_identity, timetable_item }) = resolved else {
        return Ok(Some(fill_form_tomorrow(state)));
    };

    if !course.has_attendance_form {
        return Ok(Some(fill_form_tomorrow(state)));
    }
    let Some(form_url) = course.form_url.clone() else {
        record_failure(state, &owner, FailureKind::Config, format!("course {} has no form URL", course.course_code)).await;
        return Ok(Some(fill_form_tomorrow(state)));
    };
    if course.form_config.is_none() {
        record_failure(state, &owner, FailureKind::Config, format!("course {} has no form template", course.course_code)).await;
        return Ok(Some(fill_form_tomorrow(state)));
    }
    let Some(form) = state.shared.forms.get(&course.form_config.unwrap()).await else {
        record_failure(state, &owner, FailureKind::Config, format!("course {} references a missing form template", course.course_code)).await;
        return Ok(Some(fill_form_tomorrow(state)));
    };

    let today = Local::now().date_naive();
    let day_cycle = state.current_day.get().map(|d| d.to_string()).unwrap_or_default();
    let ctx = context::build(&user, portal_identity.as_ref(), &course, timetable_item.as_ref(), today, &day_cycle);

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
                    return retry_or_give_up(
                        state,
                        task,
                        format!("field {} expression produced a {} value, expected {:?}", field.index_on_page, value.type_name(), field.kind),
                    );
                }
                None => tracing::warn!(field = field.index_on_page, "non-critical field expression produced the wrong type; skipping"),
            },
            Err(e) if field.critical => {
                return retry_or_give_up(state, task, format!("field {} expression failed: {e}", field.index_on_page));
            }
            Err(e) => tracing::warn!(field = field.index_on_page, error = %e, "non-critical field expression failed; skipping"),
        }
    }

    let credentials = Credentials { email: user.email.clone().unwrap_or_default(), login, password };
    let dry_run = !state.config.fill_form_submit_enabled;

    match state.browser.fill_form(&form_url, &credentials, &components, dry_run).await {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                tracing::warn!(message = %warning.message, "non-critical field could not be filled");
            }
            finish_success(state, &owner, &course, dry_run, outcome).await
        }
        Err(BrowserError::AuthFailed(message)) => {
            record_failure(state, &owner, FailureKind::FormFilling, message).await;
            persist_result(state, &owner, FillFormResult {
                result: FillFormResultStatus::Failure,
                time_logged: chrono::Utc::now(),
                course: Some(course.id),
                form_screenshot_id: None,
                confirmation_screenshot_id: None,
            }).await;
            Ok(Some(fill_form_tomorrow(state)))
        }
        Err(BrowserError::PossibleFail { message, screenshot }) => {
            record_failure(state, &owner, FailureKind::FormFilling, message).await;
            let screenshot_id = state.blobs.insert(screenshot).await.map_err(TaskError::from)?;
            persist_result(state, &owner, FillFormResult {
                result: FillFormResultStatus::PossibleFailure,
                time_logged: chrono::Utc::now(),
                course: Some(course.id),
                form_screenshot_id: Some(screenshot_id),
                confirmation_screenshot_id: None,
            }).await;
            // Never retried: retrying risks a duplicate submission.
            Ok(Some(fill_form_tomorrow(state)))
        }
        Err(BrowserError::InvalidForm(message)) => {
            record_failure(state, &owner, FailureKind::FormFilling, message.clone()).await;
            retry_or_give_up(state, task, message)
        }
        Err(BrowserError::Driver(message)) => {
            record_failure(state, &owner, FailureKind::Internal, message.clone()).await;
            retry_or_give_up(state, task, message)
        }
    }
}

async fn finish_success(state: &AppState, owner: &str, course: &Course, dry_run: bool, outcome: FillFormOutcome) -> HandlerResult {
    let (form_screenshot_id, confirmation_screenshot_id, status) = if dry_run {
        let id = state.blobs.insert(outcome.screenshot_pre).await.map_err(TaskError::from)?;
        (Some(id.clone()), Some(id), FillFormResultStatus::SubmitDisabled)
    } else {
        let pre = state.blobs.insert(outcome.screenshot_pre).await.map_err(TaskError::from)?;
        let post = state.blobs.insert(outcome.screenshot_post).await.map_err(TaskError::from)?;
        (Some(pre), Some(post), FillFormResultStatus::Success)
    };

    persist_result(state, owner, FillFormResult {
        result: status,
        time_logged: chrono::Utc::now(),
        course: Some(course.id),
        form_screenshot_id,
        confirmation_screenshot_id,
    })
    .await;

    Ok(Some(fill_form_tomorrow(state)))
}

enum PortalResolution {
    Found(Resolved),
    /// The portal was reachable but today's timetable has no async period.
    NoAsyncCourseToday,
    Unreachable,
}

/// Any portal-side error during the live probe (login, school selection, or
/// timetable fetch) is treated uniformly as "unreachable" and falls back to
/// stored data — fill-form favours resilient at-most-once submission over a
/// precise live/transient distinction.
async fn resolve_via_portal(state: &AppState, login: &str, password: &str) -> PortalResolution {
    let attempt = async {
        let session = state.portal.login(login, password).await?;
        let identity = session.identity().await.ok();
        let schools = session.schools().await?;
        let school = select_school(&schools, state.config.school)?;
        let today = Local::now().date_naive();
        let timetable = session.timetable(&school.id, today).await?;
        let async_items: Vec<TimetableItem> = timetable.into_iter().filter(|i| i.course_period.ends_with('a')).collect();
        Ok::<_, lockbox_domain::Error>((identity, async_items))
    }
    .await;

    let (identity, mut async_items) = match attempt {
        Ok(v) => v,
        Err(_) => return PortalResolution::Unreachable,
    };

    if async_items.len() > 1 {
        tracing::warn!(count = async_items.len(), "more than one async course today; using the first");
    }
    let Some(item) = (!async_items.is_empty()).then(|| async_items.remove(0)) else {
        return PortalResolution::NoAsyncCourseToday;
    };

    let Some(course) = state.shared.find_course_by_code(&item.course_code).await else {
        return PortalResolution::NoAsyncCourseToday;
    };
    PortalResolution::Found(Resolved { course, portal_identity: identity, timetable_item: Some(item) })
}

enum StoredResolution {
    Found(Resolved),
    NoAsyncCourseToday,
    CurrentDayUnknown,
}

async fn resolve_from_stored(state: &AppState, user: &User) -> StoredResolution {
    let Some(current_day) = state.current_day.get() else {
        return StoredResolution::CurrentDayUnknown;
    };
    if current_day == -1 {
        return StoredResolution::NoAsyncCourseToday;
    }

    for course_id in user.courses.clone().unwrap_or_default() {
        let Some(course) = state.shared.courses.get(&course_id).await else { continue };
        if course.has_slot_for_cycle_day(current_day) {
            return StoredResolution::Found(Resolved { course, portal_identity: None, timetable_item: None });
        }
    }
    StoredResolution::NoAsyncCourseToday
}

pub(crate) fn to_field_value(kind: lockbox_domain::models::FormFieldKind, value: &Value) -> Option<FieldValue> {
    use lockbox_domain::models::FormFieldKind::*;
    match (kind, value) {
        (Text | LongText, Value::Str(s)) => Some(FieldValue::Text(s.clone())),
        (Date, Value::Date(d)) => Some(FieldValue::Date(*d)),
        (MultipleChoice | Checkbox | Dropdown, Value::Int(n)) if *n >= 0 => Some(FieldValue::OptionIndex(*n as u32)),
        _ => None,
    }
}

fn fill_form_tomorrow(state: &AppState) -> chrono::DateTime<chrono::Utc> {
    tomorrow_in_window(state.config.fill_form_run_time)
}

fn retry_or_give_up(state: &AppState, task: &Task, message: String) -> HandlerResult {
    if task.retry_count < state.config.fill_form_retry_limit {
        Err(TaskError::retry_in(message, state.config.fill_form_retry_in_seconds))
    } else {
        Ok(Some(fill_form_tomorrow(state)))
    }
}

async fn record_failure(state: &AppState, owner: &str, kind: FailureKind, message: impl Into<String>) {
    state.private.push_failure_event(owner, FailureEvent::new(kind, message)).await;
}

/// Persists the new result, first removing the previous result's screenshots
/// (owned solely by that result; nothing else references them).
async fn persist_result(state: &AppState, owner: &str, result: FillFormResult) {
    if let Some(previous) = state.private.users.get(&owner.to_string()).await.and_then(|u| u.last_fill_form_result) {
        if let Some(id) = previous.form_screenshot_id {
            let _ = state.blobs.delete(&id).await;
        }
        if let Some(id) = previous.confirmation_screenshot_id {
            let _ = state.blobs.delete(&id).await;
        }
    }
    state.private.users.update(&owner.to_string(), |u| u.last_fill_form_result = Some(result)).await;
}
