//! Singleton, ownerless task: finds today's day-cycle name using the first
//! user whose credentials still work against the portal, and keeps the
//! process-local `current_day` cell in sync for fill-form's stored-data
//! fallback path.

use chrono::{Duration, Local};
use lockbox_domain::models::{Task, TaskKind};
use lockbox_portal::{day_name_today, parse_cycle_day, select_school};

use crate::scheduler::{HandlerResult, TaskError};
use crate::state::AppState;
use crate::time::tomorrow_in_window;

pub async fn run(state: &AppState, task: &Task) -> HandlerResult {
    let candidates: Vec<_> = state
        .private
        .users
        .list()
        .await
        .into_iter()
        .filter(|u| u.active && u.login.is_some() && u.encrypted_password.is_some())
        .collect();

    for user in &candidates {
        let Some(encrypted) = &user.encrypted_password else { continue };
        let Ok(password) = state.vault.decrypt(encrypted) else { continue };
        let login = user.login.clone().expect("filtered above");

        let Ok(session) = state.portal.login(&login, &password).await else { continue };
        let Ok(schools) = session.schools().await else { continue };
        let Ok(school) = select_school(&schools, state.config.school) else { continue };
        let today = Local::now().date_naive();
        let Ok(day_name) = day_name_today(session.as_ref(), &school.id, today).await else { continue };

        let next_run_at = match parse_cycle_day(&day_name) {
            Some(cycle_day) => {
                state.current_day.set(cycle_day as i32);
                tomorrow_in_window(state.config.check_day_run_time)
            }
            None => {
                state.current_day.set(-1);
                push_fill_form_tasks_forward(state).await;
                tomorrow_in_window(state.config.check_day_run_time)
            }
        };
        return Ok(Some(next_run_at));
    }

    if task.retry_count < 1 {
        return Err(TaskError::retry_in("no user credentials worked against the portal", 3600));
    }
    state.current_day.clear();
    Ok(Some(tomorrow_in_window(state.config.check_day_run_time)))
}

/// Pushes every fill-form task scheduled within today (local) forward by
/// 24 hours: check-day just determined there is no school today.
async fn push_fill_form_tasks_forward(state: &AppState) {
    let today = Local::now().date_naive();
    for t in state.private.tasks.list().await {
        if t.kind != TaskKind::FillForm || t.next_run_at.with_timezone(&Local).date_naive() != today {
            continue;
        }
        state.private.push_task_next_run_at(t.id, t.next_run_at + Duration::hours(24)).await;
    }
    state.scheduler.update();
}
