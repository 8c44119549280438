//! Per-user task: refreshes a user's async-course set from the portal
//! timetable, upserting shared Course documents by code.

use chrono::Local;
use lockbox_domain::models::Task;
use lockbox_portal::{async_courses_by_cycle_day, select_school};

use crate::scheduler::{HandlerResult, TaskError};
use crate::state::AppState;

const RETRY_IN_SECONDS: u64 = 600;
const RETRY_LIMIT: u32 = 12;

pub async fn run(state: &AppState, task: &Task) -> HandlerResult {
    let owner = task.owner.clone().ok_or_else(|| TaskError::fatal("populate-courses task missing owner"))?;
    let Some(user) = state.private.users.get(&owner).await else {
        return Ok(None);
    };
    let (Some(login), Some(encrypted)) = (user.login.clone(), user.encrypted_password.clone()) else {
        return Ok(None);
    };
    let password = state.vault.decrypt(&encrypted).map_err(|e| TaskError::fatal(format!("decrypting password: {e}")))?;

    state.private.users.update(&owner, |u| u.courses = None).await;

    let result = async {
        let session = state.portal.login(&login, &password).await?;
        let schools = session.schools().await?;
        let school = select_school(&schools, state.config.school)?;
        let today = Local::now().date_naive();
        async_courses_by_cycle_day(session.as_ref(), &school.id, today).await
    }
    .await;

    let by_cycle_day = match result {
        Ok(v) => v,
        Err(e) => {
            if task.retry_count < RETRY_LIMIT {
                return Err(TaskError::retry_in(e.to_string(), RETRY_IN_SECONDS));
            }
            return Ok(None);
        }
    };

    let mut course_ids = Vec::new();
    for (cycle_day, items) in &by_cycle_day {
        for item in items {
            let slot = format!("{cycle_day}-{}", item.course_period);
            let course = state
                .shared
                .upsert_course_by_code(&item.course_code, |c| {
                    if !c.known_slots.contains(&slot) {
                        c.known_slots.push(slot.clone());
                    }
                    if c.teacher_name.is_empty() {
                        c.teacher_name = item.teacher_name.clone();
                    }
                })
                .await;
            if !course_ids.contains(&course.id) {
                course_ids.push(course.id);
            }
        }
    }

    state.private.users.update(&owner, |u| u.courses = Some(course_ids)).await;

    Ok(None)
}
