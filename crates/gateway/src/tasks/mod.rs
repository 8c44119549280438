//! Task-kind to handler dispatch table (§4.2).

pub mod check_day;
pub mod cleanup;
pub mod context;
pub mod fill_form;
pub mod geometry;
pub mod populate_courses;
pub mod test_fill_form;

use lockbox_domain::models::{Task, TaskKind};

use crate::scheduler::HandlerResult;
use crate::state::AppState;

pub async fn dispatch(state: &AppState, task: &Task) -> HandlerResult {
    match task.kind {
        TaskKind::CheckDay => check_day::run(state, task).await,
        TaskKind::PopulateCourses => populate_courses::run(state, task).await,
        TaskKind::FillForm => fill_form::run(state, task).await,
        TaskKind::GetFormGeometry => geometry::run(state, task).await,
        TaskKind::TestFillForm => test_fill_form::run(state, task).await,
        TaskKind::RemoveOldFormGeometry => cleanup::remove_old_form_geometry(state, task).await,
        TaskKind::RemoveOldTestResults => cleanup::remove_old_test_results(state, task).await,
    }
}
