//! The cooperative task loop (§4.1): selects the earliest non-running task,
//! respects per-kind rate-limit groups, and applies the handler result
//! semantics (reschedule / retry / delete) uniformly across task kinds.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use lockbox_domain::models::{FailureKind, Task, TaskKind};
use lockbox_domain::trace::TraceEvent;
use tokio::sync::Notify;

use crate::state::AppState;

mod groups;

pub use groups::RateLimitGroups;

/// A task handler's outcome: `Ok(Some(ts))` reschedules for `ts`, `Ok(None)`
/// deletes the task on success, `Err` applies [`TaskError`]'s semantics.
pub type HandlerResult = Result<Option<DateTime<Utc>>, TaskError>;

/// A handler failure. `retry_in` set means "retry after this many seconds,
/// incrementing `retry_count`"; `retry_in` unset means "give up, delete the
/// task" — the "any other exception" branch of §4.1.
#[derive(Debug)]
pub struct TaskError {
    pub message: String,
    pub retry_in: Option<u64>,
    pub failure_kind: FailureKind,
}

impl TaskError {
    pub fn retry_in(message: impl Into<String>, seconds: u64) -> Self {
        Self { message: message.into(), retry_in: Some(seconds), failure_kind: FailureKind::Unknown }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), retry_in: None, failure_kind: FailureKind::Internal }
    }

    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.failure_kind = kind;
        self
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<lockbox_domain::Error> for TaskError {
    fn from(e: lockbox_domain::Error) -> Self {
        TaskError::fatal(e.to_string())
    }
}

/// How far past `next_run_at` a task can be selected before we warn.
const LATENESS_WARNING: StdDuration = StdDuration::from_millis(100);

/// How far a task is pushed back when its rate-limit group is saturated.
const RATE_LIMIT_PUSHBACK_SECONDS: i64 = 30;

pub struct Scheduler {
    store: Arc<lockbox_store::PrivateStore>,
    groups: RateLimitGroups,
    notify: Notify,
}

impl Scheduler {
    pub fn new(store: Arc<lockbox_store::PrivateStore>) -> Arc<Self> {
        Arc::new(Self { store, groups: RateLimitGroups::new(), notify: Notify::new() })
    }

    /// Idempotent startup: resets crash-orphaned `is_running` tasks, then
    /// spawns the main loop on the current Tokio runtime.
    pub async fn start(self: &Arc<Self>, state: AppState) {
        let reset = self.store.reset_running_tasks().await;
        if reset > 0 {
            tracing::warn!(count = reset, "reset tasks left running across a restart");
        }
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run(state).await });
    }

    pub async fn create_task(
        &self,
        kind: TaskKind,
        run_at: Option<DateTime<Utc>>,
        owner: Option<String>,
        argument: Option<String>,
    ) -> Task {
        let mut task = Task::new(kind, run_at.unwrap_or_else(Utc::now));
        task.owner = owner;
        task.argument = argument;
        let task = self.store.tasks.insert(task).await;
        self.update();
        task
    }

    /// Signals that persisted task state may have changed; wakes the loop
    /// early instead of waiting out its current sleep.
    pub fn update(&self) {
        self.notify.notify_one();
    }

    async fn run(self: Arc<Self>, state: AppState) {
        loop {
            let candidate = self
                .store
                .tasks
                .list()
                .await
                .into_iter()
                .filter(|t| !t.is_running)
                .min_by_key(|t| t.next_run_at);

            let Some(task) = candidate else {
                self.notify.notified().await;
                continue;
            };

            let now = Utc::now();
            if task.next_run_at > now {
                let wait = (task.next_run_at - now).to_std().unwrap_or(StdDuration::ZERO);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.notify.notified() => continue,
                }
            }

            let now = Utc::now();
            let lateness = (now - task.next_run_at).to_std().unwrap_or(StdDuration::ZERO);
            if lateness > LATENESS_WARNING {
                TraceEvent::SchedulerLate { task_id: task.id, lateness_ms: lateness.as_millis() as u64 }.emit();
            }

            let groups = task.kind.rate_limit_groups();
            if !self.groups.try_acquire_all(groups) {
                let pushed_to = task.next_run_at + chrono::Duration::seconds(RATE_LIMIT_PUSHBACK_SECONDS);
                for group in groups {
                    TraceEvent::RateLimitDeferred {
                        task_id: task.id,
                        group: *group,
                        push_forward_seconds: RATE_LIMIT_PUSHBACK_SECONDS as u64,
                    }
                    .emit();
                }
                self.store.push_task_next_run_at(task.id, pushed_to).await;
                continue;
            }

            self.store.set_task_running(task.id, true).await;

            let scheduler = self.clone();
            let state = state.clone();
            tokio::spawn(async move {
                scheduler.dispatch(&state, task).await;
            });
        }
    }

    async fn dispatch(self: Arc<Self>, state: &AppState, task: Task) {
        TraceEvent::TaskDispatched { task_id: task.id, kind: task.kind, owner: task.owner.as_deref() }.emit();
        let started = std::time::Instant::now();

        let result = crate::tasks::dispatch(state, &task).await;

        self.groups.release_all(task.kind.rate_limit_groups());

        match result {
            Ok(Some(next_run_at)) => {
                self.store
                    .tasks
                    .update(&task.id, |t| {
                        t.next_run_at = next_run_at;
                        t.is_running = false;
                        t.retry_count = 0;
                    })
                    .await;
                TraceEvent::TaskSucceeded { task_id: task.id, kind: task.kind, duration_ms: started.elapsed().as_millis() as u64 }.emit();
            }
            Ok(None) => {
                self.store.tasks.delete(&task.id).await;
                TraceEvent::TaskSucceeded { task_id: task.id, kind: task.kind, duration_ms: started.elapsed().as_millis() as u64 }.emit();
            }
            Err(err) => {
                TraceEvent::TaskFailed {
                    task_id: task.id,
                    kind: task.kind,
                    failure_kind: err.failure_kind,
                    message: &err.message,
                    retry_count: task.retry_count,
                }
                .emit();
                match err.retry_in {
                    Some(seconds) => {
                        self.store
                            .tasks
                            .update(&task.id, |t| {
                                t.next_run_at = Utc::now() + chrono::Duration::seconds(seconds as i64);
                                t.is_running = false;
                                t.retry_count += 1;
                            })
                            .await;
                        TraceEvent::TaskRetryScheduled { task_id: task.id, kind: task.kind, retry_in_seconds: seconds }.emit();
                    }
                    None => {
                        self.store.tasks.delete(&task.id).await;
                    }
                }
            }
        }
        self.update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_task_defaults_run_at_to_now() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(lockbox_store::PrivateStore::new(dir.path()));
        let scheduler = Scheduler::new(store.clone());
        let before = Utc::now();
        let task = scheduler.create_task(TaskKind::CheckDay, None, None, None).await;
        assert!(task.next_run_at >= before);
        assert!(store.tasks.get(&task.id).await.is_some());
    }

    #[test]
    fn task_error_retry_in_carries_seconds() {
        let err = TaskError::retry_in("transient", 600);
        assert_eq!(err.retry_in, Some(600));
    }

    #[test]
    fn task_error_fatal_has_no_retry() {
        let err = TaskError::fatal("boom");
        assert_eq!(err.retry_in, None);
    }
}
