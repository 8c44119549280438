use std::path::Path;

use chrono::{DateTime, Utc};
use lockbox_domain::models::{CachedFormGeometry, FailureEvent, Task, User};
use uuid::Uuid;

use crate::doc_store::DocStore;

/// The `private` logical database: User, Task, CachedFormGeometry. Unique on
/// `User.token`, `User.login`, and `CachedFormGeometry.url`.
pub struct PrivateStore {
    pub users: DocStore<String, User>,
    pub tasks: DocStore<Uuid, Task>,
    pub form_geometry: DocStore<Uuid, CachedFormGeometry>,
}

impl PrivateStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            users: DocStore::new(state_dir.join("users.json"), |u: &User| u.token.clone()),
            tasks: DocStore::new(state_dir.join("tasks.json"), |t: &Task| t.id),
            form_geometry: DocStore::new(state_dir.join("form_geometry.json"), |g: &CachedFormGeometry| g.id),
        }
    }

    pub async fn find_user_by_login(&self, login: &str) -> Option<User> {
        self.users.list().await.into_iter().find(|u| u.login.as_deref() == Some(login))
    }

    pub async fn find_form_geometry_by_url(&self, url: &str) -> Option<CachedFormGeometry> {
        self.form_geometry.list().await.into_iter().find(|g| g.url == url)
    }

    /// Atomic `$push` onto `User.errors`, avoiding a lost update against a
    /// concurrent read-then-write on the same document.
    pub async fn push_failure_event(&self, token: &str, event: FailureEvent) -> Option<User> {
        self.users
            .update(&token.to_string(), |u| {
                u.errors.push(event);
            })
            .await
    }

    /// Atomic `$pull` of one failure event by id.
    pub async fn remove_failure_event(&self, token: &str, event_id: Uuid) -> Option<User> {
        self.users
            .update(&token.to_string(), |u| {
                u.errors.retain(|e| e.id != event_id);
            })
            .await
    }

    /// Atomic `next_run_at` push, used when rescheduling a running task from
    /// within its own handler without racing a concurrent API read.
    pub async fn push_task_next_run_at(&self, task_id: Uuid, next_run_at: DateTime<Utc>) -> Option<Task> {
        self.tasks
            .update(&task_id, |t| {
                t.next_run_at = next_run_at;
                t.is_running = false;
            })
            .await
    }

    pub async fn set_task_running(&self, task_id: Uuid, running: bool) -> Option<Task> {
        self.tasks.update(&task_id, |t| t.is_running = running).await
    }

    /// Crash recovery: reset every task left `is_running=true` from a prior
    /// process, logging a warning for each.
    pub async fn reset_running_tasks(&self) -> usize {
        let running: Vec<Uuid> = self.tasks.list().await.into_iter().filter(|t| t.is_running).map(|t| t.id).collect();
        for id in &running {
            tracing::warn!(task_id = %id, "resetting task left running across a restart");
            self.tasks.update(id, |t| t.is_running = false).await;
        }
        running.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_domain::models::FailureKind;

    #[tokio::test]
    async fn push_and_remove_failure_event_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrivateStore::new(dir.path());
        let user = User::new("a".repeat(64));
        store.users.insert(user.clone()).await;

        let event = FailureEvent::new(FailureKind::Internal, "boom");
        let event_id = event.id;
        let updated = store.push_failure_event(&user.token, event).await.unwrap();
        assert_eq!(updated.errors.len(), 1);

        let updated = store.remove_failure_event(&user.token, event_id).await.unwrap();
        assert!(updated.errors.is_empty());
    }

    #[tokio::test]
    async fn reset_running_tasks_clears_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrivateStore::new(dir.path());
        let mut task = Task::new(lockbox_domain::models::TaskKind::CheckDay, Utc::now());
        task.is_running = true;
        let id = task.id;
        store.tasks.insert(task).await;

        let reset_count = store.reset_running_tasks().await;
        assert_eq!(reset_count, 1);
        assert!(!store.tasks.get(&id).await.unwrap().is_running);
    }

    #[tokio::test]
    async fn find_user_by_login() {
        let dir = tempfile::tempdir().unwrap();
        let store = PrivateStore::new(dir.path());
        let mut user = User::new("b".repeat(64));
        user.login = Some("1234567".into());
        store.users.insert(user).await;

        assert!(store.find_user_by_login("1234567").await.is_some());
        assert!(store.find_user_by_login("missing").await.is_none());
    }
}
