use std::path::Path;

use lockbox_domain::models::{Course, Form, FormFillingTest};
use uuid::Uuid;

use crate::doc_store::DocStore;

/// The `shared` logical database: Course, Form, FormFillingTest. Unique on
/// `Course.course_code`.
pub struct SharedStore {
    pub courses: DocStore<Uuid, Course>,
    pub forms: DocStore<Uuid, Form>,
    pub form_filling_tests: DocStore<Uuid, FormFillingTest>,
}

impl SharedStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            courses: DocStore::new(state_dir.join("courses.json"), |c: &Course| c.id),
            forms: DocStore::new(state_dir.join("forms.json"), |f: &Form| f.id),
            form_filling_tests: DocStore::new(state_dir.join("form_filling_tests.json"), |t: &FormFillingTest| t.id),
        }
    }

    pub async fn find_course_by_code(&self, course_code: &str) -> Option<Course> {
        self.courses.list().await.into_iter().find(|c| c.course_code == course_code)
    }

    /// Upserts a Course by code: creates it if absent, otherwise applies `f`
    /// to the existing document (used by populate-courses to merge newly
    /// seen slots without clobbering manual configuration).
    pub async fn upsert_course_by_code(&self, course_code: &str, f: impl FnOnce(&mut Course)) -> Course {
        if let Some(existing) = self.find_course_by_code(course_code).await {
            self.courses.update(&existing.id, f).await.unwrap_or(existing)
        } else {
            let mut course = Course::new(course_code);
            f(&mut course);
            self.courses.insert(course).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_creates_then_merges() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedStore::new(dir.path());

        let course = store
            .upsert_course_by_code("ENG1D", |c| {
                c.known_slots.push("2-1a".into());
            })
            .await;
        assert_eq!(course.known_slots, vec!["2-1a".to_string()]);

        let course = store
            .upsert_course_by_code("ENG1D", |c| {
                if !c.known_slots.contains(&"3-1a".to_string()) {
                    c.known_slots.push("3-1a".into());
                }
            })
            .await;
        assert_eq!(course.known_slots.len(), 2);
    }
}
