//! Persisted entities. See DESIGN.md for which store (private/shared) owns which type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failure events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Unknown,
    Internal,
    BadUserInfo,
    TdsbConnects,
    Config,
    FormFilling,
}

impl Default for FailureKind {
    fn default() -> Self {
        FailureKind::Unknown
    }
}

/// Whether a failure of this kind is retryable at the fill-form/check-day layer.
impl FailureKind {
    pub fn retryable(&self) -> bool {
        matches!(self, FailureKind::Unknown | FailureKind::Internal | FailureKind::TdsbConnects)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub time_logged: DateTime<Utc>,
    #[serde(default)]
    pub kind: FailureKind,
    #[serde(default)]
    pub message: String,
}

impl FailureEvent {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            time_logged: Utc::now(),
            kind,
            message: message.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fill-form results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillFormResultStatus {
    Success,
    Failure,
    PossibleFailure,
    SubmitDisabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillFormResult {
    pub result: FillFormResultStatus,
    pub time_logged: DateTime<Utc>,
    #[serde(default)]
    pub course: Option<Uuid>,
    #[serde(default)]
    pub form_screenshot_id: Option<String>,
    #[serde(default)]
    pub confirmation_screenshot_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// User (private)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// 64 lowercase hex chars, unique.
    pub token: String,
    /// Digits-only TDSB student number.
    #[serde(default)]
    pub login: Option<String>,
    /// Encrypted vault envelope (base64 text), never the plaintext password.
    #[serde(default)]
    pub encrypted_password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub grade: Option<i32>,
    #[serde(default = "d_true")]
    pub active: bool,
    #[serde(default)]
    pub errors: Vec<FailureEvent>,
    #[serde(default)]
    pub last_fill_form_result: Option<FillFormResult>,
    /// Tri-state: `None` = pending (never resolved), `Some(vec![])` = resolved, no
    /// async courses found, `Some(ids)` = resolved.
    #[serde(default)]
    pub courses: Option<Vec<Uuid>>,
}

impl User {
    pub fn new(token: String) -> Self {
        Self {
            token,
            login: None,
            encrypted_password: None,
            email: None,
            first_name: None,
            last_name: None,
            grade: None,
            active: true,
            errors: Vec::new(),
            last_fill_form_result: None,
            courses: None,
        }
    }

    pub fn credentials_set(&self) -> bool {
        self.login.is_some() && self.encrypted_password.is_some()
    }
}

fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SignupProvider (frontend-owned; interface only — see DESIGN.md)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupProvider {
    pub name: String,
    /// 32-byte HMAC secret.
    pub hmac_secret: Vec<u8>,
    /// At least 2 three-char identifier prefixes.
    pub identify_tokens: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Form / FormField (shared)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormFieldKind {
    Text,
    LongText,
    Date,
    MultipleChoice,
    Checkbox,
    Dropdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub index_on_page: u32,
    #[serde(default)]
    pub expected_label_segment: Option<String>,
    pub kind: FormFieldKind,
    /// Field-expression source text, evaluated against the fill-form context.
    pub target_value: String,
    #[serde(default)]
    pub critical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Form {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub sub_fields: Vec<FormField>,
    #[serde(default)]
    pub representative_thumbnail: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl Form {
    /// Invariants from the data model: no two sub-fields share an index, and no
    /// label segment is a substring of another's.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen_idx = std::collections::HashSet::new();
        for f in &self.sub_fields {
            if !seen_idx.insert(f.index_on_page) {
                return Err(format!("duplicate index_on_page: {}", f.index_on_page));
            }
        }
        for (i, a) in self.sub_fields.iter().enumerate() {
            let Some(a_seg) = &a.expected_label_segment else { continue };
            for (j, b) in self.sub_fields.iter().enumerate() {
                if i == j {
                    continue;
                }
                if let Some(b_seg) = &b.expected_label_segment {
                    if a_seg != b_seg && b_seg.contains(a_seg.as_str()) {
                        return Err(format!(
                            "label segment \"{a_seg}\" is a substring of \"{b_seg}\""
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Course (shared)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Unique.
    pub course_code: String,
    #[serde(default)]
    pub configuration_locked: bool,
    #[serde(default = "d_true")]
    pub has_attendance_form: bool,
    #[serde(default)]
    pub form_url: Option<String>,
    #[serde(default)]
    pub form_config: Option<Uuid>,
    /// Strings of the form `"<cycle_day>-<period>[a]"`.
    #[serde(default)]
    pub known_slots: Vec<String>,
    #[serde(default)]
    pub teacher_name: String,
}

impl Course {
    pub fn new(course_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            course_code: course_code.into(),
            configuration_locked: false,
            has_attendance_form: true,
            form_url: None,
            form_config: None,
            known_slots: Vec::new(),
            teacher_name: String::new(),
        }
    }

    /// True if the course has a known slot for `"<cycle_day>-1a"`.
    pub fn has_slot_for_cycle_day(&self, cycle_day: i32) -> bool {
        let wanted = format!("{cycle_day}-1a");
        self.known_slots.iter().any(|s| s == &wanted)
    }
}

/// `^[0-9]+-[0-9]+[a-z]?$`
pub fn is_valid_known_slot(slot: &str) -> bool {
    let mut parts = slot.splitn(2, '-');
    let (Some(day), Some(rest)) = (parts.next(), parts.next()) else {
        return false;
    };
    if day.is_empty() || !day.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits_end = rest
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits_end == 0 {
        return false;
    }
    let suffix = &rest[digits_end..];
    suffix.is_empty() || (suffix.len() == 1 && suffix.bytes().next().unwrap().is_ascii_lowercase())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CachedFormGeometry (private)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormGeometryEntry {
    pub index: u32,
    pub title: String,
    pub kind: FormFieldKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFormGeometry {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Unique.
    pub url: String,
    #[serde(default)]
    pub requested_by: Option<String>,
    /// `None` = pending.
    #[serde(default)]
    pub geometry: Option<Vec<FormGeometryEntry>>,
    #[serde(default)]
    pub auth_required: Option<bool>,
    #[serde(default)]
    pub screenshot_file_id: Option<String>,
    #[serde(default)]
    pub response_status: Option<u16>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl CachedFormGeometry {
    pub fn pending(url: String, requested_by: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            requested_by,
            geometry: None,
            auth_required: None,
            screenshot_file_id: None,
            response_status: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, ttl_minutes: i64) -> bool {
        Utc::now() - self.created_at > chrono::Duration::minutes(ttl_minutes)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task (private)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    CheckDay,
    FillForm,
    PopulateCourses,
    GetFormGeometry,
    TestFillForm,
    RemoveOldFormGeometry,
    RemoveOldTestResults,
}

impl TaskKind {
    pub fn rate_limit_groups(&self) -> &'static [&'static str] {
        use TaskKind::*;
        match self {
            FillForm => &["firefox", "tdsb_connects", "global"],
            TestFillForm => &["firefox", "tdsb_connects", "global"],
            GetFormGeometry => &["firefox", "global"],
            CheckDay => &["tdsb_connects", "global"],
            PopulateCourses => &["tdsb_connects", "global"],
            RemoveOldFormGeometry => &["global"],
            RemoveOldTestResults => &["global"],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub kind: TaskKind,
    /// Owning user's token, if any (check-day and the cleanup tasks have none).
    #[serde(default)]
    pub owner: Option<String>,
    pub next_run_at: DateTime<Utc>,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub argument: Option<String>,
}

impl Task {
    pub fn new(kind: TaskKind, next_run_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            owner: None,
            next_run_at,
            is_running: false,
            retry_count: 0,
            argument: None,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FormFillingTest (shared)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormFillingTest {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub course_config: Uuid,
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub time_executed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub is_scheduled: bool,
    #[serde(default)]
    pub errors: Vec<FailureEvent>,
    #[serde(default)]
    pub fill_result: Option<FillFormResult>,
}

impl FormFillingTest {
    pub fn new(course_config: Uuid, requested_by: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            course_config,
            requested_by,
            time_executed: None,
            is_finished: false,
            in_progress: false,
            is_scheduled: true,
            errors: Vec::new(),
            fill_result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_slot_validation() {
        assert!(is_valid_known_slot("2-1a"));
        assert!(is_valid_known_slot("2-1"));
        assert!(!is_valid_known_slot("2-"));
        assert!(!is_valid_known_slot("-1a"));
        assert!(!is_valid_known_slot("2-1ab"));
        assert!(!is_valid_known_slot("a-1a"));
    }

    #[test]
    fn form_duplicate_index_rejected() {
        let form = Form {
            id: Uuid::new_v4(),
            name: "f".into(),
            sub_fields: vec![
                FormField {
                    index_on_page: 0,
                    expected_label_segment: None,
                    kind: FormFieldKind::Text,
                    target_value: "'a'".into(),
                    critical: true,
                },
                FormField {
                    index_on_page: 0,
                    expected_label_segment: None,
                    kind: FormFieldKind::Text,
                    target_value: "'b'".into(),
                    critical: true,
                },
            ],
            representative_thumbnail: None,
            is_default: false,
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn form_substring_label_rejected() {
        let form = Form {
            id: Uuid::new_v4(),
            name: "f".into(),
            sub_fields: vec![
                FormField {
                    index_on_page: 0,
                    expected_label_segment: Some("Name".into()),
                    kind: FormFieldKind::Text,
                    target_value: "'a'".into(),
                    critical: true,
                },
                FormField {
                    index_on_page: 1,
                    expected_label_segment: Some("Full Name".into()),
                    kind: FormFieldKind::Text,
                    target_value: "'b'".into(),
                    critical: true,
                },
            ],
            representative_thumbnail: None,
            is_default: false,
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn user_credentials_set_requires_both() {
        let mut u = User::new("a".repeat(64));
        assert!(!u.credentials_set());
        u.login = Some("123".into());
        assert!(!u.credentials_set());
        u.encrypted_password = Some("envelope".into());
        assert!(u.credentials_set());
    }

    #[test]
    fn course_slot_lookup() {
        let mut c = Course::new("ENG1D");
        c.known_slots.push("2-1a".into());
        assert!(c.has_slot_for_cycle_day(2));
        assert!(!c.has_slot_for_cycle_day(3));
    }
}
