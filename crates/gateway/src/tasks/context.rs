//! Builds the field-expression evaluation context (§4.4) for one fill/test
//! attempt: portal-fresh identity data takes priority over stored data,
//! and the user's manual overrides (when set) take priority over both.

use chrono::NaiveDate;
use lockbox_domain::models::{Course, User};
use lockbox_fieldexpr::{Context, Value};
use lockbox_portal::{PortalIdentity, TimetableItem};

#[allow(clippy::too_many_arguments)]
pub fn build(
    user: &User,
    portal_identity: Option<&PortalIdentity>,
    course: &Course,
    timetable_item: Option<&TimetableItem>,
    today: NaiveDate,
    day_cycle: &str,
) -> Context {
    let first_name = user
        .first_name
        .clone()
        .or_else(|| portal_identity.and_then(|i| i.first_name.clone()))
        .unwrap_or_default();
    let last_name = user
        .last_name
        .clone()
        .or_else(|| portal_identity.and_then(|i| i.last_name.clone()))
        .unwrap_or_default();
    let email = user
        .email
        .clone()
        .or_else(|| portal_identity.and_then(|i| i.email.clone()))
        .unwrap_or_default();
    let grade = user.grade.or_else(|| portal_identity.and_then(|i| i.grade)).unwrap_or(0);
    let teacher_name = timetable_item.map(|t| t.teacher_name.clone()).unwrap_or_else(|| course.teacher_name.clone());

    let mut ctx: Context = Context::new();
    ctx.insert("name".into(), Value::Str(format!("{first_name} {last_name}").trim().to_string()));
    ctx.insert("first_name".into(), Value::Str(first_name));
    ctx.insert("last_name".into(), Value::Str(last_name));
    ctx.insert("student_number".into(), Value::Str(user.login.clone().unwrap_or_default()));
    ctx.insert("email".into(), Value::Str(email));
    ctx.insert("today".into(), Value::Date(today));
    ctx.insert("grade".into(), Value::Int(grade as i64));
    ctx.insert("course_code".into(), Value::Str(course.course_code.clone()));
    ctx.insert("teacher_name".into(), Value::Str(teacher_name));
    // No data source in the model carries a teacher's email address.
    ctx.insert("teacher_email".into(), Value::Str(String::new()));
    ctx.insert("day_cycle".into(), Value::Str(day_cycle.to_string()));
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_override_beats_portal_identity() {
        let mut user = User::new("a".repeat(64));
        user.first_name = Some("Manual".into());
        let identity = PortalIdentity { first_name: Some("Portal".into()), ..Default::default() };
        let course = Course::new("ENG1D");
        let ctx = build(&user, Some(&identity), &course, None, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), "2");
        assert_eq!(ctx.get("first_name"), Some(&Value::Str("Manual".into())));
    }

    #[test]
    fn falls_back_to_portal_identity_when_unset() {
        let user = User::new("a".repeat(64));
        let identity = PortalIdentity { first_name: Some("Ada".into()), last_name: Some("Lovelace".into()), ..Default::default() };
        let course = Course::new("ENG1D");
        let ctx = build(&user, Some(&identity), &course, None, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), "2");
        assert_eq!(ctx.get("name"), Some(&Value::Str("Ada Lovelace".into())));
    }
}
