//! Client for the school portal. The wire protocol is out of scope — this
//! crate exposes a narrow [`PortalClient`]/[`PortalSession`] capability pair,
//! a real `reqwest`-based adapter, and a deterministic fake for tests.

mod discovery;
mod fake;
mod real;

pub use discovery::{async_courses_by_cycle_day, day_name_today, parse_cycle_day, select_school};
pub use fake::{FakePortalClient, FakePortalSession};
pub use real::RealPortalClient;

use async_trait::async_trait;
use chrono::NaiveDate;
use lockbox_domain::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct School {
    pub id: String,
    pub code: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableItem {
    pub course_code: String,
    pub course_period: String,
    pub teacher_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct PortalIdentity {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub grade: Option<i32>,
}

/// An authenticated session, scoped to a single login. Every portal
/// interaction for a user lives inside one session; the client creates a
/// fresh one per call (session-per-call, per the concurrency model).
#[async_trait]
pub trait PortalSession: Send + Sync {
    async fn identity(&self) -> Result<PortalIdentity>;
    async fn schools(&self) -> Result<Vec<School>>;
    /// Day-cycle names (`"D1"`..`"D4"`, or `"D"` for no school) for each day
    /// in `[start, end)`.
    async fn day_cycle_names(&self, school_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<String>>;
    async fn timetable(&self, school_id: &str, date: NaiveDate) -> Result<Vec<TimetableItem>>;
}

#[async_trait]
pub trait PortalClient: Send + Sync {
    async fn login(&self, login: &str, password: &str) -> Result<Box<dyn PortalSession>>;
}
