//! Deterministic portal double. Construct with a fixed identity, school
//! list, day-cycle names keyed by date, and timetables keyed by date; no
//! network I/O, no suspension beyond a plain `async fn`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use lockbox_domain::{Error, Result};

use crate::{PortalClient, PortalIdentity, PortalSession, School, TimetableItem};

#[derive(Clone, Default)]
pub struct FakePortalClient {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    valid_credentials: Option<(String, String)>,
    identity: PortalIdentity,
    schools: Vec<School>,
    day_cycle_names: HashMap<NaiveDate, String>,
    timetables: HashMap<NaiveDate, Vec<TimetableItem>>,
}

impl FakePortalClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.inner.lock().unwrap().valid_credentials = Some((login.into(), password.into()));
        self
    }

    pub fn with_identity(self, identity: PortalIdentity) -> Self {
        self.inner.lock().unwrap().identity = identity;
        self
    }

    pub fn with_schools(self, schools: Vec<School>) -> Self {
        self.inner.lock().unwrap().schools = schools;
        self
    }

    pub fn with_day_cycle_name(self, date: NaiveDate, name: impl Into<String>) -> Self {
        self.inner.lock().unwrap().day_cycle_names.insert(date, name.into());
        self
    }

    pub fn with_timetable(self, date: NaiveDate, items: Vec<TimetableItem>) -> Self {
        self.inner.lock().unwrap().timetables.insert(date, items);
        self
    }
}

#[async_trait]
impl PortalClient for FakePortalClient {
    async fn login(&self, login: &str, password: &str) -> Result<Box<dyn PortalSession>> {
        let inner = self.inner.lock().unwrap();
        match &inner.valid_credentials {
            Some((l, p)) if l == login && p == password => {
                Ok(Box::new(FakePortalSession { inner: self.inner.clone() }))
            }
            _ => Err(Error::Auth("incorrect portal credentials".into())),
        }
    }
}

pub struct FakePortalSession {
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl PortalSession for FakePortalSession {
    async fn identity(&self) -> Result<PortalIdentity> {
        Ok(self.inner.lock().unwrap().identity.clone())
    }

    async fn schools(&self) -> Result<Vec<School>> {
        Ok(self.inner.lock().unwrap().schools.clone())
    }

    async fn day_cycle_names(&self, _school_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut day = start;
        let mut out = Vec::new();
        while day < end {
            out.push(inner.day_cycle_names.get(&day).cloned().unwrap_or_else(|| "D".to_string()));
            day = day.succ_opt().expect("date overflow");
        }
        Ok(out)
    }

    async fn timetable(&self, _school_id: &str, date: NaiveDate) -> Result<Vec<TimetableItem>> {
        Ok(self.inner.lock().unwrap().timetables.get(&date).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let client = FakePortalClient::new().with_credentials("123", "correct");
        assert!(client.login("123", "wrong").await.is_err());
    }

    #[tokio::test]
    async fn login_then_fetch_schools() {
        let client = FakePortalClient::new()
            .with_credentials("123", "correct")
            .with_schools(vec![School { id: "s1".into(), code: 42, name: "Test High".into() }]);
        let session = client.login("123", "correct").await.unwrap();
        let schools = session.schools().await.unwrap();
        assert_eq!(schools.len(), 1);
        assert_eq!(schools[0].code, 42);
    }
}
