//! Real portal adapter. The wire protocol itself is an opaque external
//! collaborator; this talks to it over a session-scoped `reqwest::Client`
//! and leaves the exact request/response shapes to the deployment's portal
//! base URL and auth flow.

use async_trait::async_trait;
use chrono::NaiveDate;
use lockbox_domain::{Error, Result};
use reqwest::Client;

use crate::{PortalClient, PortalIdentity, PortalSession, School, TimetableItem};

pub struct RealPortalClient {
    base_url: String,
}

impl RealPortalClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

#[async_trait]
impl PortalClient for RealPortalClient {
    async fn login(&self, login: &str, password: &str) -> Result<Box<dyn PortalSession>> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Portal(format!("building http client: {e}")))?;

        let resp = client
            .post(format!("{}/login", self.base_url))
            .form(&[("username", login), ("password", password)])
            .send()
            .await
            .map_err(|e| Error::Portal(format!("login request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Portal(format!("login rejected with status {}", resp.status())));
        }

        Ok(Box::new(RealPortalSession { client, base_url: self.base_url.clone() }))
    }
}

struct RealPortalSession {
    client: Client,
    base_url: String,
}

#[async_trait]
impl PortalSession for RealPortalSession {
    async fn identity(&self) -> Result<PortalIdentity> {
        #[derive(serde::Deserialize)]
        struct IdentityResponse {
            email: Option<String>,
            first_name: Option<String>,
            last_name: Option<String>,
            grade: Option<i32>,
        }

        let resp: IdentityResponse = self
            .client
            .get(format!("{}/me", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Portal(format!("identity request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Portal(format!("identity response malformed: {e}")))?;

        Ok(PortalIdentity {
            email: resp.email,
            first_name: resp.first_name,
            last_name: resp.last_name,
            grade: resp.grade,
        })
    }

    async fn schools(&self) -> Result<Vec<School>> {
        #[derive(serde::Deserialize)]
        struct SchoolResponse {
            id: String,
            code: i64,
            name: String,
        }

        let resp: Vec<SchoolResponse> = self
            .client
            .get(format!("{}/schools", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Portal(format!("schools request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Portal(format!("schools response malformed: {e}")))?;

        Ok(resp
            .into_iter()
            .map(|s| School { id: s.id, code: s.code, name: s.name })
            .collect())
    }

    async fn day_cycle_names(&self, school_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<String>> {
        let resp: Vec<String> = self
            .client
            .get(format!("{}/schools/{school_id}/day_cycle_names", self.base_url))
            .query(&[("start", start.to_string()), ("end", end.to_string())])
            .send()
            .await
            .map_err(|e| Error::Portal(format!("day-cycle-names request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Portal(format!("day-cycle-names response malformed: {e}")))?;
        Ok(resp)
    }

    async fn timetable(&self, school_id: &str, date: NaiveDate) -> Result<Vec<TimetableItem>> {
        #[derive(serde::Deserialize)]
        struct TimetableItemResponse {
            course_code: String,
            course_period: String,
            #[serde(default)]
            teacher_name: String,
        }

        let resp: Vec<TimetableItemResponse> = self
            .client
            .get(format!("{}/schools/{school_id}/timetable", self.base_url))
            .query(&[("date", date.to_string())])
            .send()
            .await
            .map_err(|e| Error::Portal(format!("timetable request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Portal(format!("timetable response malformed: {e}")))?;

        Ok(resp
            .into_iter()
            .map(|i| TimetableItem {
                course_code: i.course_code,
                course_period: i.course_period,
                teacher_name: i.teacher_name,
            })
            .collect())
    }
}
