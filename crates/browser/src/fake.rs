//! Deterministic [`BrowserDriver`] double: no network, no real rendering.
//! Configured with a fixed set of recognized fields and, optionally, a
//! forced failure mode, so handler tests can exercise every outcome.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lockbox_domain::models::FormFieldKind;

use crate::error::BrowserError;
use crate::types::{
    Credentials, FillFormOutcome, FillFormWarning, FillFormWarningKind, FormComponent, FormGeometryOutcome,
    GeometryField,
};
use crate::BrowserDriver;

#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Success,
    AuthFailed(String),
    PossibleFail(String),
}

pub struct FakeBrowserDriver {
    outcome: Mutex<FakeOutcome>,
    recognized_fields: Vec<(u32, String, FormFieldKind)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeBrowserDriver {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(FakeOutcome::Success),
            recognized_fields: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_outcome(mut self, outcome: FakeOutcome) -> Self {
        self.outcome = Mutex::new(outcome);
        self
    }

    pub fn with_recognized_fields(mut self, fields: Vec<(u32, String, FormFieldKind)>) -> Self {
        self.recognized_fields = fields;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for FakeBrowserDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowserDriver {
    async fn fill_form(
        &self,
        form_url: &str,
        _credentials: &Credentials,
        components: &[FormComponent],
        dry_run: bool,
    ) -> Result<FillFormOutcome, BrowserError> {
        self.calls.lock().unwrap().push(format!("fill_form:{form_url}"));

        match self.outcome.lock().unwrap().clone() {
            FakeOutcome::AuthFailed(message) => return Err(BrowserError::AuthFailed(message)),
            FakeOutcome::PossibleFail(message) => {
                return Err(BrowserError::PossibleFail { message, screenshot: b"fake-screenshot".to_vec() })
            }
            FakeOutcome::Success => {}
        }

        let mut warnings = Vec::new();
        for component in components {
            if component.index as usize >= self.recognized_fields.len() && !component.critical {
                warnings.push(FillFormWarning {
                    kind: FillFormWarningKind::NoncriticalFieldFailed,
                    message: format!("field {} not recognized", component.expected_title),
                });
            } else if component.index as usize >= self.recognized_fields.len() {
                return Err(BrowserError::InvalidForm(format!(
                    "Requested component ({}) is out of range",
                    component.expected_title
                )));
            }
        }

        let screenshot_pre = b"fake-screenshot-pre".to_vec();
        let screenshot_post = if dry_run { screenshot_pre.clone() } else { b"fake-screenshot-post".to_vec() };

        Ok(FillFormOutcome { screenshot_pre, screenshot_post, warnings })
    }

    async fn get_form_geometry(
        &self,
        form_url: &str,
        _credentials: &Credentials,
    ) -> Result<FormGeometryOutcome, BrowserError> {
        self.calls.lock().unwrap().push(format!("get_form_geometry:{form_url}"));

        if let FakeOutcome::AuthFailed(message) = self.outcome.lock().unwrap().clone() {
            return Err(BrowserError::AuthFailed(message));
        }

        let fields = self
            .recognized_fields
            .iter()
            .map(|(index, title, kind)| GeometryField { index: *index, title: title.clone(), kind: *kind })
            .collect();

        Ok(FormGeometryOutcome { auth_required: false, fields, screenshot: b"fake-screenshot".to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    fn credentials() -> Credentials {
        Credentials { email: "a@example.com".into(), login: "123".into(), password: "pw".into() }
    }

    #[tokio::test]
    async fn noncritical_field_out_of_range_becomes_a_warning() {
        let driver = FakeBrowserDriver::new();
        let components = vec![FormComponent {
            index: 0,
            expected_title: "Q1".into(),
            kind: FormFieldKind::Text,
            value: FieldValue::Text("hi".into()),
            critical: false,
        }];
        let outcome = driver.fill_form("https://example.com/form", &credentials(), &components, false).await.unwrap();
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[tokio::test]
    async fn critical_field_out_of_range_fails() {
        let driver = FakeBrowserDriver::new();
        let components = vec![FormComponent {
            index: 0,
            expected_title: "Q1".into(),
            kind: FormFieldKind::Text,
            value: FieldValue::Text("hi".into()),
            critical: true,
        }];
        let result = driver.fill_form("https://example.com/form", &credentials(), &components, false).await;
        assert!(matches!(result, Err(BrowserError::InvalidForm(_))));
    }

    #[tokio::test]
    async fn dry_run_screenshots_are_identical() {
        let driver = FakeBrowserDriver::new();
        let outcome = driver.fill_form("https://example.com/form", &credentials(), &[], true).await.unwrap();
        assert_eq!(outcome.screenshot_pre, outcome.screenshot_post);
    }
}
