//! Headless-browser form automation. The driver's wire protocol is out of
//! scope; this crate exposes a [`BrowserDriver`] capability with a real
//! `fantoccini`-backed adapter and a deterministic fake for tests.

mod error;
mod fake;
mod real;
mod types;

pub use error::BrowserError;
pub use fake::FakeBrowserDriver;
pub use real::FantocciniBrowserDriver;
pub use types::{
    Credentials, FieldValue, FillFormOutcome, FillFormWarning, FillFormWarningKind, FormComponent,
    FormGeometryOutcome, GeometryField,
};

use async_trait::async_trait;

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Fills `components` in index order and, unless `dry_run`, submits.
    /// A non-critical field failure is recorded as a warning and filling
    /// continues; a critical field failure fails the whole attempt.
    async fn fill_form(
        &self,
        form_url: &str,
        credentials: &Credentials,
        components: &[FormComponent],
        dry_run: bool,
    ) -> Result<FillFormOutcome, BrowserError>;

    /// Classifies every question on the page without filling anything in.
    async fn get_form_geometry(
        &self,
        form_url: &str,
        credentials: &Credentials,
    ) -> Result<FormGeometryOutcome, BrowserError>;
}
