//! `fantoccini`-backed [`BrowserDriver`]. Mirrors the original Python
//! Selenium adapter's CSS-class marker table and timeout budgets exactly;
//! only the WebDriver client library differs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use fantoccini::actions::{ActionSequence, KeyAction, KeyActions};
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use lockbox_domain::models::FormFieldKind;
use tokio::time::timeout;

use crate::error::BrowserError;
use crate::types::{
    Credentials, FieldValue, FillFormOutcome, FillFormWarning, FillFormWarningKind, FormComponent,
    FormGeometryOutcome, GeometryField,
};
use crate::BrowserDriver;

const SUBMIT_BUTTON_CLASS: &str = "freebirdFormviewerViewNavigationSubmitButton";
const ITEM_CONTAINER_SELECTOR: &str =
    ".freebirdFormviewerViewItemList .freebirdFormviewerViewNumberedItemContainer";
const BASE_TITLE_CLASS: &str = "freebirdFormviewerComponentsQuestionBaseTitle";
const EMAIL_HEADER_CLASS: &str = "freebirdFormviewerViewHeaderEmailAddress";

pub struct FantocciniBrowserDriver {
    webdriver_url: String,
}

impl FantocciniBrowserDriver {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self { webdriver_url: webdriver_url.into() }
    }

    async fn connect(&self) -> Result<Client, BrowserError> {
        ClientBuilder::native()
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| BrowserError::Driver(format!("connecting to webdriver: {e}")))
    }

    async fn google_auth_flow(&self, client: &Client, credentials: &Credentials) -> Result<(), BrowserError> {
        timeout(Duration::from_secs(10), client.wait().for_element(Locator::Id("identifierNext")))
            .await
            .map_err(|_| BrowserError::AuthFailed("Invalid authentication challenge page".into()))?
            .map_err(|e| BrowserError::AuthFailed(format!("Invalid authentication challenge page: {e}")))?;

        client
            .find(Locator::Id("identifierId"))
            .await
            .map_err(|e| BrowserError::AuthFailed(format!("Invalid authentication challenge page: {e}")))?
            .send_keys(&credentials.email)
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?;

        client
            .find(Locator::Id("identifierNext"))
            .await
            .map_err(|e| BrowserError::AuthFailed(format!("Invalid authentication challenge page: {e}")))?
            .click()
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?;

        timeout(Duration::from_secs(15), wait_for_url_containing(client, "aw.tdsb.on.ca"))
            .await
            .map_err(|_| BrowserError::AuthFailed("Invalid authentication".into()))??;

        timeout(
            Duration::from_secs(5),
            client.wait().for_element(Locator::Id("TdsbLoginControl_Login")),
        )
        .await
        .map_err(|_| BrowserError::AuthFailed("Invalid authentication".into()))?
        .map_err(|e| BrowserError::AuthFailed(format!("Invalid authentication: {e}")))?;

        client
            .find(Locator::Id("UserName"))
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?
            .send_keys(&credentials.login)
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?;
        client
            .find(Locator::Id("Password"))
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?
            .send_keys(&credentials.password)
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?;
        client
            .find(Locator::Id("TdsbLoginControl_Login"))
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?
            .click()
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?;

        Ok(())
    }

    async fn wait_for_submit_button(&self, client: &Client, not_found_message_prefix: &str) -> Result<(), BrowserError> {
        let waited = timeout(
            Duration::from_secs(10),
            client.wait().for_element(Locator::Css(&format!(".{SUBMIT_BUTTON_CLASS}"))),
        )
        .await;

        if waited.is_ok() {
            return Ok(());
        }

        let url = client.current_url().await.map(|u| u.to_string()).unwrap_or_default();
        if url.contains("alreadyresponded") {
            Err(BrowserError::InvalidForm(format!("{not_found_message_prefix}: form already responded to")))
        } else if url.contains("formrestricted") {
            Err(BrowserError::AuthFailed("Form not accessible by account".into()))
        } else {
            Err(BrowserError::InvalidForm(format!(
                "{not_found_message_prefix}: form doesn't have a submit button; may be multi-page"
            )))
        }
    }

    async fn maybe_google_auth(&self, client: &Client, credentials: &Credentials) -> Result<bool, BrowserError> {
        let url = client.current_url().await.map(|u| u.to_string()).unwrap_or_default();
        if url.contains("accounts.google.com") {
            self.google_auth_flow(client, credentials).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

async fn wait_for_url_containing(client: &Client, needle: &str) -> Result<(), BrowserError> {
    loop {
        let url = client.current_url().await.map(|u| u.to_string()).unwrap_or_default();
        if url.contains(needle) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn base_title(element: &Element) -> Result<String, BrowserError> {
    element
        .find(Locator::Css(&format!(".{BASE_TITLE_CLASS}")))
        .await
        .map_err(|e| BrowserError::Driver(e.to_string()))?
        .text()
        .await
        .map_err(|e| BrowserError::Driver(e.to_string()))
}

/// Classifies a question element by its marker classes, per the field
/// classification table. `None` means "skipped" — not a recognized question.
async fn guess_field_kind(element: &Element) -> Result<Option<FormFieldKind>, BrowserError> {
    if element
        .find_all(Locator::Css(".freebirdFormviewerComponentsQuestionBaseRoot"))
        .await
        .map_err(|e| BrowserError::Driver(e.to_string()))?
        .is_empty()
    {
        return Ok(None);
    }

    if let Some(text_root) = element
        .find_all(Locator::Css(".freebirdFormviewerComponentsQuestionTextRoot"))
        .await
        .map_err(|e| BrowserError::Driver(e.to_string()))?
        .into_iter()
        .next()
    {
        if !text_root
            .find_all(Locator::Css(".quantumWizTextinputPaperinputInput"))
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?
            .is_empty()
        {
            return Ok(Some(FormFieldKind::Text));
        }
        if !text_root
            .find_all(Locator::Css(".quantumWizTextinputPapertextareaInput"))
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?
            .is_empty()
        {
            return Ok(Some(FormFieldKind::LongText));
        }
        return Ok(None);
    }

    if !element
        .find_all(Locator::Css(".freebirdFormviewerComponentsQuestionRadioRoot"))
        .await
        .map_err(|e| BrowserError::Driver(e.to_string()))?
        .is_empty()
    {
        return Ok(Some(FormFieldKind::MultipleChoice));
    }

    if !element
        .find_all(Locator::Css(".freebirdFormviewerComponentsQuestionDateInputsContainer"))
        .await
        .map_err(|e| BrowserError::Driver(e.to_string()))?
        .is_empty()
    {
        return Ok(Some(FormFieldKind::Date));
    }

    if !element
        .find_all(Locator::Css(".freebirdFormviewerComponentsQuestionCheckboxRoot"))
        .await
        .map_err(|e| BrowserError::Driver(e.to_string()))?
        .is_empty()
    {
        return Ok(Some(FormFieldKind::Checkbox));
    }

    if !element
        .find_all(Locator::Css(".freebirdFormviewerComponentsQuestionSelectRoot"))
        .await
        .map_err(|e| BrowserError::Driver(e.to_string()))?
        .is_empty()
    {
        return Ok(Some(FormFieldKind::Dropdown));
    }

    Ok(None)
}

async fn fill_in_field(element: &Element, value: &FieldValue, kind: FormFieldKind) -> Result<(), BrowserError> {
    match (kind, value) {
        (FormFieldKind::Text | FormFieldKind::LongText, FieldValue::Text(text)) => {
            let selector = if kind == FormFieldKind::Text {
                "input.quantumWizTextinputPaperinputInput"
            } else {
                "textarea.quantumWizTextinputPapertextareaInput"
            };
            element
                .find(Locator::Css(selector))
                .await
                .map_err(|e| BrowserError::Driver(e.to_string()))?
                .send_keys(text)
                .await
                .map_err(|e| BrowserError::Driver(e.to_string()))?;
            Ok(())
        }
        (FormFieldKind::Date, FieldValue::Date(date)) => {
            let components = element
                .find_all(Locator::Css("input.quantumWizTextinputPaperinputInput"))
                .await
                .map_err(|e| BrowserError::Driver(e.to_string()))?;

            let mut month = None;
            let mut day = None;
            let mut year = None;
            for c in &components {
                let max = c.attr("max").await.map_err(|e| BrowserError::Driver(e.to_string()))?;
                let min = c.attr("min").await.map_err(|e| BrowserError::Driver(e.to_string()))?;
                match max.as_deref() {
                    Some("12") => month = Some(c),
                    Some("31") => day = Some(c),
                    _ => {
                        if min.as_deref().and_then(|m| m.parse::<i64>().ok()).is_some_and(|m| m >= 1000) {
                            year = Some(c);
                        }
                    }
                }
            }
            let (month, day, year) = match (month, day, year) {
                (Some(m), Some(d), Some(y)) => (m, d, y),
                _ => return Err(BrowserError::InvalidForm("date sub-inputs not found".into())),
            };

            month.send_keys(&date.month().to_string()).await.map_err(|e| BrowserError::Driver(e.to_string()))?;
            day.send_keys(&date.day().to_string()).await.map_err(|e| BrowserError::Driver(e.to_string()))?;
            year.send_keys(&date.year().to_string()).await.map_err(|e| BrowserError::Driver(e.to_string()))?;
            Ok(())
        }
        (FormFieldKind::MultipleChoice, FieldValue::OptionIndex(idx)) => {
            let options = element
                .find_all(Locator::Css(".docssharedWizToggleLabeledLabelWrapper"))
                .await
                .map_err(|e| BrowserError::Driver(e.to_string()))?;
            let option = options
                .get(*idx as usize)
                .ok_or_else(|| BrowserError::InvalidForm("option out of range".into()))?;
            option.click().await.map_err(|e| BrowserError::Driver(e.to_string()))
        }
        (FormFieldKind::Checkbox, FieldValue::OptionIndex(idx)) => {
            let options = element
                .find_all(Locator::Css(".quantumWizTogglePapercheckboxInnerBox"))
                .await
                .map_err(|e| BrowserError::Driver(e.to_string()))?;
            let option = options
                .get(*idx as usize)
                .ok_or_else(|| BrowserError::InvalidForm("option out of range".into()))?;
            option.click().await.map_err(|e| BrowserError::Driver(e.to_string()))
        }
        (FormFieldKind::Dropdown, FieldValue::OptionIndex(idx)) => {
            let opener = element
                .find(Locator::Css(".quantumWizMenuPaperselectDropDown"))
                .await
                .map_err(|e| BrowserError::Driver(e.to_string()))?;
            opener.click().await.map_err(|e| BrowserError::Driver(e.to_string()))?;

            let popup_selector = "div.exportSelectPopup .quantumWizMenuPaperselectOption";
            let client = opener.client();
            timeout(Duration::from_secs(4), client.wait().for_element(Locator::Css(popup_selector)))
                .await
                .map_err(|_| BrowserError::InvalidForm("dropdown popup never appeared".into()))?
                .map_err(|e| BrowserError::InvalidForm(format!("dropdown popup never appeared: {e}")))?;

            let popup = element.find(Locator::Css(".exportSelectPopup")).await.map_err(|e| BrowserError::Driver(e.to_string()))?;
            let options = popup
                .find_all(Locator::Css(".exportOption"))
                .await
                .map_err(|e| BrowserError::Driver(e.to_string()))?;
            let option = options
                .get(*idx as usize + 1) // +1 skips the "Choose" label
                .ok_or_else(|| BrowserError::InvalidForm("dropdown option out of range".into()))?;
            option.click().await.map_err(|e| BrowserError::Driver(e.to_string()))?;

            let escape = ActionSequence::from(
                KeyActions::new("keyboard".to_string()).then(KeyAction::Down { value: '\u{E00C}' }).then(KeyAction::Up { value: '\u{E00C}' }),
            );
            let _ = client.perform_actions(escape).await;

            // Ignore timeouts waiting for the popup to close.
            let _ = timeout(
                Duration::from_secs(4),
                wait_until_absent(client, popup_selector),
            )
            .await;
            Ok(())
        }
        (_, value) => Err(BrowserError::Driver(format!(
            "invalid expression result type for field kind {kind:?}: {value:?}"
        ))),
    }
}

async fn wait_until_absent(client: &Client, selector: &str) {
    loop {
        match client.find_all(Locator::Css(selector)).await {
            Ok(found) if found.is_empty() => return,
            Ok(_) => tokio::time::sleep(Duration::from_millis(250)).await,
            Err(_) => return,
        }
    }
}

#[async_trait]
impl BrowserDriver for FantocciniBrowserDriver {
    async fn fill_form(
        &self,
        form_url: &str,
        credentials: &Credentials,
        components: &[FormComponent],
        dry_run: bool,
    ) -> Result<FillFormOutcome, BrowserError> {
        let client = self.connect().await?;
        let result = self.fill_form_inner(&client, form_url, credentials, components, dry_run).await;
        let _ = client.close().await;
        result
    }

    async fn get_form_geometry(
        &self,
        form_url: &str,
        credentials: &Credentials,
    ) -> Result<FormGeometryOutcome, BrowserError> {
        let client = self.connect().await?;
        let result = self.get_form_geometry_inner(&client, form_url, credentials).await;
        let _ = client.close().await;
        result
    }
}

impl FantocciniBrowserDriver {
    async fn fill_form_inner(
        &self,
        client: &Client,
        form_url: &str,
        credentials: &Credentials,
        components: &[FormComponent],
        dry_run: bool,
    ) -> Result<FillFormOutcome, BrowserError> {
        client.goto(form_url).await.map_err(|e| BrowserError::Driver(e.to_string()))?;
        self.maybe_google_auth(client, credentials).await?;
        self.wait_for_submit_button(client, "fill-form").await?;

        let sub_elems = client
            .find_all(Locator::Css(ITEM_CONTAINER_SELECTOR))
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?;

        let mut warnings = Vec::new();

        for component in components {
            let outcome = self.fill_one_component(&sub_elems, component).await;
            match outcome {
                Ok(()) => {}
                Err(BrowserError::InvalidForm(message)) if !component.critical => {
                    tracing::warn!(field = %component.expected_title, %message, "ignoring error from noncritical field");
                    warnings.push(FillFormWarning { kind: FillFormWarningKind::NoncriticalFieldFailed, message });
                }
                Err(other) => return Err(other),
            }
        }

        let screenshot_pre = client.screenshot().await.map_err(|e| BrowserError::Driver(e.to_string()))?;

        if dry_run {
            return Ok(FillFormOutcome { screenshot_pre: screenshot_pre.clone(), screenshot_post: screenshot_pre, warnings });
        }

        client
            .find(Locator::Css(&format!(".{SUBMIT_BUTTON_CLASS}")))
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?
            .click()
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?;

        if timeout(Duration::from_secs(10), wait_for_url_containing(client, "formResponse")).await.is_err() {
            let screenshot = client.screenshot().await.unwrap_or_default();
            return Err(BrowserError::PossibleFail {
                message: "Timed out waiting for response page".into(),
                screenshot,
            });
        }

        let screenshot_post = client.screenshot().await.map_err(|e| BrowserError::Driver(e.to_string()))?;
        Ok(FillFormOutcome { screenshot_pre, screenshot_post, warnings })
    }

    async fn fill_one_component(&self, sub_elems: &[Element], component: &FormComponent) -> Result<(), BrowserError> {
        let element = sub_elems.get(component.index as usize).ok_or_else(|| {
            BrowserError::InvalidForm(format!("Requested component ({}) is out of range", component.expected_title))
        })?;

        let title = base_title(element).await?;
        if !title.contains(&component.expected_title) {
            return Err(BrowserError::InvalidForm(format!(
                "Requested component ({}) is not present at index ({})",
                component.expected_title, component.index
            )));
        }

        fill_in_field(element, &component.value, component.kind).await.map_err(|e| match e {
            BrowserError::InvalidForm(m) => BrowserError::InvalidForm(format!(
                "Requested component ({}) failed to fill in ({m})",
                component.expected_title
            )),
            other => other,
        })
    }

    async fn get_form_geometry_inner(
        &self,
        client: &Client,
        form_url: &str,
        credentials: &Credentials,
    ) -> Result<FormGeometryOutcome, BrowserError> {
        client.goto(form_url).await.map_err(|e| BrowserError::Driver(e.to_string()))?;
        let auth_required = self.maybe_google_auth(client, credentials).await?;
        self.wait_for_submit_button(client, "get-form-geometry").await?;

        let sub_elems = client
            .find_all(Locator::Css(ITEM_CONTAINER_SELECTOR))
            .await
            .map_err(|e| BrowserError::Driver(e.to_string()))?;

        let mut fields = Vec::new();
        for (index, element) in sub_elems.iter().enumerate() {
            if let Some(kind) = guess_field_kind(element).await? {
                let title = base_title(element)
                    .await
                    .map_err(|_| BrowserError::InvalidForm(format!("Form field {index} missing header")))?;
                fields.push(GeometryField { index: index as u32, title, kind });
            }
        }

        if let Ok(email_tag) = client.find(Locator::Css(&format!(".{EMAIL_HEADER_CLASS}"))).await {
            let _ = client
                .execute(
                    "arguments[0].innerText = '<redacted>'",
                    vec![serde_json::json!(email_tag)],
                )
                .await;
        } else {
            tracing::warn!("possible privacy breach: couldn't find an email to redact");
        }

        let screenshot = client.screenshot().await.map_err(|e| BrowserError::Driver(e.to_string()))?;

        Ok(FormGeometryOutcome { auth_required, fields, screenshot })
    }
}
