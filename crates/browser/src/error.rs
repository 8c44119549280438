use std::fmt;

/// Mirrors the Ghoster* exception hierarchy: auth failures, malformed-form
/// failures, and the possible-failure case that carries a screenshot for
/// manual review and must never be retried automatically.
#[derive(Debug)]
pub enum BrowserError {
    AuthFailed(String),
    InvalidForm(String),
    PossibleFail { message: String, screenshot: Vec<u8> },
    Driver(String),
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserError::AuthFailed(m) => write!(f, "authentication failed: {m}"),
            BrowserError::InvalidForm(m) => write!(f, "invalid form: {m}"),
            BrowserError::PossibleFail { message, .. } => write!(f, "possible failure: {message}"),
            BrowserError::Driver(m) => write!(f, "driver error: {m}"),
        }
    }
}

impl std::error::Error for BrowserError {}

impl From<BrowserError> for lockbox_domain::Error {
    fn from(e: BrowserError) -> Self {
        lockbox_domain::Error::Browser(e.to_string())
    }
}
