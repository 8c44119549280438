//! Environment-driven configuration. All settings come from `LOCKBOX_*` env vars;
//! there is no config file.

use std::env;
use std::fmt;

use base64::Engine as _;
use chrono::NaiveTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            ConfigSeverity::Error => "error",
            ConfigSeverity::Warning => "warning",
        };
        write!(f, "[{sev}] {}: {}", self.field, self.message)
    }
}

/// A local-time-of-day window, e.g. `06:00:00-08:00:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            t >= self.start && t <= self.end
        } else {
            // Window wraps past midnight.
            t >= self.start || t <= self.end
        }
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let (start_s, end_s) = raw
            .split_once('-')
            .ok_or_else(|| format!("expected \"HH:MM:SS-HH:MM:SS\", got {raw:?}"))?;
        let start = NaiveTime::parse_from_str(start_s, "%H:%M:%S")
            .map_err(|e| format!("bad start time {start_s:?}: {e}"))?;
        let end = NaiveTime::parse_from_str(end_s, "%H:%M:%S")
            .map_err(|e| format!("bad end time {end_s:?}: {e}"))?;
        Ok(Self { start, end })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// 32-byte master key the vault derives its encryption/MAC subkeys from.
    pub credential_key: Vec<u8>,
    pub school: Option<i64>,
    pub check_day_run_time: Option<TimeWindow>,
    pub fill_form_run_time: Option<TimeWindow>,
    pub fill_form_retry_limit: u32,
    pub fill_form_retry_in_seconds: u64,
    pub fill_form_submit_enabled: bool,
    pub update_courses_batch_size: u32,
    pub update_courses_interval_seconds: u64,
}

fn d_fill_form_retry_limit() -> u32 {
    3
}

fn d_fill_form_retry_in_seconds() -> u64 {
    1800
}

fn d_update_courses_batch_size() -> u32 {
    3
}

fn d_update_courses_interval_seconds() -> u64 {
    60
}

impl Config {
    /// Reads all settings from the process environment. Collects every problem
    /// rather than stopping at the first; callers should reject a config with
    /// any [`ConfigSeverity::Error`] entries and merely log warnings.
    pub fn from_env() -> Result<(Self, Vec<ConfigError>), Vec<ConfigError>> {
        let mut errors = Vec::new();

        let credential_key = match load_credential_key() {
            Ok(key) => Some(key),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let school = match env::var("LOCKBOX_SCHOOL") {
            Ok(raw) if !raw.is_empty() => match raw.parse::<i64>() {
                Ok(v) => Some(v),
                Err(e) => {
                    errors.push(ConfigError::error("LOCKBOX_SCHOOL", format!("not an integer: {e}")));
                    None
                }
            },
            _ => None,
        };

        let check_day_run_time = parse_time_window("LOCKBOX_CHECK_DAY_RUN_TIME", &mut errors);
        let fill_form_run_time = parse_time_window("LOCKBOX_FILL_FORM_RUN_TIME", &mut errors);

        let fill_form_retry_limit = parse_or_default(
            "LOCKBOX_FILL_FORM_RETRY_LIMIT",
            d_fill_form_retry_limit(),
            &mut errors,
        );
        let fill_form_retry_in_seconds = parse_or_default(
            "LOCKBOX_FILL_FORM_RETRY_IN",
            d_fill_form_retry_in_seconds(),
            &mut errors,
        );
        let fill_form_submit_enabled = env::var("LOCKBOX_FILL_FORM_SUBMIT_ENABLED")
            .map(|v| v == "1")
            .unwrap_or(false);
        let update_courses_batch_size = parse_or_default(
            "LOCKBOX_UPDATE_COURSES_BATCH_SIZE",
            d_update_courses_batch_size(),
            &mut errors,
        );
        let update_courses_interval_seconds = parse_or_default(
            "LOCKBOX_UPDATE_COURSES_INTERVAL",
            d_update_courses_interval_seconds(),
            &mut errors,
        );

        if !fill_form_submit_enabled {
            errors.push(ConfigError::warning(
                "LOCKBOX_FILL_FORM_SUBMIT_ENABLED",
                "submit disabled; fill-form runs will stop short of the final click",
            ));
        }

        let Some(credential_key) = credential_key else {
            return Err(errors);
        };

        let config = Self {
            credential_key,
            school,
            check_day_run_time,
            fill_form_run_time,
            fill_form_retry_limit,
            fill_form_retry_in_seconds,
            fill_form_submit_enabled,
            update_courses_batch_size,
            update_courses_interval_seconds,
        };

        if errors.iter().any(|e| e.severity == ConfigSeverity::Error) {
            Err(errors)
        } else {
            Ok((config, errors))
        }
    }
}

fn load_credential_key() -> Result<Vec<u8>, ConfigError> {
    if let Ok(path) = env::var("LOCKBOX_CREDENTIAL_KEY_FILE") {
        let bytes = std::fs::read(&path).map_err(|e| {
            ConfigError::error("LOCKBOX_CREDENTIAL_KEY_FILE", format!("reading {path:?}: {e}"))
        })?;
        return validate_key_len(bytes, "LOCKBOX_CREDENTIAL_KEY_FILE");
    }
    if let Ok(raw) = env::var("LOCKBOX_CREDENTIAL_KEY") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|e| ConfigError::error("LOCKBOX_CREDENTIAL_KEY", format!("invalid base64: {e}")))?;
        return validate_key_len(bytes, "LOCKBOX_CREDENTIAL_KEY");
    }
    Err(ConfigError::error(
        "LOCKBOX_CREDENTIAL_KEY",
        "must set LOCKBOX_CREDENTIAL_KEY or LOCKBOX_CREDENTIAL_KEY_FILE",
    ))
}

fn validate_key_len(bytes: Vec<u8>, field: &str) -> Result<Vec<u8>, ConfigError> {
    if bytes.len() != 32 {
        return Err(ConfigError::error(
            field,
            format!("expected 32 bytes, got {}", bytes.len()),
        ));
    }
    Ok(bytes)
}

fn parse_time_window(field: &'static str, errors: &mut Vec<ConfigError>) -> Option<TimeWindow> {
    match env::var(field) {
        Ok(raw) if !raw.is_empty() => match TimeWindow::parse(&raw) {
            Ok(w) => Some(w),
            Err(e) => {
                errors.push(ConfigError::error(field, e));
                None
            }
        },
        _ => None,
    }
}

fn parse_or_default<T>(field: &'static str, default: T, errors: &mut Vec<ConfigError>) -> T
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match env::var(field) {
        Ok(raw) if !raw.is_empty() => match raw.parse::<T>() {
            Ok(v) => v,
            Err(e) => {
                errors.push(ConfigError::error(field, format!("{e}")));
                default
            }
        },
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_window_same_day() {
        let w = TimeWindow::parse("06:00:00-08:00:00").unwrap();
        assert!(w.contains(NaiveTime::from_hms_opt(7, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(9, 0, 0).unwrap()));
    }

    #[test]
    fn time_window_wraps_midnight() {
        let w = TimeWindow::parse("22:00:00-02:00:00").unwrap();
        assert!(w.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(w.contains(NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn time_window_rejects_garbage() {
        assert!(TimeWindow::parse("not-a-window").is_err());
    }
}
