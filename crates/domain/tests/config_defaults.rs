use std::sync::Mutex;

use lockbox_domain::config::Config;

// `Config::from_env` reads process-wide state; serialize the tests that touch it
// so they don't stomp on each other under the default parallel test runner.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn with_clean_env<F: FnOnce()>(f: F) {
    let _guard = ENV_LOCK.lock().unwrap();
    for var in [
        "LOCKBOX_CREDENTIAL_KEY",
        "LOCKBOX_CREDENTIAL_KEY_FILE",
        "LOCKBOX_SCHOOL",
        "LOCKBOX_CHECK_DAY_RUN_TIME",
        "LOCKBOX_FILL_FORM_RUN_TIME",
        "LOCKBOX_FILL_FORM_RETRY_LIMIT",
        "LOCKBOX_FILL_FORM_RETRY_IN",
        "LOCKBOX_FILL_FORM_SUBMIT_ENABLED",
        "LOCKBOX_UPDATE_COURSES_BATCH_SIZE",
        "LOCKBOX_UPDATE_COURSES_INTERVAL",
    ] {
        std::env::remove_var(var);
    }
    f();
}

#[test]
fn missing_credential_key_is_an_error() {
    with_clean_env(|| {
        let result = Config::from_env();
        assert!(result.is_err());
    });
}

#[test]
fn retry_limit_defaults_to_three() {
    with_clean_env(|| {
        let key = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [0u8; 32]);
        std::env::set_var("LOCKBOX_CREDENTIAL_KEY", key);
        let (config, warnings) = Config::from_env().unwrap();
        assert_eq!(config.fill_form_retry_limit, 3);
        assert_eq!(config.fill_form_retry_in_seconds, 1800);
        assert!(!config.fill_form_submit_enabled);
        assert!(warnings.iter().any(|w| w.field == "LOCKBOX_FILL_FORM_SUBMIT_ENABLED"));
        std::env::remove_var("LOCKBOX_CREDENTIAL_KEY");
    });
}

#[test]
fn wrong_length_credential_key_is_an_error() {
    with_clean_env(|| {
        let key = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [0u8; 16]);
        std::env::set_var("LOCKBOX_CREDENTIAL_KEY", key);
        let result = Config::from_env();
        assert!(result.is_err());
        std::env::remove_var("LOCKBOX_CREDENTIAL_KEY");
    });
}
