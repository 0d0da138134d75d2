//! `Config::from_env` against the real process environment.

use orchestrator::config::{Config, ConfigError, LogFormat};
use serial_test::serial;

const VARS: [&str; 4] = ["PORT", "LOG_FORMAT", "SAGA_RESEND_AFTER_SECS", "CONSUMER_GROUP_ID"];

fn clear() {
    for name in VARS {
        // SAFETY: tests touching the environment are serialized.
        unsafe { std::env::remove_var(name) };
    }
}

#[test]
#[serial]
fn test_from_env_reads_process_environment() {
    clear();
    // SAFETY: tests touching the environment are serialized.
    unsafe {
        std::env::set_var("PORT", "8088");
        std::env::set_var("LOG_FORMAT", "json");
        std::env::set_var("SAGA_RESEND_AFTER_SECS", "45");
        std::env::set_var("CONSUMER_GROUP_ID", "atlas-saga");
    }

    let config = Config::from_env().unwrap();
    clear();

    assert_eq!(config.port, 8088);
    assert_eq!(config.log_format, LogFormat::Json);
    assert_eq!(config.resend_after_secs, 45);
    assert_eq!(config.kafka.group_id, "atlas-saga");
}

#[test]
#[serial]
fn test_from_env_rejects_unknown_log_format() {
    clear();
    // SAFETY: tests touching the environment are serialized.
    unsafe { std::env::set_var("LOG_FORMAT", "xml") };

    let err = Config::from_env().unwrap_err();
    clear();

    assert_eq!(
        err,
        ConfigError::Invalid {
            name: "LOG_FORMAT",
            value: "xml".to_string()
        }
    );
}
