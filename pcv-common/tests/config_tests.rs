//! Integration tests for configuration loading and root folder resolution
//!
//! Covers:
//! - Priority order for root folder resolution (CLI → ENV → TOML → default)
//! - Missing TOML files fall back to compiled defaults
//! - `PCV_*` overrides for pipeline settings
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate PCV_* variables are marked with #[serial].

use pcv_common::config::{
    load_toml_config, resolve_root_folder, write_toml_config, LoggingConfig, PipelineSettings,
    RootFolderInitializer, TomlConfig, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_argument_wins_over_env_and_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/pcv-from-env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/pcv-from-toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/tmp/pcv-from-cli")), &toml);

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(resolved, PathBuf::from("/tmp/pcv-from-cli"));
}

#[test]
#[serial]
fn test_env_wins_over_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/pcv-from-env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/pcv-from-toml")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(None, &toml);

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(resolved, PathBuf::from("/tmp/pcv-from-env"));
}

#[test]
#[serial]
fn test_toml_used_when_no_cli_or_env() {
    env::remove_var(ROOT_FOLDER_ENV);
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/pcv-from-toml")),
        ..Default::default()
    };

    assert_eq!(resolve_root_folder(None, &toml), PathBuf::from("/tmp/pcv-from-toml"));
}

#[test]
#[serial]
fn test_default_root_folder_when_nothing_configured() {
    env::remove_var(ROOT_FOLDER_ENV);
    let resolved = resolve_root_folder(None, &TomlConfig::default());
    assert!(!resolved.as_os_str().is_empty());
}

#[test]
fn test_toml_roundtrip_through_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/pcv")),
        bind_address: Some("0.0.0.0:8080".to_string()),
        login_url: Some("https://auth.example.com/login".to_string()),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        pipeline: PipelineSettings {
            expected_fingerprint: "abc=".to_string(),
            verification_delay_ms: 0,
            ..Default::default()
        },
    };

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(Some(&path)).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_partial_toml_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[pipeline]\nexpected_fingerprint = \"zzz=\"\nworker_count = 2\n",
    )
    .unwrap();

    let loaded = load_toml_config(Some(&path)).unwrap();

    assert_eq!(loaded.pipeline.expected_fingerprint, "zzz=");
    assert_eq!(loaded.pipeline.worker_count, 2);
    assert_eq!(loaded.pipeline.verification_delay_ms, 1000);
    assert_eq!(loaded.logging.level, "info");
    assert!(loaded.root_folder.is_none());
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = load_toml_config(Some(&temp_dir.path().join("absent.toml")));
    assert!(matches!(result, Err(pcv_common::Error::Config(_))));
}

#[test]
fn test_malformed_toml_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "pipeline = [[[").unwrap();

    assert!(load_toml_config(Some(&path)).is_err());
}

#[test]
#[serial]
fn test_env_overrides_pipeline_settings() {
    env::set_var("PCV_EXPECTED_FINGERPRINT", "from-env=");
    env::set_var("PCV_VERIFICATION_DELAY_MS", "25");
    env::set_var("PCV_WORKER_COUNT", "3");
    env::set_var("PCV_RETRY_BACKOFF_MS", "75");
    env::set_var("PCV_POLL_INTERVAL_MS", "120");

    let mut settings = PipelineSettings::default();
    let result = settings.apply_env_overrides();

    env::remove_var("PCV_EXPECTED_FINGERPRINT");
    env::remove_var("PCV_VERIFICATION_DELAY_MS");
    env::remove_var("PCV_WORKER_COUNT");
    env::remove_var("PCV_RETRY_BACKOFF_MS");
    env::remove_var("PCV_POLL_INTERVAL_MS");

    assert!(result.is_ok());
    assert_eq!(settings.expected_fingerprint, "from-env=");
    assert_eq!(settings.verification_delay_ms, 25);
    assert_eq!(settings.worker_count, 3);
    assert_eq!(settings.retry_backoff_ms, 75);
    assert_eq!(settings.poll_interval_ms, 120);
}

#[test]
#[serial]
fn test_bad_poll_interval_is_rejected() {
    env::set_var("PCV_POLL_INTERVAL_MS", "-5");

    let mut settings = PipelineSettings::default();
    let result = settings.apply_env_overrides();

    env::remove_var("PCV_POLL_INTERVAL_MS");
    assert!(matches!(result, Err(pcv_common::Error::Config(_))));
}

#[test]
#[serial]
fn test_env_override_with_bad_number_is_rejected() {
    env::set_var("PCV_MAX_ATTEMPTS", "lots");

    let mut settings = PipelineSettings::default();
    let result = settings.apply_env_overrides();

    env::remove_var("PCV_MAX_ATTEMPTS");
    assert!(matches!(result, Err(pcv_common::Error::Config(_))));
}

#[test]
fn test_initializer_creates_blob_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("pcv-root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(initializer.blob_path().is_dir());
    assert_eq!(initializer.database_path(), root.join("pcv.db"));
}
