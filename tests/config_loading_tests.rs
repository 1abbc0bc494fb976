//! Layered configuration loading from a file on disk
use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use xkcd_sync_lib::infrastructure::{AppConfig, ConfigError};

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn file_values_override_defaults() {
    let file = toml_file(
        r#"
[xkcd]
batch_size = 25
excluded_comic_numbers = [404, 1037]

[xkcd.scheduler]
interval_minutes = 15

[storage]
bucket = "mirror"
endpoint = "http://garage.internal:3900"

[database]
url = "sqlite://mirror.db"
"#,
    );

    let config = AppConfig::load(Some(file.path())).expect("config loads");

    assert_eq!(config.xkcd.batch_size, 25);
    assert!(config.xkcd.excluded_comic_numbers.contains(404));
    assert!(config.xkcd.excluded_comic_numbers.contains(1037));
    assert_eq!(config.xkcd.scheduler.interval(), Duration::from_secs(15 * 60));
    assert_eq!(config.storage.bucket, "mirror");
    assert_eq!(config.storage.endpoint, "http://garage.internal:3900");
    assert_eq!(config.database.url, "sqlite://mirror.db");
}

#[test]
fn unspecified_sections_keep_defaults() {
    let file = toml_file("[storage]\nbucket = \"comics\"\n");

    let config = AppConfig::load(Some(file.path())).expect("config loads");

    assert_eq!(config.storage.bucket, "comics");
    assert_eq!(config.xkcd.batch_size, 100);
    assert_eq!(config.xkcd.comic_base_url, "https://xkcd.com");
    assert!(config.xkcd.excluded_comic_numbers.contains(404));
    assert_eq!(config.xkcd.scheduler.initial_delay(), Duration::from_secs(60));
}

#[test]
fn invalid_values_fail_validation() {
    let file = toml_file("[xkcd]\nbatch_size = 0\n");

    let err = AppConfig::load(Some(file.path())).unwrap_err();

    assert!(matches!(err, ConfigError::Validation { .. }), "unexpected error: {err}");
}

#[test]
fn missing_file_is_a_load_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.toml");

    let err = AppConfig::load(Some(&path)).unwrap_err();

    assert!(matches!(err, ConfigError::FileLoad { .. }), "unexpected error: {err}");
}
