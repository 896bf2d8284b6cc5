use ntevent_soak::config::{load_config, ConfigError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    file
}

#[test]
fn no_path_yields_defaults() {
    let config = load_config(None).unwrap();
    assert_eq!(config.storage.delivery_thread_name, "ntevent-listener");
    assert_eq!(config.soak.instance, 0);
    assert_eq!(config.soak.producers, 4);
    assert_eq!(config.soak.events_per_producer, 10_000);
    assert_eq!(config.soak.flush_timeout_ms, 5_000);
    assert_eq!(config.logging.level, "info");
    assert!(!config.logging.json);
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("absent.toml");
    let config = load_config(path.to_str()).unwrap();
    assert_eq!(config.soak.producers, 4);
}

#[test]
fn file_values_override_defaults() {
    let file = write_config(
        r#"
[storage]
delivery_thread_name = "soak-delivery"

[soak]
instance = 3
producers = 8
events_per_producer = 123

[logging]
level = "ntevent_core=debug,info"
json = true
"#,
    );

    let config = load_config(file.path().to_str()).unwrap();
    assert_eq!(config.storage.delivery_thread_name, "soak-delivery");
    assert_eq!(config.soak.instance, 3);
    assert_eq!(config.soak.producers, 8);
    assert_eq!(config.soak.events_per_producer, 123);
    assert_eq!(config.soak.flush_timeout_ms, 5_000, "unset keys keep defaults");
    assert_eq!(config.logging.level, "ntevent_core=debug,info");
    assert!(config.logging.json);
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config("[soak]\nproducers = \"many\"\n");
    let err = load_config(file.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
}

#[test]
fn directory_path_is_a_read_error() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let err = load_config(dir.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::FileRead(_)), "got {err:?}");
}
