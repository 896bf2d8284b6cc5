//! Environment overrides live in their own test binary so they cannot leak
//! into file-based config tests running in parallel.

use ntevent_soak::config::load_config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn environment_overrides_file_values() {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(b"[soak]\nproducers = 2\nflush_timeout_ms = 100\n")
        .expect("failed to write temp config");

    std::env::set_var("NTEVENT_INSTANCE", "7");
    std::env::set_var("NTEVENT_PRODUCERS", "6");
    std::env::set_var("NTEVENT_EVENTS_PER_PRODUCER", "77");
    std::env::set_var("NTEVENT_FLUSH_TIMEOUT_MS", "not-a-number");
    std::env::set_var("NTEVENT_LOG_LEVEL", "debug");
    std::env::set_var("NTEVENT_LOG_JSON", "1");

    let config = load_config(file.path().to_str()).unwrap();
    assert_eq!(config.soak.instance, 7);
    assert_eq!(config.soak.producers, 6);
    assert_eq!(config.soak.events_per_producer, 77);
    assert_eq!(
        config.soak.flush_timeout_ms, 100,
        "unparseable overrides are ignored"
    );
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}
