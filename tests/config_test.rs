//! Configuration loading tests

use event_search::config::Config;
use event_search::AppError;
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_missing_file_uses_embedded_defaults() {
    let config = Config::from_file("does/not/exist.toml").unwrap();

    assert_eq!(config.elasticsearch.connection_string, "http://localhost:9200");
    assert_eq!(config.elasticsearch.number_of_shards, 1);
    assert_eq!(config.elasticsearch.reindex_batch_size, 500);
    assert!(!config.elasticsearch.allow_migration);
    assert_eq!(config.observability.log_level, "info");
}

#[test]
fn test_file_overrides_defaults() {
    let file = config_file(
        r#"
[elasticsearch]
connection_string = "http://es1:9200,http://es2:9200"
number_of_shards = 5
number_of_replicas = 2
allow_migration = true
"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.elasticsearch.number_of_shards, 5);
    assert_eq!(config.elasticsearch.number_of_replicas, 2);
    assert!(config.elasticsearch.allow_migration);
    assert_eq!(config.elasticsearch.endpoints().unwrap().len(), 2);
    // Untouched keys keep their defaults
    assert_eq!(config.elasticsearch.reindex_batch_size, 500);
}

#[test]
fn test_invalid_settings_are_rejected() {
    let file = config_file(
        r#"
[elasticsearch]
connection_string = "http://localhost:9200"
number_of_shards = 0
"#,
    );

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
