//! Configuration system tests
//!
//! Tests for config paths and tokenizer config loading/saving.

use std::path::PathBuf;
use std::time::Duration;

use tmscope::config::TokenizerConfig;
use tmscope::config_paths;

// ========================================================================
// Config Paths Tests
// ========================================================================

#[test]
fn test_config_dir_returns_some() {
    assert!(config_paths::config_dir().is_some());
}

#[test]
fn test_config_dir_contains_app_name() {
    let dir = config_paths::config_dir().unwrap();
    assert!(dir.to_string_lossy().contains("tmscope"));
}

#[test]
fn test_config_file_ends_with_yaml() {
    let path = config_paths::config_file().unwrap();
    assert!(path.to_string_lossy().ends_with("config.yaml"));
}

#[test]
fn test_logs_dir_is_subdir_of_config() {
    let config = config_paths::config_dir().unwrap();
    let logs = config_paths::logs_dir().unwrap();
    assert!(logs.starts_with(&config));
}

#[test]
fn test_log_file_is_in_logs_dir() {
    let logs = config_paths::logs_dir().unwrap();
    let file = config_paths::log_file().unwrap();
    assert!(file.starts_with(&logs));
    assert!(file
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("tmscope.log"));
}

// ========================================================================
// Tokenizer Config Tests
// ========================================================================

#[test]
fn test_default_config() {
    let config = TokenizerConfig::default();
    assert_eq!(config.time_limit_ms, 0);
    assert_eq!(config.theme, None);
    assert!(config.grammars.is_empty());
    assert!(!config.binary);
    assert_eq!(config.time_limit(), None);
}

#[test]
fn test_time_limit() {
    let config = TokenizerConfig {
        time_limit_ms: 250,
        ..TokenizerConfig::default()
    };
    assert_eq!(config.time_limit(), Some(Duration::from_millis(250)));
}

#[test]
fn test_load_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = TokenizerConfig::load_from(&dir.path().join("config.yaml"));
    assert_eq!(config, TokenizerConfig::default());
}

#[test]
fn test_load_invalid_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "time_limit_ms: [not, a, number]").unwrap();
    assert_eq!(TokenizerConfig::load_from(&path), TokenizerConfig::default());
}

#[test]
fn test_load_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "time_limit_ms: 100\ngrammars:\n  - /tmp/a.json\n").unwrap();

    let config = TokenizerConfig::load_from(&path);
    assert_eq!(config.time_limit_ms, 100);
    assert_eq!(config.grammars, vec![PathBuf::from("/tmp/a.json")]);
    assert_eq!(config.theme, None);
    assert!(!config.binary);
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.yaml");

    let config = TokenizerConfig {
        time_limit_ms: 500,
        theme: Some(PathBuf::from("themes/dark.json")),
        grammars: vec![PathBuf::from("a.json"), PathBuf::from("b.json")],
        binary: true,
    };
    config.save_to(&path).unwrap();

    assert!(path.exists());
    assert_eq!(TokenizerConfig::load_from(&path), config);
}
