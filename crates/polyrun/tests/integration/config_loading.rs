use std::path::Path;

use polyrun::config::{Config, ConfigError};

use super::fixture_config;

#[test]
fn test_load_valid_config() {
    let config = Config::from_file(fixture_config("valid_full.toml")).expect("Failed to load config");

    assert_eq!(config.workspace_root, Path::new("/srv/polyrun/workspaces"));
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9000);
    assert!(!config.server.expose_error_details);
    assert_eq!(config.server.job_timeout_secs, Some(30));
    assert_eq!(config.server.max_line_bytes, 4096);
    assert_eq!(config.server.stream_buffer, 8);
    assert_eq!(config.docker.socket.as_deref(), Some("/var/run/docker.sock"));
    assert!(!config.docker.pull_on_startup);

    let cpp = config.get_language("cpp").unwrap();
    assert!(cpp.is_compiled());
    assert_eq!(cpp.build_command().last().map(String::as_str), Some("main.cpp"));

    let python = config.get_language("python").unwrap();
    assert!(!python.is_compiled());
    assert_eq!(python.run_command(), vec!["python3", "-u", "main.py"]);
}

#[test]
fn test_load_minimal_config() {
    let config =
        Config::from_file(fixture_config("valid_minimal.toml")).expect("Failed to load config");

    assert!(config.languages.contains_key("sh"));
    assert_eq!(config.server.port, 8080);
    assert!(config.server.expose_error_details);
    assert!(config.server.job_timeout().is_none());
    assert!(config.docker.pull_on_startup);
}

#[test]
fn test_load_legacy_yaml_layout() {
    let config = Config::from_file(fixture_config("legacy.yaml")).expect("Failed to load config");

    let c = config.get_language("c").unwrap();
    assert_eq!(c.image, "gcc:latest");
    assert_eq!(c.build, vec!["gcc", "-o", "main", "main.c"]);
    assert_eq!(c.source_name.as_str(), "main.c");

    let python = config.get_language("python3").unwrap();
    assert!(!python.is_compiled());
    assert_eq!(config.images(), vec!["gcc:latest", "python:3"]);
}

#[test]
fn test_load_invalid_empty_name() {
    let result = Config::from_file(fixture_config("invalid_empty_name.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_empty_run_command() {
    let result = Config::from_file(fixture_config("invalid_empty_run_command.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_source_name() {
    let result = Config::from_file(fixture_config("invalid_source_name.toml"));
    assert!(result.is_err());
}

#[test]
fn test_load_missing_file() {
    let result = Config::from_file(fixture_config("does_not_exist.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}
