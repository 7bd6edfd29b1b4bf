use galley_core::{LogFormat, Settings};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
#[serial]
fn test_missing_files_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load(dir.path(), Some("test")).unwrap();
    assert_eq!(settings.env, "test");
    assert_eq!(settings.simulation.producers, 2);
    assert_eq!(settings.simulation.consumers, 3);
    assert_eq!(settings.logging.format, LogFormat::Pretty);
}

#[test]
#[serial]
fn test_env_file_overrides_default_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("default.toml"),
        "[simulation]\nproducers = 4\nconsumers = 6\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("staging.toml"),
        "[simulation]\nconsumers = 1\ncapacity = 8\n\n[logging]\nformat = \"json\"\n",
    )
    .unwrap();

    let settings = Settings::load(dir.path(), Some("staging")).unwrap();
    assert_eq!(settings.simulation.producers, 4);
    assert_eq!(settings.simulation.consumers, 1);
    assert_eq!(settings.simulation.capacity, Some(8));
    assert_eq!(settings.logging.format, LogFormat::Json);
}

#[test]
#[serial]
fn test_environment_variables_win() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("default.toml"), "[simulation]\nproducers = 4\n").unwrap();

    std::env::set_var("GALLEY__SIMULATION__PRODUCERS", "7");
    let result = Settings::load(dir.path(), Some("test"));
    std::env::remove_var("GALLEY__SIMULATION__PRODUCERS");

    assert_eq!(result.unwrap().simulation.producers, 7);
}

#[test]
#[serial]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("local.toml"), "[simulation]\nproducers = 0\n").unwrap();

    let err = Settings::load(dir.path(), Some("test")).unwrap_err();
    assert!(err.to_string().contains("simulation.producers"));
}

#[test]
#[serial]
fn test_unvalidated_load_allows_later_overrides() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("local.toml"), "[simulation]\nconsumers = 0\n").unwrap();

    let mut settings = Settings::load_unvalidated(dir.path(), Some("test")).unwrap();
    assert_eq!(settings.simulation.consumers, 0);
    assert!(settings.validate().is_err());

    settings.simulation.consumers = 1;
    assert!(settings.validate().is_ok());
}
