use modelbridge::core::config::ConfigLoader;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
#[serial]
fn defaults_apply_when_no_file_exists() {
    let tmp = TempDir::new().unwrap();
    let config = ConfigLoader::load_from_workspace(tmp.path()).unwrap();
    assert_eq!(config.modeler.base_url, "https://modeler.camunda.io");
    assert_eq!(config.modeler.max_attempts, 3);
}

#[test]
#[serial]
fn file_values_override_defaults() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("modelbridge.toml"),
        r#"
[modeler]
base_url = "https://modeler.internal.test"
max_attempts = 5

[storage]
bucket = "handbook-bundles"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_workspace(tmp.path()).unwrap();
    assert_eq!(config.modeler.base_url, "https://modeler.internal.test");
    assert_eq!(config.modeler.max_attempts, 5);
    assert_eq!(config.storage.bucket, "handbook-bundles");
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("modelbridge.toml"),
        r#"
[modeler]
base_url = "https://from-file.test"
"#,
    )
    .unwrap();

    env::set_var("MODELBRIDGE_MODELER_BASE_URL", "https://from-env.test");
    env::set_var("MODELBRIDGE_MODELER_MAX_ATTEMPTS", "7");
    let config = ConfigLoader::load_from_workspace(tmp.path()).unwrap();
    env::remove_var("MODELBRIDGE_MODELER_BASE_URL");
    env::remove_var("MODELBRIDGE_MODELER_MAX_ATTEMPTS");

    assert_eq!(config.modeler.base_url, "https://from-env.test");
    assert_eq!(config.modeler.max_attempts, 7);
}

#[test]
#[serial]
fn malformed_toml_is_a_validation_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("modelbridge.toml"), "not [valid toml").unwrap();
    let err = ConfigLoader::load_from_workspace(tmp.path()).unwrap_err();
    assert_eq!(
        err.category,
        modelbridge::core::types::ErrorCategory::ValidationError
    );
}

#[test]
#[serial]
fn non_numeric_env_attempt_override_is_ignored() {
    let tmp = TempDir::new().unwrap();
    env::set_var("MODELBRIDGE_MODELER_MAX_ATTEMPTS", "many");
    let config = ConfigLoader::load_from_workspace(tmp.path()).unwrap();
    env::remove_var("MODELBRIDGE_MODELER_MAX_ATTEMPTS");
    assert_eq!(config.modeler.max_attempts, 3);
}
