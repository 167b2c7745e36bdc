//! Loading `DispatchConfig` from files

mod common;

use common::temp_files::write_config;
use routekit::config::DispatchConfig;

#[test]
fn test_load_yaml() {
    let (_dir, path) = write_config(
        "strict_slashes: true\nvalidate_responses: true\nrequest_id_header: x-correlation-id\n",
        "yaml",
    );
    let config = DispatchConfig::load(&path).unwrap();
    assert!(config.strict_slashes);
    assert!(config.validate_responses);
    assert!(!config.expose_error_details);
    assert_eq!(config.request_id_header, "x-correlation-id");
}

#[test]
fn test_load_toml_and_json() {
    let (_dir, path) = write_config("expose_error_details = true\n", "toml");
    let config = DispatchConfig::load(&path).unwrap();
    assert!(config.expose_error_details);
    assert_eq!(config.request_id_header, "x-request-id");

    let (_dir, path) = write_config(r#"{"strict_slashes": true}"#, "json");
    assert!(DispatchConfig::load(&path).unwrap().strict_slashes);
}

#[test]
fn test_load_errors_name_the_file() {
    let (_dir, path) = write_config("strict_slashes = true\n", "ini");
    let err = DispatchConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("unsupported config format 'ini'"));

    let (_dir, path) = write_config("strict_slashes: true\nunknown_knob: 3\n", "yml");
    let err = DispatchConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("unknown_knob"));

    let err = DispatchConfig::load("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.yaml"));
}

#[test]
fn test_file_then_overrides() {
    let (_dir, path) = write_config("strict_slashes: true\n", "yaml");
    let mut config = DispatchConfig::load(&path).unwrap();
    config
        .apply_overrides(|key| match key {
            "ROUTEKIT_STRICT_SLASHES" => Some("false".to_string()),
            "ROUTEKIT_EXPOSE_ERROR_DETAILS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();
    assert!(!config.strict_slashes);
    assert!(config.expose_error_details);
}
