use super::data::{Config, ConfigKey};
use super::io::ConfigError;
use crate::core::constants::{DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use crate::core::gen_stream::DEFAULT_API_BASE_URL;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.image_model(), DEFAULT_IMAGE_MODEL);
    assert_eq!(config.text_model(), DEFAULT_TEXT_MODEL);
    assert_eq!(config.api_base_url(), DEFAULT_API_BASE_URL);
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let config = Config {
        image_model: Some("img-1".to_string()),
        state_dir: Some(PathBuf::from("/var/lib/promptdeck")),
        ..Default::default()
    };
    config
        .save_to_path(&config_path)
        .expect("Failed to save config");
    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);

    Config::update_at(&config_path, |config| {
        config.unset(ConfigKey::ImageModel);
        config.set(ConfigKey::TextModel, "  txt-2 ");
    })
    .expect("update failed");

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded.image_model, None);
    assert_eq!(loaded.image_model(), DEFAULT_IMAGE_MODEL);
    assert_eq!(loaded.text_model(), "txt-2");
    assert_eq!(
        loaded.resolve_state_dir().expect("state dir"),
        PathBuf::from("/var/lib/promptdeck")
    );
}

#[test]
fn blank_values_fall_back_to_defaults() {
    let config = Config {
        api_base_url: Some("   ".to_string()),
        ..Default::default()
    };
    assert_eq!(config.api_base_url(), DEFAULT_API_BASE_URL);
    assert_eq!(config.models().image_model, DEFAULT_IMAGE_MODEL);
}

#[test]
fn invalid_toml_reports_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "image_model = [").expect("write");

    let err = Config::load_from_path(&config_path).expect_err("should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at"));
}

#[test]
fn config_keys_accept_either_spelling() {
    assert_eq!("image-model".parse::<ConfigKey>(), Ok(ConfigKey::ImageModel));
    assert_eq!("API_BASE_URL".parse::<ConfigKey>(), Ok(ConfigKey::ApiBaseUrl));
    let err = "theme".parse::<ConfigKey>().expect_err("unknown key");
    assert!(err.to_string().contains("state-dir"));
}
