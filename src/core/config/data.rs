use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::constants::{DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use crate::core::gen_stream::DEFAULT_API_BASE_URL;
use crate::core::studio::ModelSelection;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Model used for `image` generations
    pub image_model: Option<String>,
    /// Model used for `text` generations
    pub text_model: Option<String>,
    /// Base URL of the generative API, without the `/models/...` suffix
    pub api_base_url: Option<String>,
    /// Where the session store lives; defaults to the platform data dir
    pub state_dir: Option<PathBuf>,
}

impl Config {
    pub fn image_model(&self) -> &str {
        non_empty(self.image_model.as_deref()).unwrap_or(DEFAULT_IMAGE_MODEL)
    }

    pub fn text_model(&self) -> &str {
        non_empty(self.text_model.as_deref()).unwrap_or(DEFAULT_TEXT_MODEL)
    }

    pub fn api_base_url(&self) -> &str {
        non_empty(self.api_base_url.as_deref()).unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn models(&self) -> ModelSelection {
        ModelSelection {
            image_model: self.image_model().to_string(),
            text_model: self.text_model().to_string(),
        }
    }

    pub fn get(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::ImageModel => self.image_model.clone(),
            ConfigKey::TextModel => self.text_model.clone(),
            ConfigKey::ApiBaseUrl => self.api_base_url.clone(),
            ConfigKey::StateDir => self.state_dir.as_ref().map(path_display),
        }
    }

    pub fn set(&mut self, key: ConfigKey, value: &str) {
        let value = value.trim().to_string();
        match key {
            ConfigKey::ImageModel => self.image_model = Some(value),
            ConfigKey::TextModel => self.text_model = Some(value),
            ConfigKey::ApiBaseUrl => self.api_base_url = Some(value),
            ConfigKey::StateDir => self.state_dir = Some(PathBuf::from(value)),
        }
    }

    pub fn unset(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::ImageModel => self.image_model = None,
            ConfigKey::TextModel => self.text_model = None,
            ConfigKey::ApiBaseUrl => self.api_base_url = None,
            ConfigKey::StateDir => self.state_dir = None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Settable configuration keys, spelled the way the CLI accepts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ImageModel,
    TextModel,
    ApiBaseUrl,
    StateDir,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::ImageModel,
        ConfigKey::TextModel,
        ConfigKey::ApiBaseUrl,
        ConfigKey::StateDir,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::ImageModel => "image-model",
            ConfigKey::TextModel => "text-model",
            ConfigKey::ApiBaseUrl => "api-base-url",
            ConfigKey::StateDir => "state-dir",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownConfigKey(pub String);

impl fmt::Display for UnknownConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known: Vec<&str> = ConfigKey::ALL.iter().map(|key| key.name()).collect();
        write!(
            f,
            "Unknown config key '{}'. Available keys: {}",
            self.0,
            known.join(", ")
        )
    }
}

impl std::error::Error for UnknownConfigKey {}

impl FromStr for ConfigKey {
    type Err = UnknownConfigKey;

    /// Accepts both `image-model` and `image_model`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.name() == normalized)
            .ok_or_else(|| UnknownConfigKey(raw.to_string()))
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
