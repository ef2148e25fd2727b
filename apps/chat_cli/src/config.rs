use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context};
use client_core::{gemini, GeminiClient, GeminiConfig, GenerativeModel, MissingGenerativeModel};
use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "vision-chat.toml";

#[derive(Clone, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: gemini::DEFAULT_MODEL.into(),
            api_base: gemini::DEFAULT_API_BASE.into(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    api_key: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
}

impl Settings {
    pub fn apply_file(&mut self, raw: &str) -> anyhow::Result<()> {
        let file_cfg: FileSettings = toml::from_str(raw).context("invalid settings file")?;
        if let Some(v) = file_cfg.api_key {
            self.api_key = Some(v);
        }
        if let Some(v) = file_cfg.model {
            self.model = v;
        }
        if let Some(v) = file_cfg.api_base {
            self.api_base = v;
        }
        if let Some(v) = file_cfg.temperature {
            self.temperature = Some(v);
        }
        if let Some(v) = file_cfg.max_output_tokens {
            self.max_output_tokens = Some(v);
        }
        Ok(())
    }

    /// Later names win, so the `APP__*` spellings override the plain ones.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        for name in ["GOOGLE_API_KEY", "GEMINI_API_KEY", "APP__API_KEY"] {
            if let Some(v) = non_empty(name) {
                self.api_key = Some(v);
            }
        }
        for name in ["GEMINI_MODEL", "APP__MODEL"] {
            if let Some(v) = non_empty(name) {
                self.model = v;
            }
        }
        for name in ["GEMINI_API_BASE", "APP__API_BASE"] {
            if let Some(v) = non_empty(name) {
                self.api_base = v;
            }
        }
        if let Some(v) = non_empty("APP__TEMPERATURE") {
            if let Ok(parsed) = v.trim().parse::<f32>() {
                self.temperature = Some(parsed);
            }
        }
        if let Some(v) = non_empty("APP__MAX_OUTPUT_TOKENS") {
            if let Ok(parsed) = v.trim().parse::<u32>() {
                self.max_output_tokens = Some(parsed);
            }
        }
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn gemini_config(&self) -> anyhow::Result<GeminiConfig> {
        let api_key = self.api_key().ok_or_else(|| {
            anyhow!("no API key configured; set GEMINI_API_KEY or api_key in {DEFAULT_CONFIG_FILE}")
        })?;

        let api_base = self.api_base.trim();
        let parsed = Url::parse(api_base).with_context(|| format!("invalid api_base '{api_base}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("api_base must be an http(s) url, got '{api_base}'");
        }

        let model = self.model.trim();
        if model.is_empty() {
            bail!("model name must not be empty");
        }

        let mut config = GeminiConfig::new(api_key);
        config.model = model.to_string();
        config.api_base = api_base.to_string();
        config.generation.temperature = self.temperature;
        config.generation.max_output_tokens = self.max_output_tokens;
        Ok(config)
    }
}

/// Picks the model behind the session. Without an API key the chat still
/// starts, and every send ends in a configuration error turn.
pub fn build_model(settings: &Settings) -> anyhow::Result<Arc<dyn GenerativeModel>> {
    if settings.api_key().is_none() {
        warn!("no API key configured; set GEMINI_API_KEY or api_key in {DEFAULT_CONFIG_FILE}");
        return Ok(Arc::new(MissingGenerativeModel));
    }
    let gemini = settings.gemini_config()?;
    Ok(Arc::new(GeminiClient::new(gemini)))
}

/// Defaults, then the settings file, then the environment.
///
/// An explicit `config_path` must exist; the default file is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&path) {
        Ok(raw) => settings
            .apply_file(&raw)
            .with_context(|| format!("failed to load settings from '{}'", path.display()))?,
        Err(err) if required || err.kind() != std::io::ErrorKind::NotFound => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()));
        }
        Err(_) => {}
    }

    settings.apply_env(|name| std::env::var(name).ok());
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
