//! Configuration loader and validator for the alt-text batch tool.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::compiler::CompileOptions;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/";
const DEFAULT_JPEG_QUALITY: u8 = 75;
const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub openai: OpenAi,
    pub captioning: Captioning,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub batch_dir: String,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenAi {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub model: String,
}

/// Prompt and image limits applied to every request in a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Captioning {
    pub prompt_template: String,
    pub max_length: u32,
    pub max_image_size: MaxImageSize,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub tones: Vec<String>,
    pub default_tone: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaxImageSize {
    pub width: u32,
    pub height: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl Config {
    /// Ensure required directories exist (creates `app.batch_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.app.batch_dir)
    }

    /// API key from `OPENAI_API_KEY` when set, otherwise from the file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| Some(self.openai.api_key.clone()).filter(|k| !k.trim().is_empty()))
    }

    /// Build compiler options for one submission using the given tone.
    pub fn compile_options(&self, tone: Option<&str>) -> Result<CompileOptions, ConfigError> {
        let tone = self.captioning.resolve_tone(tone)?;
        Ok(CompileOptions {
            prompt: self.captioning.prompt(tone),
            model: self.openai.model.clone(),
            max_size: self.captioning.max_size_tuple(),
            jpeg_quality: self.captioning.jpeg_quality,
        })
    }
}

impl Captioning {
    /// Render the prompt: `{max_length}` first, then the `__tone__` placeholder.
    pub fn prompt(&self, tone: &str) -> String {
        self.prompt_template
            .replace("{max_length}", &self.max_length.to_string())
            .replace("__tone__", tone)
    }

    /// Pick the requested tone, or the default one. An empty `tones` list accepts anything.
    pub fn resolve_tone<'a>(&'a self, tone: Option<&'a str>) -> Result<&'a str, ConfigError> {
        let tone = tone.map(str::trim).unwrap_or(self.default_tone.as_str());
        if self.tones.is_empty() || self.tones.iter().any(|t| t == tone) {
            Ok(tone)
        } else {
            Err(ConfigError::Invalid("tone is not listed in captioning.tones"))
        }
    }

    pub fn max_size_tuple(&self) -> (u32, u32) {
        (self.max_image_size.width, self.max_image_size.height)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.batch_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.batch_dir must be non-empty"));
    }

    if cfg.openai.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("openai.base_url must be non-empty"));
    }
    if cfg.openai.model.trim().is_empty() {
        return Err(ConfigError::Invalid("openai.model must be non-empty"));
    }

    let c = &cfg.captioning;
    if c.prompt_template.trim().is_empty() {
        return Err(ConfigError::Invalid("captioning.prompt_template must be non-empty"));
    }
    if c.max_length == 0 {
        return Err(ConfigError::Invalid("captioning.max_length must be > 0"));
    }
    if c.max_image_size.width == 0 || c.max_image_size.height == 0 {
        return Err(ConfigError::Invalid("captioning.max_image_size must be > 0 in both dimensions"));
    }
    if !(1..=100).contains(&c.jpeg_quality) {
        return Err(ConfigError::Invalid("captioning.jpeg_quality must be within 1..=100"));
    }
    if !c.tones.is_empty() && !c.tones.contains(&c.default_tone) {
        return Err(ConfigError::Invalid("captioning.default_tone must be one of captioning.tones"));
    }

    Ok(())
}

/// Returns the example YAML shipped with the tool.
pub fn example() -> &'static str {
    r#"app:
  batch_dir: "./batches"

openai:
  # Leave blank to read OPENAI_API_KEY from the environment.
  api_key: ""
  base_url: "https://api.openai.com/"
  model: "gpt-4o-mini"

captioning:
  prompt_template: "Write alt text for this product image in a __tone__ tone. Keep it under {max_length} characters."
  max_length: 125
  max_image_size:
    width: 1024
    height: 1024
  jpeg_quality: 75
  default_tone: "Elegant"
  tones:
    - "Inclusive"
    - "Neutral"
    - "Elegant"
    - "Functional"
    - "Minimalist"
    - "Luxury"
    - "SEO-Friendly"
    - "Streetwear"
    - "Playful"
    - "Earthy"
    - "Vintage"
    - "Sporty"
    - "Feminine"
    - "Masculine"
    - "Avant-garde"
    - "Narrative"
    - "Conversational"
"#
}
