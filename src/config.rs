//! Pipeline configuration.
//!
//! Stored at `~/.recapbot/config.json`, camelCase keys, every field
//! defaulted so partial configs load. The Google OAuth block keeps Google's
//! own snake_case shape so credentials can be pasted straight from the
//! console download. Secrets may be left out of the file and supplied via
//! `SLACK_BOT_TOKEN`, `NOTION_API_TOKEN`, and `GEMINI_API_KEY`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::google_api::OAuthClient;
use crate::processor::ProcessorOptions;

/// Canonical config file path (`~/.recapbot/config.json`).
pub fn config_path() -> Result<PathBuf, PipelineError> {
    let home = dirs::home_dir()
        .ok_or_else(|| PipelineError::Config("cannot determine home directory".to_string()))?;
    Ok(home.join(".recapbot").join("config.json"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub notion: NotionConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    /// Token-store key for the account that owns the transcripts.
    #[serde(default = "default_google_user")]
    pub user: String,
    /// OAuth web-app credentials (Google's snake_case JSON shape).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthClient>,
    /// Override for the token directory (default `~/.recapbot/google`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_dir: Option<PathBuf>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            user: default_google_user(),
            oauth: None,
            token_dir: None,
        }
    }
}

fn default_google_user() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    /// Channel recaps are posted to. Publishing is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recap_channel: Option<String>,
    /// Request-signing secret for the inbound trigger endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Database recap pages are created in. Publishing is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recap_database_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model override; unset uses the summarizer's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingConfig {
    #[serde(default = "default_true")]
    pub google_calendar_enabled: bool,
    #[serde(default = "default_true")]
    pub user_mapping_enabled: bool,
    #[serde(default = "default_true")]
    pub parallel_processing: bool,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            google_calendar_enabled: true,
            user_mapping_enabled: true,
            parallel_processing: true,
            max_workers: default_max_workers(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    4
}

impl From<&ProcessingConfig> for ProcessorOptions {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            google_calendar_enabled: config.google_calendar_enabled,
            user_mapping_enabled: config.user_mapping_enabled,
            parallel_processing: config.parallel_processing,
            max_workers: config.max_workers,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "Config file not found at {}. Create it with: {{ \"google\": {{ \"user\": \"me@company.com\" }} }}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config: {}", e)))?;
        let mut config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from the canonical path.
    pub fn load_default() -> Result<Self, PipelineError> {
        Self::load(&config_path()?)
    }

    fn apply_env_overrides(&mut self) {
        override_secret(&mut self.slack.bot_token, std::env::var("SLACK_BOT_TOKEN").ok());
        override_secret(
            &mut self.notion.api_token,
            std::env::var("NOTION_API_TOKEN").ok(),
        );
        override_secret(&mut self.gemini.api_key, std::env::var("GEMINI_API_KEY").ok());
    }
}

/// Replace `slot` when the environment supplied a non-empty value.
fn override_secret(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        if !value.is_empty() {
            *slot = Some(value);
        }
    }
}
