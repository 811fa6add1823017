use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use zulip_reader_core::CoreConfig;

const DATA_DIR_NAME: &str = "zulip-reader";

/// CLI configuration loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    /// Base URL of the Zulip realm, e.g. https://chat.example.com
    pub realm_url: String,

    pub email: String,

    pub api_key: String,

    /// Where the message database lives (defaults to the platform data dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl CliConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize config")
    }

    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .map(|dir| dir.join(DATA_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME)),
        }
    }

    pub fn core_config(&self) -> CoreConfig {
        CoreConfig::new(self.data_dir())
    }
}
