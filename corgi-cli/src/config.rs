//! Configuration loading and parsing

use anyhow::{Context, Result};
use corgi_decoder::{AcquireOptions, DecodeOptions, DecoderConfig, Runtime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Default decode options
    #[serde(default)]
    pub decode: DecodeOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// File path, URL, or `edge:` token
    pub path: Option<String>,
    pub runtime: Option<Runtime>,
    pub download_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    #[serde(default)]
    pub disable_download: bool,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            pretty: default_pretty(),
        }
    }
}

fn default_pretty() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl AppConfig {
    /// Decoder configuration with environment overrides, then file settings
    pub fn decoder_config(&self) -> DecoderConfig {
        let mut acquire = AcquireOptions::from_env();
        let db = &self.database;
        if let Some(url) = &db.download_url {
            acquire.download_url = url.clone();
        }
        if let Some(dir) = &db.cache_dir {
            acquire.cache_dir = Some(dir.clone());
        }
        acquire.search_paths.extend(db.search_paths.iter().cloned());
        acquire.disable_download |= db.disable_download;
        if let Some(secs) = db.timeout_secs {
            acquire.timeout = std::time::Duration::from_secs(secs);
        }

        let mut config = DecoderConfig::new()
            .with_acquire(acquire)
            .with_default_options(self.decode.clone());
        config.database_path = db.path.clone();
        config.runtime = db.runtime;
        config
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .decode
        .validate()
        .with_context(|| format!("Invalid decode options in {:?}", path))?;

    Ok(config)
}
