use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::ImageId;
use crate::error::VgError;

pub const DEFAULT_API_BASE: &str = "https://visualgenome.org/api/v0";
pub const DEFAULT_DATASET_BASE: &str = "http://visualgenome.org/static/data/dataset";
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const CONFIG_FILE_NAME: &str = "vg-records.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub dataset_base: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub include_scene_graphs: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub ids: Option<Vec<u64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub api_base: String,
    pub dataset_base: String,
    pub data_dir: Utf8PathBuf,
    pub include_scene_graphs: bool,
    pub timeout_secs: u64,
    pub ids: Option<Vec<ImageId>>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            dataset_base: DEFAULT_DATASET_BASE.to_string(),
            data_dir: Utf8PathBuf::from(DEFAULT_DATA_DIR),
            include_scene_graphs: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            ids: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads an explicit config path, or `vg-records.json` in the working
    /// directory when present. A missing implicit file yields defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, VgError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE_NAME),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| VgError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| VgError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, VgError> {
        let defaults = ResolvedConfig::default();
        let ids = config
            .ids
            .map(|ids| {
                ids.into_iter()
                    .map(ImageId::new)
                    .collect::<Result<Vec<_>, VgError>>()
            })
            .transpose()?;

        Ok(ResolvedConfig {
            api_base: config.api_base.unwrap_or(defaults.api_base),
            dataset_base: config.dataset_base.unwrap_or(defaults.dataset_base),
            data_dir: config
                .data_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.data_dir),
            include_scene_graphs: config
                .include_scene_graphs
                .unwrap_or(defaults.include_scene_graphs),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            ids,
        })
    }
}
