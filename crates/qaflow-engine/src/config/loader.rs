use super::schema::QaflowConfig;
use qaflow_common::locator::{LocatorError, LocatorMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Failed to load locators from {path}: {source}")]
    Locators {
        path: PathBuf,
        #[source]
        source: LocatorError,
    },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./qaflow.yaml
    /// 2. ~/.qaflow/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<QaflowConfig, ConfigError> {
        let local_config = PathBuf::from("./qaflow.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".qaflow").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(QaflowConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<QaflowConfig, ConfigError> {
        let content = read(path).await?;
        if content.trim().is_empty() {
            return Ok(QaflowConfig::default());
        }
        let config: QaflowConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub async fn load_locators(path: &Path) -> Result<LocatorMap, ConfigError> {
        let content = read(path).await?;
        LocatorMap::from_yaml_str(&content).map_err(|source| ConfigError::Locators {
            path: path.to_path_buf(),
            source,
        })
    }
}

async fn read(path: &Path) -> Result<String, ConfigError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
}
