use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use serde_json::Value;

use std::path::PathBuf;

use crate::types::ConfigMap;

use super::KmsConfigSource;

pub const CSI_KMS_CONFIG_FILE_DEFAULT: &str = "/etc/csi-kms/config.json";

/// Loads the KMS configuration document from a JSON file, typically an
/// orchestrator config map mounted into the driver's container.
pub struct FileSystemConfigSource {
    config_file: PathBuf,
}

impl FileSystemConfigSource {
    pub fn new(config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
        }
    }

    pub fn new_with_default_config_file() -> Self {
        Self::new(PathBuf::from(CSI_KMS_CONFIG_FILE_DEFAULT))
    }

    fn parse(content: &str) -> Result<ConfigMap> {
        if content.trim().is_empty() {
            return Ok(ConfigMap::new());
        }

        match serde_json::from_str::<Value>(content).context("Failed to parse content as JSON")? {
            Value::Object(config) => Ok(config),
            _ => bail!("The KMS configuration document must be a JSON object"),
        }
    }
}

#[async_trait]
impl KmsConfigSource for FileSystemConfigSource {
    fn source_debug_string(&self) -> String {
        format!("filesystem: {:?}", self.config_file)
    }

    async fn get_config(&self) -> Result<ConfigMap> {
        let config_file = &self.config_file;

        tracing::debug!("Loading KMS config from: {config_file:?}");
        if !config_file.exists() {
            tracing::debug!("KMS config not found, skip: {config_file:?}");
            return Ok(ConfigMap::new());
        }

        tokio::fs::read_to_string(config_file)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|content| Self::parse(&content))
            .with_context(|| format!("Failed to load KMS config from: {config_file:?}"))
    }
}
