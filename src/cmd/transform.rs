use std::path::Path;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    cli::TransformOptions,
    config::transform::{is_standard_config, transform_config},
    manager::KmsManager,
    types::ConfigMap,
};

pub struct TransformCommand {
    pub transform_options: TransformOptions,
}

#[async_trait]
impl super::Command for TransformCommand {
    async fn run(&self, _manager: &KmsManager) -> Result<()> {
        let file = &self.transform_options.file;
        let document = load_document(file).await?;

        let transformed = transform_document(document)
            .with_context(|| format!("Failed to transform KMS configuration from {file:?}"))?;

        println!("{}", serde_json::to_string_pretty(&transformed)?);
        Ok(())
    }
}

async fn load_document(file: &Path) -> Result<ConfigMap> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read file: {file:?}"))?;

    let document: Value = if file.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).with_context(|| format!("Failed to parse TOML file: {file:?}"))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON file: {file:?}"))?
    };

    match document {
        Value::Object(document) => Ok(document),
        _ => bail!("The KMS configuration in {file:?} must be a map"),
    }
}

/// Translates a single configuration, or every section of a document keyed by
/// KMS ID that is written in the standard convention.
pub fn transform_document(document: ConfigMap) -> crate::error::Result<ConfigMap> {
    if is_standard_config(&document) {
        return transform_config(&document);
    }

    document
        .into_iter()
        .map(|(kms_id, section)| match section {
            Value::Object(section) if is_standard_config(&section) => {
                transform_config(&section).map(|section| (kms_id, Value::Object(section)))
            }
            section => Ok((kms_id, section)),
        })
        .collect()
}
