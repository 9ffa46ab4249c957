pub mod fs;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::{error::KmsError, types::ConfigMap};

/// Where the KMS configuration document comes from.
///
/// The document maps each KMS ID to its configuration section, for example:
///
/// ```json
/// {
///     "vault-tenants": {
///         "encryptionKMSType": "vaulttokens",
///         "vaultAddress": "https://vault.example.com",
///         "tenants": { "bob": { "vaultNamespace": "bob" } }
///     }
/// }
/// ```
#[async_trait]
pub trait KmsConfigSource {
    fn source_debug_string(&self) -> String;

    async fn get_config(&self) -> Result<ConfigMap>;

    async fn get_kms_config(&self, kms_id: &str) -> Result<ConfigMap, KmsError> {
        let config = self.get_config().await.map_err(KmsError::ConfigLoad)?;

        match config.get(kms_id) {
            None => Err(KmsError::UnknownKmsId(kms_id.to_owned())),
            Some(Value::Object(section)) => Ok(section.clone()),
            Some(_) => Err(KmsError::MalformedConfig(format!(
                "configuration of KMS ID {kms_id:?} is not a map"
            ))),
        }
    }
}
